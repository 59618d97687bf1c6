//! Test helper module for session-auth-service integration tests.
//!
//! Builds the real router over the exported provider/store mocks so the
//! whole cookie flow can be driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{body::Body, http::header, response::Response, Router};
use axum_extra::extract::cookie::Cookie;
use std::sync::Arc;

use session_auth_service::{
    build_router,
    config::{
        AuthConfig, CookieConfig, DatabaseConfig, Environment, ProviderConfig, SecurityConfig,
        SwaggerConfig, SwaggerMode,
    },
    services::{Authenticator, CookiePolicy, MockIdentityProvider, MockUserStore},
    AppState,
};

/// Test application with mock provider and store handles retained for
/// registration and inspection.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockIdentityProvider>,
    pub store: Arc<MockUserStore>,
}

/// Create a test configuration. The cookie domain is `localhost`, so issued
/// cookies are not `Secure`.
pub fn create_test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        service_name: "session-auth-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "postgres://localhost/session_auth_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        cookies: CookieConfig {
            domain: "localhost".to_string(),
            local_suffix: ".local".to_string(),
        },
        provider: ProviderConfig {
            issuer_url: "https://provider.test/realms/panel".to_string(),
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            post_login_url: "/".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

/// Spawn the test application with mock services.
pub async fn spawn_app() -> TestApp {
    let config = create_test_config();

    let provider = Arc::new(MockIdentityProvider::new());
    let store = Arc::new(MockUserStore::new());

    let authenticator = Authenticator::new(provider.clone(), store.clone());
    let cookies = CookiePolicy::new(&config.cookies);

    let state = AppState {
        config,
        store: store.clone(),
        provider: provider.clone(),
        authenticator,
        cookies,
    };

    let router = build_router(state.clone())
        .await
        .expect("Failed to build router");

    TestApp {
        router,
        state,
        provider,
        store,
    }
}

/// Collect and parse every `Set-Cookie` header on a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            Cookie::parse(value.to_str().expect("Set-Cookie not UTF-8").to_string())
                .expect("Failed to parse Set-Cookie header")
        })
        .collect()
}

/// Find a parsed `Set-Cookie` by name.
pub fn find_cookie<'a>(
    cookies: &'a [Cookie<'static>],
    name: &str,
) -> Option<&'a Cookie<'static>> {
    cookies.iter().find(|c| c.name() == name)
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body).expect("Response body is not valid JSON")
}

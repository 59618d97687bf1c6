mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Utc;
use session_auth_service::services::{TokenSet, UserClaims};
use tower::util::ServiceExt;
use uuid::Uuid;

use common::{body_json, find_cookie, set_cookies, spawn_app};

#[tokio::test]
async fn test_login_redirect_issues_state_and_verifier_cookies() {
    let app = spawn_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/auth/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("redirect should carry a Location header");
    assert!(location.starts_with("https://provider.test/auth"));
    assert!(location.contains("code_challenge="));

    let cookies = set_cookies(&response);
    let state = find_cookie(&cookies, "oauth_state").expect("state cookie should be set");
    assert_eq!(state.http_only(), Some(true));
    let verifier = find_cookie(&cookies, "code_verifier").expect("verifier cookie should be set");
    assert_eq!(verifier.http_only(), Some(true));
    assert!(!verifier.value().is_empty());
}

#[tokio::test]
async fn test_login_callback_end_to_end() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider.register_code(
        "code-1",
        TokenSet {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
        },
    );
    app.provider.register_token("access-1", true, Some(now + 3600));
    app.provider
        .register_token("refresh-1", true, Some(now + 3600));
    app.provider.register_claims(
        "access-1",
        UserClaims {
            sub: Some(user_id.to_string()),
            preferred_username: Some("bob".to_string()),
            email: Some("b@x.com".to_string()),
        },
    );

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code-1&state=xyz")
                .header(header::COOKIE, "oauth_state=xyz; code_verifier=ver")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/")
    );

    // A fresh record with no role assigned.
    let user = app.store.user(user_id).expect("record should be created");
    assert_eq!(user.username, "bob");
    assert_eq!(user.email, "b@x.com");
    assert_eq!(user.role_id, None);

    let cookies = set_cookies(&response);

    let access = find_cookie(&cookies, "access_token").expect("access cookie should be set");
    assert_eq!(access.value(), "access-1");
    assert_eq!(
        access.expires_datetime().map(|e| e.unix_timestamp()),
        Some(now + 3600)
    );

    let refresh = find_cookie(&cookies, "refresh_token").expect("refresh cookie should be set");
    assert_eq!(refresh.value(), "refresh-1");
    assert_eq!(
        refresh.expires_datetime().map(|e| e.unix_timestamp()),
        Some(now + 3600)
    );

    // The transient login cookies are removed.
    let state = find_cookie(&cookies, "oauth_state").expect("state cookie should be removed");
    assert_eq!(state.value(), "");
    let verifier =
        find_cookie(&cookies, "code_verifier").expect("verifier cookie should be removed");
    assert_eq!(verifier.value(), "");
}

#[tokio::test]
async fn test_login_callback_rejects_state_mismatch() {
    let app = spawn_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code-1&state=forged")
                .header(header::COOKIE, "oauth_state=xyz; code_verifier=ver")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn test_login_with_incomplete_claims_fails_without_reconciling() {
    let app = spawn_app().await;
    let now = Utc::now().timestamp();

    app.provider.register_code(
        "code-1",
        TokenSet {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
        },
    );
    app.provider.register_token("access-1", true, Some(now + 3600));
    app.provider.register_claims(
        "access-1",
        UserClaims {
            sub: Some(String::new()),
            preferred_username: Some("bob".to_string()),
            email: Some("b@x.com".to_string()),
        },
    );

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code-1&state=xyz")
                .header(header::COOKIE, "oauth_state=xyz; code_verifier=ver")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.user_count(), 0);

    let cookies = set_cookies(&response);
    for name in ["access_token", "refresh_token"] {
        let cookie = find_cookie(&cookies, name).expect("cookie should be cleared");
        assert_eq!(cookie.value(), "");
    }

    let body = body_json(response).await;
    assert_eq!(body["error"], "Authentication failed");
}

#[tokio::test]
async fn test_login_fails_when_store_is_down() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider.register_code(
        "code-1",
        TokenSet {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
        },
    );
    app.provider.register_token("access-1", true, Some(now + 3600));
    app.provider
        .register_token("refresh-1", true, Some(now + 3600));
    app.provider.register_claims(
        "access-1",
        UserClaims {
            sub: Some(user_id.to_string()),
            preferred_username: Some("bob".to_string()),
            email: Some("b@x.com".to_string()),
        },
    );
    app.store.set_failing(true);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/auth/callback?code=code-1&state=xyz")
                .header(header::COOKIE, "oauth_state=xyz; code_verifier=ver")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Provider accepted the code, but without a local record the login
    // must not be reported successful.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookies = set_cookies(&response);
    for name in ["access_token", "refresh_token"] {
        let cookie = find_cookie(&cookies, name).expect("cookie should be cleared");
        assert_eq!(cookie.value(), "");
    }
}

#[tokio::test]
async fn test_second_login_updates_changed_username_only() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    for (code, access, username) in [("code-1", "access-1", "alice"), ("code-2", "access-2", "alice2")] {
        app.provider.register_code(
            code,
            TokenSet {
                access_token: access.to_string(),
                refresh_token: Some("refresh-1".to_string()),
            },
        );
        app.provider.register_token(access, true, Some(now + 3600));
        app.provider.register_claims(
            access,
            UserClaims {
                sub: Some(user_id.to_string()),
                preferred_username: Some(username.to_string()),
                email: Some("a@x.com".to_string()),
            },
        );
    }
    app.provider
        .register_token("refresh-1", true, Some(now + 3600));

    for (code, state) in [("code-1", "s1"), ("code-2", "s2")] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/callback?code={}&state={}", code, state))
                    .header(
                        header::COOKIE,
                        format!("oauth_state={}; code_verifier=ver", state),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    assert_eq!(app.store.user_count(), 1);
    let user = app.store.user(user_id).unwrap();
    assert_eq!(user.username, "alice2");
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.role_id, None);
}

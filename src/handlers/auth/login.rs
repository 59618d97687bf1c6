use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::dtos::{auth::CallbackQuery, ErrorResponse};
use crate::error::AppError;
use crate::AppState;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const CODE_VERIFIER_COOKIE: &str = "code_verifier";

/// Start interactive login
///
/// Issues the CSRF state and PKCE verifier cookies and redirects the browser
/// to the provider's authorization endpoint.
#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 303, description = "Redirect to the identity provider")
    ),
    tag = "Authentication"
)]
pub async fn login_redirect(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let state_val = uuid::Uuid::new_v4().to_string();
    let code_verifier = {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        use rand::Rng;
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    };

    let code_challenge = {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    };

    let provider_url = state.provider.authorization_url(&state_val, &code_challenge);

    let updated_jar = jar
        .add(
            Cookie::build((OAUTH_STATE_COOKIE, state_val))
                .path("/")
                .http_only(true)
                .secure(state.cookies.secure())
                .max_age(time::Duration::minutes(5))
                .build(),
        )
        .add(
            Cookie::build((CODE_VERIFIER_COOKIE, code_verifier))
                .path("/")
                .http_only(true)
                .secure(state.cookies.secure())
                .max_age(time::Duration::minutes(5))
                .build(),
        );

    (updated_jar, Redirect::to(&provider_url).into_response())
}

/// Complete interactive login
///
/// Validates the CSRF state, exchanges the authorization code, reconciles the
/// local user record, and issues (or clears) both session cookies.
#[utoipa::path(
    get,
    path = "/auth/callback",
    responses(
        (status = 303, description = "Login succeeded, redirect to the application"),
        (status = 400, description = "Invalid OAuth state", body = ErrorResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Response) {
    let stored_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    if stored_state.as_deref() != Some(query.state.as_str()) {
        return (
            jar,
            AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")).into_response(),
        );
    }

    let code_verifier = match jar.get(CODE_VERIFIER_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => {
            return (
                jar,
                AppError::BadRequest(anyhow::anyhow!("Missing code verifier")).into_response(),
            );
        }
    };

    let outcome = state.authenticator.login(&query.code, &code_verifier).await;

    let jar = jar
        .remove(Cookie::from(OAUTH_STATE_COOKIE))
        .remove(Cookie::from(CODE_VERIFIER_COOKIE));
    let jar = state.cookies.apply(jar, &outcome.cookies);

    match outcome.session {
        Some(_) => (
            jar,
            Redirect::to(&state.config.provider.post_login_url).into_response(),
        ),
        None => (
            jar,
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Authentication failed".to_string(),
                }),
            )
                .into_response(),
        ),
    }
}

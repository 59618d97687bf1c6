use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::dtos::ErrorResponse;
use crate::services::{AuthSession, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::AppState;

/// Middleware to require an authenticated session.
///
/// Runs the authenticator over the two session cookies, inserts the resolved
/// session into request extensions, and appends any re-issued or cleared
/// cookies to the response. Exactly one cookie application happens per
/// decision, whether the request is allowed through or rejected.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let access_token = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string());
    let refresh_token = jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());

    let outcome = state
        .authenticator
        .authenticate(access_token.as_deref(), refresh_token.as_deref())
        .await;

    let cookies = state.cookies.cookies_for(&outcome.cookies);

    let mut response = match outcome.session {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated".to_string(),
            }),
        )
            .into_response(),
    };

    append_session_cookies(&mut response, &cookies);
    response
}

fn append_session_cookies(response: &mut Response, cookies: &[Cookie<'static>]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => {
                tracing::error!(error = %err, cookie = cookie.name(), "failed to encode session cookie");
            }
        }
    }
}

/// Extractor to easily get the resolved session in handlers.
pub struct CurrentUser(pub AuthSession);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<AuthSession>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Session missing from request extensions".to_string(),
            }),
        ))?;

        Ok(CurrentUser(session.clone()))
    }
}

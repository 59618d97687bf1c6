use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::dtos::auth::SessionResponse;
use crate::middleware::CurrentUser;
use crate::services::CookieUpdate;
use crate::AppState;

/// Resolved identity of the current session
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Session is authenticated", body = SessionResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Session",
    security(
        ("session_cookie" = [])
    )
)]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Json<SessionResponse> {
    let role = state.authenticator.role(session.user_id).await;

    Json(SessionResponse {
        user_id: session.user_id,
        username: session.username,
        email: session.email,
        role,
    })
}

/// Logout and clear the session cookies
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out successfully")
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let jar = state.cookies.apply(jar, &CookieUpdate::Clear);
    tracing::info!("session cookies cleared");

    (
        jar,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    )
}

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use axum_extra::extract::cookie::SameSite;
use chrono::Utc;
use session_auth_service::services::{TokenSet, UserClaims, UserStore};
use tower::util::ServiceExt;
use uuid::Uuid;

use common::{body_json, find_cookie, set_cookies, spawn_app};

fn claims_for(user_id: Uuid, username: &str, email: &str) -> UserClaims {
    UserClaims {
        sub: Some(user_id.to_string()),
        preferred_username: Some(username.to_string()),
        email: Some(email.to_string()),
    }
}

#[tokio::test]
async fn test_me_with_valid_access_cookie() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider.register_token("access-1", true, Some(now + 3600));
    app.provider
        .register_claims("access-1", claims_for(user_id, "bob", "b@x.com"));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(header::COOKIE, "access_token=access-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // The access path never touches cookies.
    assert!(set_cookies(&response).is_empty());

    let body = body_json(response).await;
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["username"], "bob");
    assert_eq!(body["email"], "b@x.com");
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn test_me_resolves_assigned_role() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider.register_token("access-1", true, Some(now + 3600));
    app.provider
        .register_claims("access-1", claims_for(user_id, "bob", "b@x.com"));

    app.store
        .insert_user(&session_auth_service::models::User::new(
            user_id, "bob", "b@x.com",
        ))
        .await
        .unwrap();
    let role_id = app.store.add_role("operator");
    app.store.assign_role(user_id, role_id);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(header::COOKIE, "access_token=access-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["role"], "operator");
}

#[tokio::test]
async fn test_access_token_inside_expiry_margin_is_rejected() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider.register_token("access-1", true, Some(now + 29));
    app.provider
        .register_claims("access-1", claims_for(user_id, "bob", "b@x.com"));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(header::COOKIE, "access_token=access-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_refresh_fallback_reissues_both_cookies() {
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let now = Utc::now().timestamp();

    app.provider
        .register_token("refresh-1", true, Some(now + 86400));
    app.provider.register_refresh(
        "refresh-1",
        TokenSet {
            access_token: "access-2".to_string(),
            refresh_token: Some("refresh-2".to_string()),
        },
    );
    app.provider.register_token("access-2", true, Some(now + 900));
    app.provider
        .register_token("refresh-2", true, Some(now + 86400));
    app.provider
        .register_claims("access-2", claims_for(user_id, "bob", "b@x.com"));

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(header::COOKIE, "refresh_token=refresh-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);

    let access = find_cookie(&cookies, "access_token").expect("access cookie should be set");
    assert_eq!(access.value(), "access-2");
    assert_eq!(access.domain(), Some("localhost"));
    assert_eq!(access.path(), Some("/"));
    assert_eq!(access.http_only(), Some(true));
    assert_eq!(access.same_site(), Some(SameSite::Strict));
    assert_eq!(access.secure(), Some(false));
    assert_eq!(
        access.expires_datetime().map(|e| e.unix_timestamp()),
        Some(now + 900)
    );

    let refresh = find_cookie(&cookies, "refresh_token").expect("refresh cookie should be set");
    assert_eq!(refresh.value(), "refresh-2");
    assert_eq!(
        refresh.expires_datetime().map(|e| e.unix_timestamp()),
        Some(now + 86400)
    );
}

#[tokio::test]
async fn test_no_credentials_returns_401_and_touches_no_cookies() {
    let app = spawn_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());

    let body = body_json(response).await;
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn test_refresh_failure_clears_both_cookies() {
    let app = spawn_app().await;
    let now = Utc::now().timestamp();

    app.provider
        .register_token("refresh-1", true, Some(now + 86400));
    app.provider.fail_refresh(true);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/users/me")
                .header(
                    header::COOKIE,
                    "access_token=stale-access; refresh_token=refresh-1",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);

    let now = Utc::now().timestamp();
    for name in ["access_token", "refresh_token"] {
        let cookie = find_cookie(&cookies, name).expect("cookie should be cleared");
        assert_eq!(cookie.value(), "");
        let expires = cookie
            .expires_datetime()
            .expect("cleared cookie should carry an expiry")
            .unix_timestamp();
        assert!(expires < now - 1800);
    }
}

#[tokio::test]
async fn test_logout_clears_both_cookies() {
    let app = spawn_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);

    let now = Utc::now().timestamp();
    for name in ["access_token", "refresh_token"] {
        let cookie = find_cookie(&cookies, name).expect("cookie should be cleared");
        assert_eq!(cookie.value(), "");
        let expires = cookie
            .expires_datetime()
            .expect("cleared cookie should carry an expiry")
            .unix_timestamp();
        assert!(expires < now - 1800);
    }

    let body = body_json(response).await;
    assert_eq!(body["message"], "Logged out successfully");
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "up");
}

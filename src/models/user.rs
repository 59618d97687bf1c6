//! User model - provider-reconciled local accounts.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity, keyed by the identity provider's subject UUID.
///
/// `username` and `email` mirror the most recently reconciled provider
/// claims; `role_id` is assigned administratively and never written by the
/// reconciliation path.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user from provider claims. No role is assigned.
    pub fn new(user_id: Uuid, username: &str, email: &str) -> Self {
        Self {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            role_id: None,
            created_utc: Utc::now(),
        }
    }
}

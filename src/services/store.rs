//! Local identity store capability.
//!
//! `PgUserStore` is the PostgreSQL implementation; `MockUserStore` backs the
//! test suites with the same contract.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Role, User};
use crate::services::ServiceError;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by subject UUID.
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Insert a new user record.
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    /// Rewrite both identity columns in a single statement. The role column
    /// is never touched.
    async fn update_identity(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), ServiceError>;

    /// Resolve the user's role label, if a role is assigned.
    async fn role_name(&self, user_id: Uuid) -> Result<Option<String>, ServiceError>;

    /// Health check - ping the store.
    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// PostgreSQL-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, role_id, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role_id)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_identity(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET username = $2, email = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(username)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn role_name(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        let label: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT r.role_label FROM users u
            LEFT JOIN roles r ON u.role_id = r.role_id
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ServiceError::Database(anyhow::anyhow!(e)))?;

        Ok(label.flatten())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

/// In-memory user store for tests.
#[derive(Default)]
pub struct MockUserStore {
    users: Mutex<HashMap<Uuid, User>>,
    roles: Mutex<HashMap<Uuid, Role>>,
    failing: AtomicBool,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store operation fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of a stored user.
    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.users
            .lock()
            .expect("mock users mutex poisoned")
            .get(&user_id)
            .cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().expect("mock users mutex poisoned").len()
    }

    /// Register a role and return its id.
    pub fn add_role(&self, role_label: &str) -> Uuid {
        let role = Role::new(role_label.to_string());
        let role_id = role.role_id;
        self.roles
            .lock()
            .expect("mock roles mutex poisoned")
            .insert(role_id, role);
        role_id
    }

    /// Assign a registered role to a stored user.
    pub fn assign_role(&self, user_id: Uuid, role_id: Uuid) {
        if let Some(user) = self
            .users
            .lock()
            .expect("mock users mutex poisoned")
            .get_mut(&user_id)
        {
            user.role_id = Some(role_id);
        }
    }

    fn check_failing(&self) -> Result<(), ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Database(anyhow::anyhow!(
                "simulated store failure"
            )));
        }
        Ok(())
    }

    fn lock_users(&self) -> Result<MutexGuard<'_, HashMap<Uuid, User>>, ServiceError> {
        self.users
            .lock()
            .map_err(|e| ServiceError::Database(anyhow::anyhow!("mock users mutex poisoned: {}", e)))
    }

    fn lock_roles(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Role>>, ServiceError> {
        self.roles
            .lock()
            .map_err(|e| ServiceError::Database(anyhow::anyhow!("mock roles mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        self.check_failing()?;
        Ok(self.lock_users()?.get(&user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        self.check_failing()?;
        let mut users = self.lock_users()?;
        if users.contains_key(&user.user_id) {
            return Err(ServiceError::Database(anyhow::anyhow!(
                "duplicate key value violates unique constraint \"users_pkey\""
            )));
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_identity(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), ServiceError> {
        self.check_failing()?;
        if let Some(user) = self.lock_users()?.get_mut(&user_id) {
            user.username = username.to_string();
            user.email = email.to_string();
        }
        Ok(())
    }

    async fn role_name(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        self.check_failing()?;
        let role_id = match self.lock_users()?.get(&user_id).and_then(|u| u.role_id) {
            Some(role_id) => role_id,
            None => return Ok(None),
        };
        Ok(self.lock_roles()?.get(&role_id).map(|r| r.role_label.clone()))
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        self.check_failing()
    }
}

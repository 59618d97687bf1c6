//! Session authentication core.
//!
//! `Authenticator` decides, for one inbound request, whether the caller is
//! authenticated: the access token is checked first (with an expiry margin),
//! then the refresh token, and every outcome carries the cookie side effects
//! the HTTP layer must apply. It also reconciles provider claims into the
//! local user store on login.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::User;
use crate::services::provider::{IdentityProvider, TokenSet};
use crate::services::store::UserStore;
use crate::services::ServiceError;

/// An access token expiring within this window is not accepted: it could
/// expire while the request it authorizes is still in flight.
const ACCESS_EXPIRY_MARGIN_SECS: i64 = 30;

/// Identity resolved by a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

/// A token bound for a session cookie, priced with its introspected expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub expires_unix: i64,
}

/// Tokens to re-issue after a refresh or login. An absent slot clears the
/// corresponding cookie.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: Option<IssuedToken>,
    pub refresh: Option<IssuedToken>,
}

/// Cookie side effect of an authentication decision.
#[derive(Debug, Clone)]
pub enum CookieUpdate {
    /// Leave the client's cookies untouched.
    Keep,
    /// Re-issue both session cookies.
    Issue(IssuedTokens),
    /// Clear both session cookies.
    Clear,
}

/// Immutable result of one authentication decision.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub session: Option<AuthSession>,
    pub cookies: CookieUpdate,
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn denied(cookies: CookieUpdate) -> Self {
        Self {
            session: None,
            cookies,
        }
    }
}

#[derive(Clone)]
pub struct Authenticator {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn UserStore>) -> Self {
        Self { provider, store }
    }

    /// Authenticate a request from its session cookies.
    ///
    /// An absent cookie is an empty credential, not an error. At most two
    /// token checks run: the access token, then the refresh token. Provider
    /// failures never escape; they fold into an unauthenticated outcome, and
    /// a failure on the refresh path additionally clears both cookies so the
    /// browser does not retry dead credentials.
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthOutcome {
        if let Some(token) = access_token {
            match self.check_access_token(token).await {
                Ok(Some(session)) => {
                    return AuthOutcome {
                        session: Some(session),
                        cookies: CookieUpdate::Keep,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        code = err.code(),
                        error = %err,
                        "access token check failed, falling back to refresh token"
                    );
                }
            }
        }

        if let Some(token) = refresh_token {
            return match self.check_refresh_token(token).await {
                Ok(Some((session, issued))) => {
                    tracing::info!(user_id = %session.user_id, "session renewed via refresh token");
                    AuthOutcome {
                        session: Some(session),
                        cookies: CookieUpdate::Issue(issued),
                    }
                }
                Ok(None) => AuthOutcome::denied(CookieUpdate::Keep),
                Err(err) => {
                    tracing::error!(
                        code = err.code(),
                        error = %err,
                        "refresh token check failed, clearing session cookies"
                    );
                    AuthOutcome::denied(CookieUpdate::Clear)
                }
            };
        }

        AuthOutcome::denied(CookieUpdate::Keep)
    }

    /// Complete an interactive login from the provider's callback.
    ///
    /// Two-phase gate: the provider must accept the authorization code AND
    /// the claims must reconcile into the local store before the login is
    /// reported successful. Any failure clears both cookies.
    pub async fn login(&self, code: &str, code_verifier: &str) -> AuthOutcome {
        match self.complete_login(code, code_verifier).await {
            Ok((session, issued)) => {
                tracing::info!(user_id = %session.user_id, "user logged in");
                AuthOutcome {
                    session: Some(session),
                    cookies: CookieUpdate::Issue(issued),
                }
            }
            Err(err) => {
                tracing::error!(code = err.code(), error = %err, "login failed, clearing session cookies");
                AuthOutcome::denied(CookieUpdate::Clear)
            }
        }
    }

    /// Make the local user record match the given claims.
    ///
    /// Missing record: insert with no role. Existing record with differing
    /// username or email: rewrite both identity columns in one statement.
    /// Idempotent; safe under concurrent execution for the same UUID
    /// (last-write-wins per statement, never a lost record).
    pub async fn reconcile(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), ServiceError> {
        match self.store.find_user(user_id).await? {
            None => {
                let user = User::new(user_id, username, email);
                self.store.insert_user(&user).await
            }
            Some(existing) => {
                if existing.username != username || existing.email != email {
                    self.store.update_identity(user_id, username, email).await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Resolve the role label assigned to a user, if any.
    ///
    /// Lookup failures yield `None`, not an error; a caller without a
    /// resolved session has no UUID to ask with.
    pub async fn role(&self, user_id: Uuid) -> Option<String> {
        match self.store.role_name(user_id).await {
            Ok(role) => role,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "role lookup failed");
                None
            }
        }
    }

    async fn check_access_token(&self, token: &str) -> Result<Option<AuthSession>, ServiceError> {
        let introspection = self.provider.introspect(token).await?;
        let now = Utc::now().timestamp();

        let usable = introspection.active
            && introspection
                .exp
                .map_or(false, |exp| exp >= now + ACCESS_EXPIRY_MARGIN_SECS);
        if !usable {
            return Ok(None);
        }

        let claims = self.provider.user_info(token).await?;
        Ok(claims.resolved().map(|resolved| AuthSession {
            user_id: resolved.user_id,
            username: resolved.username,
            email: resolved.email,
        }))
    }

    async fn check_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<(AuthSession, IssuedTokens)>, ServiceError> {
        let introspection = self.provider.introspect(token).await?;
        if !introspection.active {
            return Ok(None);
        }

        let tokens = self.provider.refresh(token).await?;
        let claims = self.provider.user_info(&tokens.access_token).await?;
        let resolved = claims.resolved().ok_or(ServiceError::IncompleteClaims)?;

        let issued = self.issue_tokens(&tokens, Some(token)).await?;
        Ok(Some((
            AuthSession {
                user_id: resolved.user_id,
                username: resolved.username,
                email: resolved.email,
            },
            issued,
        )))
    }

    async fn complete_login(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<(AuthSession, IssuedTokens), ServiceError> {
        let tokens = self.provider.exchange_code(code, code_verifier).await?;
        let claims = self.provider.user_info(&tokens.access_token).await?;
        let resolved = claims.resolved().ok_or(ServiceError::IncompleteClaims)?;

        self.reconcile(resolved.user_id, &resolved.username, &resolved.email)
            .await?;

        let issued = self.issue_tokens(&tokens, None).await?;
        Ok((
            AuthSession {
                user_id: resolved.user_id,
                username: resolved.username,
                email: resolved.email,
            },
            issued,
        ))
    }

    /// Price each token for cookie issuance with its own introspected expiry.
    /// When the provider did not rotate the refresh token, the presented one
    /// is re-issued.
    async fn issue_tokens(
        &self,
        tokens: &TokenSet,
        presented_refresh: Option<&str>,
    ) -> Result<IssuedTokens, ServiceError> {
        let access = Some(IssuedToken {
            expires_unix: self.introspected_expiry(&tokens.access_token).await?,
            value: tokens.access_token.clone(),
        });

        let refresh_value = tokens
            .refresh_token
            .clone()
            .or_else(|| presented_refresh.map(str::to_string));
        let refresh = match refresh_value {
            Some(value) => Some(IssuedToken {
                expires_unix: self.introspected_expiry(&value).await?,
                value,
            }),
            None => None,
        };

        Ok(IssuedTokens { access, refresh })
    }

    async fn introspected_expiry(&self, token: &str) -> Result<i64, ServiceError> {
        let introspection = self.provider.introspect(token).await?;
        introspection.exp.ok_or_else(|| {
            ServiceError::Provider(crate::services::provider::ProviderError::Malformed(
                "introspection response missing exp".to_string(),
            ))
        })
    }
}

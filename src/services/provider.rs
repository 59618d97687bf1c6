//! Identity provider capability.
//!
//! The authenticator never speaks the OIDC wire protocol itself; it consumes
//! this narrow interface. `OidcProvider` is the production implementation
//! (endpoints resolved once from the issuer's discovery document),
//! `MockIdentityProvider` backs the test suites.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ProviderConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider discovery failed: {0}")]
    Discovery(String),
}

impl ProviderError {
    /// Stable code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Transport(_) => "transport",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::Discovery(_) => "discovery",
        }
    }
}

/// RFC 7662 introspection result. `exp` is absent for inactive tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Tokens minted by a code or refresh exchange. Providers are not required
/// to rotate the refresh token, so it may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Identity claims as returned by the userinfo endpoint. Any field may be
/// missing; `resolved` gates on the complete triple.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// The complete claim triple required before a caller counts as identified.
#[derive(Debug, Clone)]
pub struct ResolvedClaims {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

impl UserClaims {
    /// Returns the claims only if subject, username and email are all
    /// present and non-empty, and the subject parses as a UUID.
    pub fn resolved(&self) -> Option<ResolvedClaims> {
        let sub = self.sub.as_deref().filter(|s| !s.is_empty())?;
        let username = self.preferred_username.as_deref().filter(|s| !s.is_empty())?;
        let email = self.email.as_deref().filter(|s| !s.is_empty())?;
        let user_id = Uuid::parse_str(sub).ok()?;

        Some(ResolvedClaims {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
        })
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL to redirect the browser to for interactive login.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str, code_verifier: &str)
        -> Result<TokenSet, ProviderError>;

    /// Exchange a refresh token for a new token set.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;

    /// Query liveness and expiry of a token.
    async fn introspect(&self, token: &str) -> Result<Introspection, ProviderError>;

    /// Fetch identity claims for the owner of an access token.
    async fn user_info(&self, access_token: &str) -> Result<UserClaims, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    #[serde(default)]
    introspection_endpoint: Option<String>,
}

/// Production provider client. Endpoints are resolved once, at construction,
/// from `{issuer}/.well-known/openid-configuration`.
#[derive(Clone)]
pub struct OidcProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    introspection_endpoint: String,
}

impl OidcProvider {
    /// Resolve the provider's endpoints and build the client.
    ///
    /// `send_upgrade_hint` controls the `Upgrade-Insecure-Requests` header on
    /// outbound provider requests; it is disabled for local-development
    /// cookie domains.
    pub async fn discover(
        config: &ProviderConfig,
        send_upgrade_hint: bool,
    ) -> Result<Self, ProviderError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if send_upgrade_hint {
            headers.insert(
                reqwest::header::UPGRADE_INSECURE_REQUESTS,
                reqwest::header::HeaderValue::from_static("1"),
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer_url.trim_end_matches('/')
        );

        let response = http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Discovery(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| ProviderError::Discovery(e.to_string()))?;

        let introspection_endpoint = doc.introspection_endpoint.ok_or_else(|| {
            ProviderError::Discovery(
                "provider does not advertise an introspection endpoint".to_string(),
            )
        })?;

        tracing::info!(issuer = %config.issuer_url, "Resolved identity provider endpoints");

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorization_endpoint: doc.authorization_endpoint,
            token_endpoint: doc.token_endpoint,
            userinfo_endpoint: doc.userinfo_endpoint,
            introspection_endpoint,
        })
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<TokenSet, ProviderError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, body });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20profile%20email&state={}&code_challenge={}&code_challenge_method=S256",
            self.authorization_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", &self.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", "openid"),
        ])
        .await
    }

    async fn introspect(&self, token: &str) -> Result<Introspection, ProviderError> {
        let response = self
            .http
            .post(&self.introspection_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, body });
        }

        response
            .json::<Introspection>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn user_info(&self, access_token: &str) -> Result<UserClaims, ProviderError> {
        let response = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, body });
        }

        response
            .json::<UserClaims>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

/// In-memory provider for tests. Tokens, claims and exchanges are registered
/// up front; unknown tokens introspect as inactive, unknown exchanges are
/// rejected.
#[derive(Default)]
pub struct MockIdentityProvider {
    introspections: Mutex<HashMap<String, Introspection>>,
    claims: Mutex<HashMap<String, UserClaims>>,
    refreshes: Mutex<HashMap<String, TokenSet>>,
    codes: Mutex<HashMap<String, TokenSet>>,
    fail_introspect: AtomicBool,
    fail_refresh: AtomicBool,
    fail_user_info: AtomicBool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&self, token: &str, active: bool, exp: Option<i64>) {
        self.introspections
            .lock()
            .expect("mock introspections mutex poisoned")
            .insert(token.to_string(), Introspection { active, exp });
    }

    pub fn register_claims(&self, access_token: &str, claims: UserClaims) {
        self.claims
            .lock()
            .expect("mock claims mutex poisoned")
            .insert(access_token.to_string(), claims);
    }

    pub fn register_refresh(&self, refresh_token: &str, result: TokenSet) {
        self.refreshes
            .lock()
            .expect("mock refreshes mutex poisoned")
            .insert(refresh_token.to_string(), result);
    }

    pub fn register_code(&self, code: &str, result: TokenSet) {
        self.codes
            .lock()
            .expect("mock codes mutex poisoned")
            .insert(code.to_string(), result);
    }

    pub fn fail_introspect(&self, fail: bool) {
        self.fail_introspect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn fail_user_info(&self, fail: bool) {
        self.fail_user_info.store(fail, Ordering::SeqCst);
    }

    fn outage() -> ProviderError {
        ProviderError::Rejected {
            status: 503,
            body: "simulated provider outage".to_string(),
        }
    }

    fn lock<'a, T>(
        mutex: &'a Mutex<HashMap<String, T>>,
        what: &str,
    ) -> Result<std::sync::MutexGuard<'a, HashMap<String, T>>, ProviderError> {
        mutex
            .lock()
            .map_err(|e| ProviderError::Malformed(format!("mock {} mutex poisoned: {}", what, e)))
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://provider.test/auth?state={}&code_challenge={}",
            state, code_challenge
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<TokenSet, ProviderError> {
        Self::lock(&self.codes, "codes")?
            .get(code)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected {
                status: 400,
                body: "unknown authorization code".to_string(),
            })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }

        Self::lock(&self.refreshes, "refreshes")?
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected {
                status: 400,
                body: "unknown refresh token".to_string(),
            })
    }

    async fn introspect(&self, token: &str) -> Result<Introspection, ProviderError> {
        if self.fail_introspect.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }

        let introspection = Self::lock(&self.introspections, "introspections")?
            .get(token)
            .cloned()
            .unwrap_or(Introspection {
                active: false,
                exp: None,
            });
        Ok(introspection)
    }

    async fn user_info(&self, access_token: &str) -> Result<UserClaims, ProviderError> {
        if self.fail_user_info.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }

        let claims = Self::lock(&self.claims, "claims")?
            .get(access_token)
            .cloned()
            .unwrap_or_default();
        Ok(claims)
    }
}

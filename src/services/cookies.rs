//! Session cookie issuance and clearing.
//!
//! Both session cookies are scoped to one configured domain, `HttpOnly`,
//! `SameSite=Strict`, and `Secure` everywhere except local-development
//! domains. Issued cookies expire with their token; cleared cookies are
//! backdated far enough that clock skew cannot keep them alive.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use crate::config::CookieConfig;
use crate::services::auth::CookieUpdate;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// How far in the past a cleared cookie expires. Must stay beyond any
/// plausible client clock skew so deletion is immediate.
const CLEAR_BACKDATE: Duration = Duration::seconds(3600);

#[derive(Debug, Clone)]
pub struct CookiePolicy {
    domain: String,
    local_suffix: String,
}

impl CookiePolicy {
    pub fn new(config: &CookieConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            local_suffix: config.local_suffix.clone(),
        }
    }

    /// Local-development domains are served over plain HTTP.
    pub fn is_local_domain(&self) -> bool {
        self.domain == "localhost" || self.domain.ends_with(&self.local_suffix)
    }

    pub fn secure(&self) -> bool {
        !self.is_local_domain()
    }

    /// Set a session cookie expiring with its token.
    pub fn issue(&self, name: &'static str, value: &str, expires_unix: i64) -> Cookie<'static> {
        let expires = OffsetDateTime::from_unix_timestamp(expires_unix)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        self.build(name, value.to_string(), expires)
    }

    /// Set a session cookie to an empty, long-expired value so the client
    /// deletes it immediately.
    pub fn clear(&self, name: &'static str) -> Cookie<'static> {
        self.build(name, String::new(), OffsetDateTime::now_utc() - CLEAR_BACKDATE)
    }

    fn build(&self, name: &'static str, value: String, expires: OffsetDateTime) -> Cookie<'static> {
        Cookie::build((name, value))
            .expires(expires)
            .path("/")
            .domain(self.domain.clone())
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure())
            .build()
    }

    /// Translate an authentication decision into `Set-Cookie` values.
    /// Each of the two cookies is handled independently: an issued token
    /// sets it, an absent one clears it.
    pub fn cookies_for(&self, update: &CookieUpdate) -> Vec<Cookie<'static>> {
        match update {
            CookieUpdate::Keep => Vec::new(),
            CookieUpdate::Issue(issued) => {
                let access = match issued.access.as_ref() {
                    Some(token) => self.issue(ACCESS_TOKEN_COOKIE, &token.value, token.expires_unix),
                    None => self.clear(ACCESS_TOKEN_COOKIE),
                };
                let refresh = match issued.refresh.as_ref() {
                    Some(token) => {
                        self.issue(REFRESH_TOKEN_COOKIE, &token.value, token.expires_unix)
                    }
                    None => self.clear(REFRESH_TOKEN_COOKIE),
                };
                vec![access, refresh]
            }
            CookieUpdate::Clear => vec![
                self.clear(ACCESS_TOKEN_COOKIE),
                self.clear(REFRESH_TOKEN_COOKIE),
            ],
        }
    }

    /// Apply a decision's cookie side effects to a response jar.
    pub fn apply(&self, jar: CookieJar, update: &CookieUpdate) -> CookieJar {
        self.cookies_for(update)
            .into_iter()
            .fold(jar, |jar, cookie| jar.add(cookie))
    }
}

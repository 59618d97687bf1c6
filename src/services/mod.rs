//! Services layer.
//!
//! Provides the authentication core and its capability boundaries: the
//! identity provider client, the local user store, and the session cookie
//! policy.

mod auth;
mod cookies;
pub mod error;
mod provider;
mod store;

pub use auth::{AuthOutcome, AuthSession, Authenticator, CookieUpdate, IssuedToken, IssuedTokens};
pub use cookies::{CookiePolicy, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use error::ServiceError;
pub use provider::{
    IdentityProvider, Introspection, MockIdentityProvider, OidcProvider, ProviderError,
    ResolvedClaims, TokenSet, UserClaims,
};
pub use store::{MockUserStore, PgUserStore, UserStore};

use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Configuration failure with a stable numeric code.
///
/// Codes: 1 = database URL, 2 = cookie domain, 3 = provider issuer URL,
/// 4 = client id, 5 = client secret, 6 = other service settings.
#[derive(Debug, Error)]
#[error("configuration error {code}: {message}")]
pub struct ConfigError {
    pub code: u8,
    pub message: String,
}

impl ConfigError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub cookies: CookieConfig,
    pub provider: ProviderConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Domain both session cookies are scoped to.
    pub domain: String,
    /// Suffix that marks a local-development domain, e.g. ".local".
    pub local_suffix: String,
}

impl CookieConfig {
    /// Local domains are served over plain HTTP, so the `Secure` cookie flag
    /// and the upgrade-insecure-requests hint to the provider are disabled.
    pub fn is_local(&self) -> bool {
        self.domain == "localhost" || self.domain.ends_with(&self.local_suffix)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub post_login_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(|e| ConfigError::new(6, e))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("session-auth-service"), 6, is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), 6, is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), 6, is_prod)?,
            port: get_env("PORT", Some("8080"), 6, is_prod)?
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::new(6, e.to_string()))?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, 1, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), 1, is_prod)?
                    .parse()
                    .unwrap_or(10),
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), 1, is_prod)?
                    .parse()
                    .unwrap_or(1),
            },
            cookies: CookieConfig {
                domain: get_env("COOKIE_DOMAIN", None, 2, is_prod)?,
                local_suffix: get_env("LOCAL_DOMAIN_SUFFIX", Some(".local"), 2, is_prod)?,
            },
            provider: ProviderConfig {
                issuer_url: get_env("OIDC_ISSUER_URL", None, 3, is_prod)?,
                client_id: get_env("OIDC_CLIENT_ID", None, 4, is_prod)?,
                client_secret: get_env("OIDC_CLIENT_SECRET", None, 5, is_prod)?,
                redirect_uri: get_env("OIDC_REDIRECT_URI", None, 3, is_prod)?,
                post_login_url: get_env("POST_LOGIN_URL", Some("/"), 6, is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    6,
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), 6, is_prod)?
                    .parse()
                    .map_err(|e: String| ConfigError::new(6, e))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::new(6, "PORT must be greater than 0"));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::new(1, "DATABASE_URL must have a value"));
        }

        if self.cookies.domain.is_empty() {
            return Err(ConfigError::new(2, "COOKIE_DOMAIN must have a value"));
        }

        if self.provider.issuer_url.is_empty() {
            return Err(ConfigError::new(3, "OIDC_ISSUER_URL must have a value"));
        }

        if self.provider.redirect_uri.is_empty() {
            return Err(ConfigError::new(3, "OIDC_REDIRECT_URI must have a value"));
        }

        if self.provider.client_id.is_empty() {
            return Err(ConfigError::new(4, "OIDC_CLIENT_ID must have a value"));
        }

        if self.provider.client_secret.is_empty() {
            return Err(ConfigError::new(5, "OIDC_CLIENT_SECRET must have a value"));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(ConfigError::new(
                    6,
                    "Wildcard CORS origin not allowed in production",
                ));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, code: u8, is_prod: bool) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ConfigError::new(
                    code,
                    format!("{} is required in production but not set", key),
                ))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ConfigError::new(
                    code,
                    format!("{} is required but not set", key),
                ))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

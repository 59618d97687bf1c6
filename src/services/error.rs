use thiserror::Error;

use crate::error::AppError;
use crate::services::provider::ProviderError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("identity claims incomplete")]
    IncompleteClaims,
}

impl ServiceError {
    /// Stable code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Database(_) => "database",
            ServiceError::Provider(e) => e.code(),
            ServiceError::IncompleteClaims => "incomplete_claims",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Provider(e) => AppError::AuthError(anyhow::Error::new(e)),
            ServiceError::IncompleteClaims => {
                AppError::AuthError(anyhow::anyhow!("Identity claims incomplete"))
            }
        }
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::Notice;

/// StoreError
///
/// Failures raised at the repository boundary. Never rendered directly; handlers convert
/// them into an `AppError`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("stored value could not be decoded: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation,
            _ => StoreError::Unavailable(e),
        }
    }
}

/// AppError
///
/// The user-visible error taxonomy. Every variant renders as an error `Notice` body.
#[derive(Debug, Error)]
pub enum AppError {
    /// No session, or the session token is invalid/expired, or its user no longer exists.
    #[error("Por favor inicia sesión para acceder a esta página.")]
    Unauthenticated,
    /// Unknown user and wrong password share this single message.
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,
    #[error("No tienes permisos para realizar esta acción")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Integrity(String),
    #[error("No se pudo completar la operación, intenta de nuevo")]
    StoreUnavailable,
    #[error("Error interno del servidor")]
    Internal,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Integrity(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation => {
                AppError::Integrity("El registro ya existe".to_string())
            }
            StoreError::Unavailable(inner) => {
                tracing::error!("store error: {:?}", inner);
                AppError::StoreUnavailable
            }
            StoreError::Corrupt(detail) => {
                tracing::error!("corrupt stored value: {}", detail);
                AppError::Internal
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(Notice::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_never_leak_details() {
        let err: AppError = StoreError::Unavailable(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, AppError::StoreUnavailable));
        assert!(!err.to_string().contains("pool"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unique_violation_maps_to_integrity() {
        let err: AppError = StoreError::UniqueViolation.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}

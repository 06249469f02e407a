use crate::middleware::error_handling;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use uuid::Uuid;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not a participant of conversation {0}")]
    NotParticipant(Uuid),

    #[error("not the recipient of message {0}")]
    NotRecipient(Uuid),

    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("message {0} not found")]
    MessageNotFound(Uuid),

    #[error("store unavailable: {0}")]
    TransientStore(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::TransientStore(e.to_string())
            }
            sqlx::Error::Database(ref db) if is_transient_sqlstate(db.code().as_deref()) => {
                AppError::TransientStore(e.to_string())
            }
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<resilience::TimeoutError> for AppError {
    fn from(e: resilience::TimeoutError) -> Self {
        AppError::TransientStore(e.to_string())
    }
}

/// serialization_failure, deadlock_detected, admin/crash shutdown, cannot_connect_now
fn is_transient_sqlstate(code: Option<&str>) -> bool {
    matches!(code, Some("40001" | "40P01" | "57P01" | "57P02" | "57P03"))
}

impl AppError {
    /// Returns whether the whole logical operation may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::NotParticipant(_) | AppError::NotRecipient(_) => 403,
            AppError::ConversationNotFound(_) | AppError::MessageNotFound(_) => 404,
            AppError::TransientStore(_) => 503,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(AppError::TransientStore("pool timed out".into()).is_retryable());
        assert!(!AppError::Database("syntax error".into()).is_retryable());
        assert!(!AppError::Validation("empty".into()).is_retryable());
        assert!(!AppError::NotParticipant(Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_transient() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::TransientStore(_)));

        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::NotRecipient(Uuid::nil()).status_code(), 403);
        assert_eq!(AppError::MessageNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(AppError::TransientStore("x".into()).status_code(), 503);
        assert_eq!(AppError::Internal.status_code(), 500);
    }

    #[test]
    fn test_sqlstate_classification() {
        assert!(is_transient_sqlstate(Some("40001")));
        assert!(is_transient_sqlstate(Some("40P01")));
        assert!(!is_transient_sqlstate(Some("23505")));
        assert!(!is_transient_sqlstate(None));
    }
}

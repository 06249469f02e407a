use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map domain errors to HTTP status and body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_MISSING),
        AppError::NotParticipant(_) => (
            kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_PARTICIPANT,
        ),
        AppError::NotRecipient(_) => (kinds::AUTHORIZATION_ERROR, error_codes::NOT_MESSAGE_RECIPIENT),
        AppError::ConversationNotFound(_) => {
            (kinds::NOT_FOUND_ERROR, error_codes::CONVERSATION_NOT_FOUND)
        }
        AppError::MessageNotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::TransientStore(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::STORE_UNAVAILABLE,
        ),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Store internals stay in the logs
    let message = match err {
        AppError::Database(_) | AppError::Config(_) | AppError::StartServer(_) => {
            "internal server error".to_string()
        }
        other => other.to_string(),
    };

    (
        status,
        ErrorResponse::for_status(status.as_u16(), &message, error_type, code),
    )
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "request failed");
    }
    HttpResponse::build(status).json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_not_participant_maps_to_403() {
        let (status, body) = map_error(&AppError::NotParticipant(Uuid::nil()));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, error_codes::NOT_CONVERSATION_PARTICIPANT);
        assert_eq!(body.error_type, kinds::AUTHORIZATION_ERROR);
    }

    #[test]
    fn test_transient_store_maps_to_503() {
        let (status, body) = map_error(&AppError::TransientStore("pool timed out".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, error_codes::STORE_UNAVAILABLE);
    }

    #[test]
    fn test_database_details_are_hidden() {
        let (status, body) = map_error(&AppError::Database("relation messages missing".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("relation"));
    }
}

use serde::{Deserialize, Serialize};

/// Unified API error body returned by every service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Reason phrase for the HTTP status ("Not Found", "Forbidden", ...)
    pub error: String,

    /// Human readable message
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error category used by clients for routing, see [`error_types`]
    pub error_type: String,

    /// Stable machine code, see [`error_codes`]
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Request correlation id for log lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build a response whose `error` field is derived from the status code
    pub fn for_status(status: u16, message: &str, error_type: &str, code: &str) -> Self {
        Self::new(reason_phrase(status), message, status, error_type, code)
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Reason phrase for the status codes the services emit
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Stable error codes
pub mod error_codes {
    // Authentication
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";

    // Inbox
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const NOT_CONVERSATION_PARTICIPANT: &str = "NOT_CONVERSATION_PARTICIPANT";
    pub const NOT_MESSAGE_RECIPIENT: &str = "NOT_MESSAGE_RECIPIENT";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Error categories
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "conversation not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::CONVERSATION_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, error_types::NOT_FOUND_ERROR);
        assert_eq!(error.code, error_codes::CONVERSATION_NOT_FOUND);
    }

    #[test]
    fn test_for_status_uses_reason_phrase() {
        let error = ErrorResponse::for_status(
            403,
            "not a participant",
            error_types::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_PARTICIPANT,
        );

        assert_eq!(error.error, "Forbidden");
        assert_eq!(reason_phrase(418), "Error");
    }

    #[test]
    fn test_optional_fields_skipped_when_absent() {
        let error = ErrorResponse::for_status(
            400,
            "content must not be empty",
            error_types::VALIDATION_ERROR,
            error_codes::INVALID_REQUEST,
        );
        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());
        assert!(json.get("trace_id").is_none());

        let json = serde_json::to_value(error.with_trace_id("abc".into())).unwrap();
        assert_eq!(json["trace_id"], "abc");
    }
}

//! HTTP error envelope.
//!
//! Every failed request is answered with the same JSON shape:
//!
//! ```json
//! { "error": { "code": "illegal_transition", "message": "...", "details": { ... } } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::services::ServiceError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Gone,
    UnprocessableEntity,
    TooManyRequests,
    ValidationError,
    IllegalTransition,
    AlreadyReviewed,
    DuplicateEmail,
    InvalidCode,
    TooManyAttempts,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidCode => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict
            | ErrorCode::IllegalTransition
            | ErrorCode::AlreadyReviewed
            | ErrorCode::DuplicateEmail => StatusCode::CONFLICT,
            ErrorCode::Gone => StatusCode::GONE,
            ErrorCode::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::TooManyRequests | ErrorCode::TooManyAttempts => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Gone => "gone",
            ErrorCode::UnprocessableEntity => "unprocessable_entity",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::IllegalTransition => "illegal_transition",
            ErrorCode::AlreadyReviewed => "already_reviewed",
            ErrorCode::DuplicateEmail => "duplicate_email",
            ErrorCode::InvalidCode => "invalid_code",
            ErrorCode::TooManyAttempts => "too_many_attempts",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<HashMap<String, serde_json::Value>>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach a detail field
    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Validation error (400) naming the offending field
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message).with_detail("field", field)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_) => ApiError::new(ErrorCode::ValidationError, message),
            ServiceError::Forbidden(_) => ApiError::forbidden(message),
            ServiceError::NotFound(_) => ApiError::not_found(message),
            ServiceError::IllegalTransition { from, to } => {
                ApiError::new(ErrorCode::IllegalTransition, message)
                    .with_detail("from", from)
                    .with_detail("to", to)
            }
            ServiceError::AlreadyReviewed => ApiError::new(ErrorCode::AlreadyReviewed, message),
            ServiceError::DuplicateEmail => ApiError::new(ErrorCode::DuplicateEmail, message),
            ServiceError::MissingReason => {
                ApiError::new(ErrorCode::UnprocessableEntity, message).with_detail("field", "reason")
            }
            ServiceError::InvalidDepartment(_) => ApiError::new(ErrorCode::UnprocessableEntity, message)
                .with_detail("field", "department"),
            ServiceError::InvalidCode => ApiError::new(ErrorCode::InvalidCode, message),
            ServiceError::CodeExpired => ApiError::new(ErrorCode::Gone, message),
            ServiceError::TooManyAttempts => ApiError::new(ErrorCode::TooManyAttempts, message),
            ServiceError::InvalidCredentials => ApiError::unauthorized(message),
            ServiceError::Conflict(_) => ApiError::new(ErrorCode::Conflict, message),
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ApiError::new(ErrorCode::DatabaseError, "A database error occurred")
            }
            ServiceError::PasswordHash(e) => {
                tracing::error!(error = %e, "Password hashing failed");
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TicketStatus;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::ValidationError.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::IllegalTransition.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::Gone.status_code(), StatusCode::GONE);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_illegal_transition_carries_states() {
        let err = ApiError::from(ServiceError::IllegalTransition {
            from: TicketStatus::Open,
            to: TicketStatus::Closed,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), ErrorCode::IllegalTransition);
        let details = err.details.as_ref().unwrap();
        assert_eq!(details["from"], "Open");
        assert_eq!(details["to"], "Closed");
    }

    #[test]
    fn test_service_error_mapping() {
        let cases = [
            (ServiceError::validation("Title is required"), StatusCode::BAD_REQUEST),
            (ServiceError::forbidden("no"), StatusCode::FORBIDDEN),
            (ServiceError::not_found("Ticket"), StatusCode::NOT_FOUND),
            (ServiceError::AlreadyReviewed, StatusCode::CONFLICT),
            (ServiceError::DuplicateEmail, StatusCode::CONFLICT),
            (ServiceError::MissingReason, StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::InvalidCode, StatusCode::BAD_REQUEST),
            (ServiceError::CodeExpired, StatusCode::GONE),
            (ServiceError::TooManyAttempts, StatusCode::TOO_MANY_REQUESTS),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::Conflict("GRV-2026-000001".to_string()), StatusCode::CONFLICT),
            (ServiceError::Database(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_database_errors_are_not_leaked() {
        let err = ApiError::from(ServiceError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(err.message, "A database error occurred");
    }

    #[test]
    fn test_validation_field_detail() {
        let err = ApiError::validation_field("email", "Invalid email format");
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.details.unwrap()["field"], "email");
    }
}

//! Typed outcomes of the workflow services.
//!
//! Expected domain conditions are variants here; only `Database` and
//! `PasswordHash` represent infrastructure failures.

use thiserror::Error;

use crate::db::TicketStatus;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot move ticket from {from} to {to}")]
    IllegalTransition { from: TicketStatus, to: TicketStatus },

    #[error("Role request has already been reviewed")]
    AlreadyReviewed,

    #[error("An account with this email already exists or is awaiting verification")]
    DuplicateEmail,

    #[error("A reason is required")]
    MissingReason,

    #[error("Invalid department: {0}")]
    InvalidDepartment(String),

    #[error("Verification code is incorrect")]
    InvalidCode,

    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Too many incorrect codes, request a new one")]
    TooManyAttempts,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Ticket {0} was modified concurrently, please retry")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

impl From<argon2::password_hash::Error> for ServiceError {
    fn from(err: argon2::password_hash::Error) -> Self {
        ServiceError::PasswordHash(err.to_string())
    }
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    /// Infrastructure failures, as opposed to domain outcomes
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ServiceError::Database(_) | ServiceError::PasswordHash(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Whether a database error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

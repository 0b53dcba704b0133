//! Input validation for registration, profile and ticket fields.
//!
//! Each check returns `Err(message)` suitable for a `ServiceError::Validation`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic address check: one @, no whitespace, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)+$"
    ).unwrap();
}

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 120;
const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MAX_COMMENT_LENGTH: usize = 2000;

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LENGTH));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// At least eight characters with a letter and a digit
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(format!("Title is too long (max {} characters)", MAX_TITLE_LENGTH));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    let description = description.trim();
    if description.is_empty() {
        return Err("Description is required".to_string());
    }
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(format!(
            "Description is too long (max {} characters)",
            MAX_DESCRIPTION_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_comment(text: &str) -> Result<(), String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("Comment text is required".to_string());
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(format!("Comment is too long (max {} characters)", MAX_COMMENT_LENGTH));
    }
    Ok(())
}

/// Trim an optional free-text field, treating blank as absent
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

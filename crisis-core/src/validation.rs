use regex::Regex;
use std::sync::OnceLock;

use crate::error::ValidationError;

pub const MIN_CONTENT_CHARS: usize = 3;
pub const MAX_CONTENT_CHARS: usize = 500;

/// Returns the trimmed content that gets stored.
pub fn validate_entry_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    let actual = trimmed.chars().count();
    if !(MIN_CONTENT_CHARS..=MAX_CONTENT_CHARS).contains(&actual) {
        return Err(ValidationError::ContentLength {
            min: MIN_CONTENT_CHARS,
            max: MAX_CONTENT_CHARS,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r".+@.+\..+").expect("email pattern is valid"))
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if !email_pattern().is_match(trimmed) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(trimmed.to_string())
}

pub fn validate_sign_up(email: &str, password: &str) -> Result<String, ValidationError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    validate_email(email)
}

/// Returns the trimmed `(email, code)` pair.
pub fn validate_otp(email: &str, code: &str) -> Result<(String, String), ValidationError> {
    let email = email.trim();
    let code = code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(ValidationError::MissingOtp);
    }
    Ok((email.to_string(), code.to_string()))
}

pub fn validate_activity_description(description: &str) -> Result<String, ValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingDescription);
    }
    Ok(trimmed.to_string())
}

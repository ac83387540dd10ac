//! Validation Utilities
//!
//! Input validation functions for user data and API requests.

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

/// Shortest code length the service can be configured to issue
pub const MIN_OTP_DIGITS: usize = 4;

/// Longest code length the service can be configured to issue
pub const MAX_OTP_DIGITS: usize = 10;

/// Validates email address format using a comprehensive regex pattern
pub fn validate_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    regex.is_match(email)
}

/// Normalizes email address to lowercase and removes whitespace
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates that a personal name has a sane length and no control characters
pub fn validate_name(name: &str) -> bool {
    let trimmed = name.trim();

    if trimmed.is_empty() || trimmed.chars().count() > 150 {
        return false;
    }

    !trimmed.chars().any(char::is_control)
}

/// Validates that an OTP candidate consists of exactly `digits` ASCII digits
pub fn validate_otp_format(code: &str, digits: usize) -> bool {
    code.len() == digits && code.bytes().all(|b| b.is_ascii_digit())
}

/// Custom validator for email fields using the validator crate
pub fn email_validator(email: &str) -> Result<(), ValidationError> {
    if validate_email(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}

/// Custom validator for name fields using the validator crate
pub fn name_validator(name: &str) -> Result<(), ValidationError> {
    if validate_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_name"))
    }
}

/// Custom validator for OTP codes
///
/// Only rejects input that could never be a code. The exact length depends
/// on configuration and is checked when the code is verified.
pub fn otp_code_validator(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if (MIN_OTP_DIGITS..=MAX_OTP_DIGITS).contains(&code.len())
        && validate_otp_format(code, code.len())
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_otp_code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.user+tag@domain.co.uk"));
        assert!(!validate_email("invalid.email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
        assert!(!validate_email(""));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  USER@EXAMPLE.COM  "), "user@example.com");
        assert_eq!(normalize_email("Test@Domain.org"), "test@domain.org");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("John"));
        assert!(validate_name("Mary-Jane O'Connor"));
        assert!(validate_name("Алексей"));
        assert!(!validate_name("   "));
        assert!(!validate_name("John\u{0007}"));
        assert!(!validate_name(&"a".repeat(151)));
    }

    #[test]
    fn test_validate_otp_format() {
        assert!(validate_otp_format("012345", 6));
        assert!(!validate_otp_format("12345", 6));
        assert!(!validate_otp_format("12a456", 6));
        assert!(!validate_otp_format("１２３４５６", 6));
    }

    #[test]
    fn test_custom_validators() {
        assert!(email_validator(" user@example.com ").is_ok());
        assert!(email_validator("nope").is_err());
        assert!(name_validator("").is_err());
        assert!(otp_code_validator("123456").is_ok());
        assert!(otp_code_validator("1234").is_ok());
        assert!(otp_code_validator(" 12345678 ").is_ok());
        assert!(otp_code_validator("123").is_err());
        assert!(otp_code_validator("12345678901").is_err());
        assert!(otp_code_validator("12345a").is_err());
    }
}

//! Request and Response Models
//!
//! Data structures for API request and response payloads with validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{auth::TokenPair, user::UserIdentity};
use crate::utils::validation::{email_validator, name_validator, otp_code_validator};

/// Request payload for sending a sign-in code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    /// Optional names stored with the code and filled in on first sign-in
    #[validate(custom(function = "name_validator"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "name_validator"))]
    pub last_name: Option<String>,
}

/// Request payload for re-sending the current code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResendOtpRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,
}

/// Request payload for verifying a code and signing in
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    #[validate(custom(function = "otp_code_validator"))]
    pub otp_code: String,

    /// Names applied only where the identity has none yet
    #[validate(custom(function = "name_validator"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "name_validator"))]
    pub last_name: Option<String>,
}

/// Request payload for password registration gated by an emailed code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,

    #[validate(custom(function = "name_validator"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "name_validator"))]
    pub last_name: Option<String>,
}

/// Request payload for password sign-in
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,
}

/// Request payload for refreshing tokens
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token cannot be empty"))]
    pub refresh_token: String,
}

/// Response for code dispatch (send, resend, register)
#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub message: String,
    pub email: String,
    pub sent: bool,
    pub expires_in: i64,

    /// Present in development mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<String>,
}

/// Response for a completed sign-in
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserIdentity,
    pub is_new_user: bool,
}

impl AuthResponse {
    pub fn new(tokens: TokenPair, user: UserIdentity, is_new_user: bool) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            user,
            is_new_user,
        }
    }
}

/// Response for health check
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Passwords need at least one letter and one digit
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(ValidationError::new("password_missing_letter"));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("password_missing_digit"));
    }

    Ok(())
}

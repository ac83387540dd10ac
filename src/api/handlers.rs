//! HTTP Request Handlers
//!
//! Axum handlers for the email OTP, password and token endpoints.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use validator::Validate;

use crate::{
    models::{otp::OtpDispatch, requests::*, TokenPair},
    service::{AuthService, JwtService, OAuthService},
    utils::{
        error::{AppError, AppResult},
        validation::normalize_email,
    },
    VERSION,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub jwt_service: Arc<JwtService>,
    /// Present only when Google OAuth is configured
    pub oauth_service: Option<Arc<OAuthService>>,
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse<HealthCheckResponse>> {
    Json(SuccessResponse::new(HealthCheckResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: VERSION.to_string(),
    }))
}

/// Send a passwordless sign-in code
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> AppResult<Json<SuccessResponse<OtpSentResponse>>> {
    request.validate().map_err(handle_validation_error)?;

    let dispatch = state
        .auth_service
        .send_otp(&request.email, request.first_name, request.last_name)
        .await?;

    Ok(Json(SuccessResponse::new(otp_sent(&request.email, dispatch))))
}

/// Re-send the active code
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(request): Json<ResendOtpRequest>,
) -> AppResult<Json<SuccessResponse<OtpSentResponse>>> {
    request.validate().map_err(handle_validation_error)?;

    let dispatch = state.auth_service.resend_otp(&request.email).await?;
    Ok(Json(SuccessResponse::new(otp_sent(&request.email, dispatch))))
}

/// Verify a code and sign in, creating the identity on first use
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> AppResult<Json<SuccessResponse<AuthResponse>>> {
    request.validate().map_err(handle_validation_error)?;

    let sign_in = state
        .auth_service
        .verify_and_sign_in(
            &request.email,
            &request.otp_code,
            request.first_name,
            request.last_name,
        )
        .await?;

    Ok(Json(SuccessResponse::new(AuthResponse::new(
        sign_in.tokens,
        sign_in.user,
        sign_in.is_new_user,
    ))))
}

/// Start a password registration
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Json<SuccessResponse<OtpSentResponse>>> {
    request.validate().map_err(handle_validation_error)?;

    let dispatch = state
        .auth_service
        .register(
            &request.email,
            &request.password,
            request.first_name,
            request.last_name,
        )
        .await?;

    Ok(Json(SuccessResponse::new(otp_sent(&request.email, dispatch))))
}

/// Password sign-in
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<SuccessResponse<AuthResponse>>> {
    request.validate().map_err(handle_validation_error)?;

    let sign_in = state
        .auth_service
        .login_with_password(&request.email, &request.password)
        .await?;

    Ok(Json(SuccessResponse::new(AuthResponse::new(
        sign_in.tokens,
        sign_in.user,
        sign_in.is_new_user,
    ))))
}

/// Rotate a refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> AppResult<Json<SuccessResponse<TokenPair>>> {
    request.validate().map_err(handle_validation_error)?;

    let tokens = state.jwt_service.refresh(&request.refresh_token).await?;
    Ok(Json(SuccessResponse::new(tokens)))
}

fn otp_sent(email: &str, dispatch: OtpDispatch) -> OtpSentResponse {
    let message = if dispatch.sent {
        "Verification code sent"
    } else {
        "Verification code issued but the email could not be delivered, try resending"
    };

    OtpSentResponse {
        message: message.to_string(),
        email: normalize_email(email),
        sent: dispatch.sent,
        expires_in: dispatch.expires_in,
        otp_code: dispatch.debug_code,
    }
}

/// Handle validation errors from request parsing
pub fn handle_validation_error(err: validator::ValidationErrors) -> AppError {
    let mut messages = Vec::new();

    for (field, errors) in err.field_errors() {
        for error in errors {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value for field '{}'", field));
            messages.push(format!("{}: {}", field, message));
        }
    }
    messages.sort();

    AppError::Validation(messages.join(", "))
}

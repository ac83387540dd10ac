//! OAuth HTTP Request Handlers
//!
//! Axum handlers for the Google OAuth flow. Initiation returns the
//! authorization URL as JSON; the callback always ends in a redirect to the
//! frontend, carrying either tokens or an error code in the URL fragment.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{Json, Redirect},
};
use log::{info, warn};

use crate::{
    models::{
        oauth::{OAuthCallbackQuery, OAuthInitResponse},
        requests::SuccessResponse,
    },
    service::OAuthService,
    utils::error::{AppError, AppResult},
};

use super::handlers::AppState;

fn oauth_service(state: &AppState) -> AppResult<&Arc<OAuthService>> {
    state
        .oauth_service
        .as_ref()
        .ok_or_else(|| AppError::Configuration("Google OAuth is not configured".to_string()))
}

/// Handler for initiating Google OAuth flow
///
/// **Endpoint:** `GET /auth/google/init`
///
/// **Response:**
/// ```json
/// {
///   "success": true,
///   "data": {
///     "authorization_url": "https://accounts.google.com/o/oauth2/v2/auth?...",
///     "state": "secure_random_state_token",
///     "redirect_uri": "http://localhost:8000/api/auth/google/callback/"
///   }
/// }
/// ```
pub async fn initiate_google_oauth(
    State(state): State<AppState>,
) -> AppResult<Json<SuccessResponse<OAuthInitResponse>>> {
    let response = oauth_service(&state)?.initiate().await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// Handler for Google OAuth callback
///
/// **Endpoint:** `GET /auth/google/callback`
///
/// Responds with `303 See Other` to `{frontend_url}/auth#...`. Flow failures
/// are reported in the fragment as `error=<code>`, never as an error status.
pub async fn handle_google_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AppResult<Redirect> {
    let service = oauth_service(&state)?;

    let outcome = service.handle_callback(query).await;
    match &outcome {
        Ok(sign_in) => info!(
            "Google sign-in completed for {} (new user: {})",
            sign_in.user.id, sign_in.is_new_user
        ),
        Err(e) => warn!("Google callback failed ({}): {}", e.error_code(), e),
    }

    Ok(Redirect::to(&service.callback_redirect(&outcome)))
}

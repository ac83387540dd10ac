//! OAuth Service
//!
//! Drives the Google login flow: initiation with a fresh state token, and
//! the callback state machine that validates the state, exchanges the code,
//! fetches the profile, reconciles the identity and issues tokens.
//!
//! Every callback failure maps to a stable error code that is delivered to
//! the client application in the redirect fragment.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;

use crate::config::{AuthFlowConfig, ExecutionMode};
use crate::models::auth::SignIn;
use crate::models::oauth::{OAuthCallbackQuery, OAuthInitResponse};
use crate::service::google::{IdentityProvider, ProviderError};
use crate::service::identity::IdentityReconciler;
use crate::service::jwt::CredentialIssuer;
use crate::service::oauth_state::OAuthStateManager;
use crate::utils::error::AppError;

/// Callback failures, in the order the flow checks them
#[derive(Error, Debug)]
pub enum OAuthFlowError {
    /// The provider redirected back with an `error` parameter
    #[error("OAuth provider returned an error: {0}")]
    ProviderDenied(String),

    #[error("Missing code or state parameter")]
    MissingParameters,

    #[error("Invalid, expired or already used state")]
    InvalidOrReplayedState,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Failed to fetch user info: {0}")]
    ProfileFetchFailed(String),

    #[error("Provider profile is missing email or subject id")]
    IncompleteProfile,

    #[error("Callback processing failed: {0}")]
    Internal(String),
}

impl OAuthFlowError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthFlowError::ProviderDenied(_) => "provider_error",
            OAuthFlowError::MissingParameters => "missing_params",
            OAuthFlowError::InvalidOrReplayedState => "invalid_state",
            OAuthFlowError::TokenExchangeFailed(_) => "token_exchange_failed",
            OAuthFlowError::ProfileFetchFailed(_) => "user_info_failed",
            OAuthFlowError::IncompleteProfile => "incomplete_user_data",
            OAuthFlowError::Internal(_) => "callback_failed",
        }
    }

    /// Message safe to show to the end user
    ///
    /// Internal detail is only included in development mode.
    pub fn public_message(&self, mode: ExecutionMode) -> String {
        if mode.is_development() {
            return self.to_string();
        }

        match self {
            OAuthFlowError::ProviderDenied(_) => "Google sign-in was cancelled or denied",
            OAuthFlowError::MissingParameters => "Google sign-in response was incomplete",
            OAuthFlowError::InvalidOrReplayedState => "Sign-in session expired, please try again",
            OAuthFlowError::TokenExchangeFailed(_) | OAuthFlowError::ProfileFetchFailed(_) => {
                "Could not complete sign-in with Google"
            }
            OAuthFlowError::IncompleteProfile => "Google account did not provide an email address",
            OAuthFlowError::Internal(_) => "Sign-in failed, please try again",
        }
        .to_string()
    }
}

impl From<OAuthFlowError> for AppError {
    fn from(err: OAuthFlowError) -> Self {
        match err {
            OAuthFlowError::ProviderDenied(_) | OAuthFlowError::MissingParameters => {
                AppError::BadRequest(err.to_string())
            }
            OAuthFlowError::InvalidOrReplayedState => AppError::Authentication(err.to_string()),
            OAuthFlowError::TokenExchangeFailed(msg) | OAuthFlowError::ProfileFetchFailed(msg) => {
                AppError::ExternalService(msg)
            }
            OAuthFlowError::IncompleteProfile => AppError::BadRequest(err.to_string()),
            OAuthFlowError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// OAuth exchange orchestrator
pub struct OAuthService {
    states: OAuthStateManager,
    provider: Arc<dyn IdentityProvider>,
    reconciler: Arc<IdentityReconciler>,
    issuer: Arc<dyn CredentialIssuer>,
    config: AuthFlowConfig,
}

impl OAuthService {
    pub fn new(
        states: OAuthStateManager,
        provider: Arc<dyn IdentityProvider>,
        reconciler: Arc<IdentityReconciler>,
        issuer: Arc<dyn CredentialIssuer>,
        config: AuthFlowConfig,
    ) -> Self {
        Self {
            states,
            provider,
            reconciler,
            issuer,
            config,
        }
    }

    pub fn config(&self) -> &AuthFlowConfig {
        &self.config
    }

    pub fn states(&self) -> &OAuthStateManager {
        &self.states
    }

    /// Start a login: persist a fresh state and build the authorization URL
    pub async fn initiate(&self) -> Result<OAuthInitResponse, OAuthFlowError> {
        let record = self
            .states
            .create_state()
            .await
            .map_err(|e| OAuthFlowError::Internal(e.to_string()))?;

        info!("Initiated Google OAuth flow");
        Ok(OAuthInitResponse {
            authorization_url: self.provider.authorization_url(&record.state),
            state: record.state,
            redirect_uri: self.config.redirect_uri.clone(),
        })
    }

    /// Process the provider callback
    ///
    /// The state is consumed before any network call, so a replayed callback
    /// never reaches the provider. A failed exchange is not retried; the
    /// state is already spent and the user has to start over.
    pub async fn handle_callback(
        &self,
        query: OAuthCallbackQuery,
    ) -> Result<SignIn, OAuthFlowError> {
        if let Some(error) = query.error {
            let description = query.error_description.unwrap_or_else(|| error.clone());
            warn!("Google OAuth returned error: {} - {}", error, description);
            return Err(OAuthFlowError::ProviderDenied(error));
        }

        let (code, state) = match (query.code, query.state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
            _ => return Err(OAuthFlowError::MissingParameters),
        };

        let consumed = self
            .states
            .consume_state(&state)
            .await
            .map_err(|e| OAuthFlowError::Internal(e.to_string()))?;
        if !consumed {
            return Err(OAuthFlowError::InvalidOrReplayedState);
        }

        let access_token = self
            .with_timeout(self.provider.exchange_code(&code))
            .await
            .map_err(OAuthFlowError::TokenExchangeFailed)?;

        let profile = self
            .with_timeout(self.provider.fetch_profile(&access_token))
            .await
            .map_err(OAuthFlowError::ProfileFetchFailed)?;

        let (federated_id, email) = match (profile.id, profile.email) {
            (Some(id), Some(email)) if !id.trim().is_empty() && !email.trim().is_empty() => {
                (id, email)
            }
            _ => return Err(OAuthFlowError::IncompleteProfile),
        };

        let reconciled = self
            .reconciler
            .reconcile_by_federated_id(
                &federated_id,
                &email,
                profile.given_name,
                profile.family_name,
            )
            .await
            .map_err(|e| {
                error!("Identity reconciliation failed for federated login: {}", e);
                OAuthFlowError::Internal(e.to_string())
            })?;

        let tokens = self.issuer.issue(&reconciled.user).await.map_err(|e| {
            error!("Token issuance failed for {}: {}", reconciled.user.id, e);
            OAuthFlowError::Internal(e.to_string())
        })?;

        info!(
            "Google OAuth login completed for {} (new user: {})",
            reconciled.user.id, reconciled.created
        );
        Ok(SignIn {
            user: reconciled.user,
            tokens,
            is_new_user: reconciled.created,
        })
    }

    /// Client-application URL that carries the callback outcome in its fragment
    pub fn callback_redirect(&self, outcome: &Result<SignIn, OAuthFlowError>) -> String {
        let base = format!("{}/auth", self.config.frontend_url.trim_end_matches('/'));
        let mut fragment = url::form_urlencoded::Serializer::new(String::new());

        match outcome {
            Ok(login) => {
                fragment
                    .append_pair("access", &login.tokens.access_token)
                    .append_pair("refresh", &login.tokens.refresh_token)
                    .append_pair("success", "true")
                    .append_pair("method", "google")
                    .append_pair("new_user", if login.is_new_user { "true" } else { "false" });
            }
            Err(err) => {
                fragment.append_pair("error", err.error_code());
                let mode = self.config.execution_mode;
                if mode.is_development() {
                    fragment.append_pair("message", &err.public_message(mode));
                }
            }
        }

        format!("{}#{}", base, fragment.finish())
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, String> {
        let limit = Duration::from_secs(self.config.provider_timeout_seconds);
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Identity provider call failed: {}", e);
                Err(e.to_string())
            }
            Err(_) => {
                warn!("Identity provider call timed out after {:?}", limit);
                Err(format!("timed out after {}s", limit.as_secs()))
            }
        }
    }
}

//! Google Identity Provider
//!
//! Authorization URL construction, code exchange and profile lookup against
//! Google's OAuth 2.0 endpoints.

use std::time::Duration;

use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;
use crate::models::oauth::ProviderProfile;

/// Identity provider failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Profile request failed: {0}")]
    Profile(String),
}

/// External OAuth identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the user agent is sent to, carrying `state`
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a provider access token
    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    /// Fetch the profile of the user the access token belongs to
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;
}

/// Google OAuth 2.0 provider
pub struct GoogleIdentityProvider {
    client: BasicClient,
    http_client: HttpClient,
    userinfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(
        config: &GoogleOAuthConfig,
        redirect_uri: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(config.auth_url.clone()).map_err(|e| {
                ProviderError::Configuration(format!("Invalid Google auth URL: {}", e))
            })?,
            Some(TokenUrl::new(config.token_url.clone()).map_err(|e| {
                ProviderError::Configuration(format!("Invalid Google token URL: {}", e))
            })?),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string()).map_err(|e| {
            ProviderError::Configuration(format!("Invalid redirect URI: {}", e))
        })?);

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            http_client,
            userinfo_url: config.userinfo_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let state = state.to_string();
        let (url, _) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_extra_param("access_type", "online")
            .add_extra_param("prompt", "select_account")
            .url();

        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| ProviderError::TokenExchange(e.to_string()))?;

        let access_token = token_response.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(ProviderError::TokenExchange(
                "Provider returned an empty access token".to_string(),
            ));
        }
        Ok(access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Profile(format!(
                "Google API returned error: {}",
                response.status()
            )));
        }

        response
            .json::<ProviderProfile>()
            .await
            .map_err(|e| ProviderError::Profile(format!("Failed to parse user info: {}", e)))
    }
}

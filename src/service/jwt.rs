//! JWT Authentication Service
//!
//! Issues HS256 access/refresh token pairs and rotates refresh tokens. Each
//! refresh token is backed by a session in the ephemeral store that can be
//! exchanged exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{
    AccessTokenClaims, RefreshSession, RefreshTokenClaims, TokenPair, UserIdentity,
};
use crate::store::{get_json, keys, put_json, swap_json, EphemeralStore, StoreError};
use crate::utils::error::AppError;
use crate::utils::security::hash_sensitive_data;

/// Token errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token generation failed: {0}")]
    Generation(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A refresh token whose session was already exchanged
    #[error("Refresh token has already been used")]
    Reused,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(_) | TokenError::Reused => {
                AppError::Authentication(err.to_string())
            }
            TokenError::Store(e) => e.into(),
            TokenError::Generation(msg) => AppError::Internal(msg),
        }
    }
}

/// Mints credentials for a reconciled identity
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, identity: &UserIdentity) -> Result<TokenPair, TokenError>;
}

/// JWT authentication service for token management and validation
#[derive(Clone)]
pub struct JwtService {
    store: Arc<dyn EphemeralStore>,
    access_secret: String,
    refresh_secret: String,
    issuer: String,
    /// Access token lifetime (default: 1 hour)
    access_token_expires_in: Duration,
    /// Refresh token lifetime (default: 7 days)
    refresh_token_expires_in: Duration,
}

impl JwtService {
    pub fn new(store: Arc<dyn EphemeralStore>, config: &JwtConfig) -> Self {
        Self {
            store,
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            issuer: config.issuer.clone(),
            access_token_expires_in: Duration::seconds(config.access_token_expires_seconds),
            refresh_token_expires_in: Duration::seconds(config.refresh_token_expires_seconds),
        }
    }

    /// Generate a new token pair and persist its refresh session
    pub async fn generate_token_pair(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access_expires_at = now + self.access_token_expires_in;
        let refresh_expires_at = now + self.refresh_token_expires_in;

        let access_claims =
            AccessTokenClaims::new(user_id, email, &self.issuer, access_expires_at, now);
        let access_token = self.encode_access_token(&access_claims)?;

        let session_id = Uuid::new_v4();
        let refresh_claims =
            RefreshTokenClaims::new(user_id, session_id, &self.issuer, refresh_expires_at, now);
        let refresh_token = self.encode_refresh_token(&refresh_claims)?;

        let session = RefreshSession {
            session_id,
            user_id,
            email: email.to_string(),
            token_hash: hash_sensitive_data(&refresh_token),
            created_at: now,
            expires_at: refresh_expires_at,
            used: false,
        };
        put_json(
            self.store.as_ref(),
            &keys::refresh_session(&session_id.to_string()),
            &session,
            refresh_expires_at,
        )
        .await?;

        Ok(TokenPair::new(
            access_token,
            refresh_token,
            self.access_token_expires_in.num_seconds(),
        ))
    }

    /// Exchange a refresh token for a new pair, consuming its session
    ///
    /// Presenting the same refresh token twice fails the second time.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.decode_refresh_token(refresh_token)?;
        let session_id = Uuid::parse_str(&claims.session_id)
            .map_err(|_| TokenError::InvalidToken("Invalid session ID in token".into()))?;
        let key = keys::refresh_session(&session_id.to_string());

        let current = get_json::<RefreshSession>(self.store.as_ref(), &key)
            .await?
            .ok_or_else(|| TokenError::InvalidToken("Session not found or expired".into()))?;

        if current.value.token_hash != hash_sensitive_data(refresh_token) {
            return Err(TokenError::InvalidToken("Invalid refresh token".into()));
        }
        if current.value.used {
            warn!("Refresh token reuse detected for user {}", current.value.user_id);
            return Err(TokenError::Reused);
        }

        let mut consumed = current.value.clone();
        consumed.used = true;
        if !swap_json(self.store.as_ref(), &key, &current, &consumed).await? {
            warn!("Concurrent refresh lost for user {}", current.value.user_id);
            return Err(TokenError::Reused);
        }

        info!("Rotated refresh session for user {}", current.value.user_id);
        self.generate_token_pair(current.value.user_id, &current.value.email)
            .await
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let claims = self.decode_access_token(token)?;
        if claims.token_type != "access" {
            return Err(TokenError::InvalidToken("Not an access token".into()));
        }
        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation
    }

    fn encode_access_token(&self, claims: &AccessTokenClaims) -> Result<String, TokenError> {
        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(self.access_secret.as_ref());

        encode(&header, claims, &encoding_key).map_err(|e| TokenError::Generation(e.to_string()))
    }

    fn encode_refresh_token(&self, claims: &RefreshTokenClaims) -> Result<String, TokenError> {
        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(self.refresh_secret.as_ref());

        encode(&header, claims, &encoding_key).map_err(|e| TokenError::Generation(e.to_string()))
    }

    fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let decoding_key = DecodingKey::from_secret(self.access_secret.as_ref());

        decode::<AccessTokenClaims>(token, &decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))
    }

    fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        let decoding_key = DecodingKey::from_secret(self.refresh_secret.as_ref());

        let claims = decode::<RefreshTokenClaims>(token, &decoding_key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))?;

        if claims.token_type != "refresh" {
            return Err(TokenError::InvalidToken("Not a refresh token".into()));
        }
        Ok(claims)
    }
}

#[async_trait]
impl CredentialIssuer for JwtService {
    async fn issue(&self, identity: &UserIdentity) -> Result<TokenPair, TokenError> {
        self.generate_token_pair(identity.id, &identity.email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn create_test_service() -> JwtService {
        let config = JwtConfig {
            access_secret: "test_access_secret_key_with_32_bytes!".to_string(),
            refresh_secret: "test_refresh_secret_key_with_32_bytes".to_string(),
            access_token_expires_seconds: 3600,
            refresh_token_expires_seconds: 7 * 24 * 3600,
            issuer: "identity-service".to_string(),
        };
        JwtService::new(Arc::new(MemoryStore::new()), &config)
    }

    #[tokio::test]
    async fn test_issue_and_validate_access_token() {
        let service = create_test_service();
        let user_id = Uuid::new_v4();

        let pair = service
            .generate_token_pair(user_id, "user@example.com")
            .await
            .unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);

        let claims = service.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let service = create_test_service();
        let pair = service
            .generate_token_pair(Uuid::new_v4(), "user@example.com")
            .await
            .unwrap();

        assert!(service.validate_access_token(&pair.refresh_token).is_err());
        assert!(service.refresh(&pair.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_reuse() {
        let service = create_test_service();
        let user_id = Uuid::new_v4();
        let pair = service
            .generate_token_pair(user_id, "user@example.com")
            .await
            .unwrap();

        let rotated = service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        let claims = service.validate_access_token(&rotated.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);

        let reused = service.refresh(&pair.refresh_token).await;
        assert!(matches!(reused, Err(TokenError::Reused)));

        assert!(service.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_garbage_tokens_are_rejected() {
        let service = create_test_service();
        assert!(service.validate_access_token("not.a.jwt").is_err());
        assert!(matches!(
            service.refresh("not.a.jwt").await,
            Err(TokenError::InvalidToken(_))
        ));
    }
}

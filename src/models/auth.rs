//! Authentication Models
//!
//! Data structures for JWT issuance and refresh-session rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserIdentity;

/// Refresh session stored in the ephemeral store
///
/// A session backs exactly one refresh token and is consumed the first time
/// that token is exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub user_id: Uuid,

    /// Carried into the access tokens minted on refresh
    pub email: String,

    /// SHA-256 of the refresh JWT
    pub token_hash: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// JWT token pair containing access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token for API authentication
    pub access_token: String,

    /// Single-use refresh token for obtaining a new pair
    pub refresh_token: String,

    /// Token type (always "Bearer" for JWT)
    pub token_type: String,

    /// Access token expiration time in seconds
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Completed sign-in: the reconciled identity and its fresh credentials
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: UserIdentity,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

/// JWT claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject - user ID
    pub sub: String,

    /// Subject email at issuance time
    pub email: String,

    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,

    /// Token type (always "access")
    #[serde(rename = "type")]
    pub token_type: String,
}

impl AccessTokenClaims {
    pub fn new(
        user_id: Uuid,
        email: &str,
        issuer: &str,
        expires_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            iss: issuer.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: "access".to_string(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(&self.sub)
    }
}

/// JWT claims structure for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject - user ID
    pub sub: String,

    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,

    /// Token type (always "refresh")
    #[serde(rename = "type")]
    pub token_type: String,

    /// Session this refresh token belongs to
    pub session_id: String,
}

impl RefreshTokenClaims {
    pub fn new(
        user_id: Uuid,
        session_id: Uuid,
        issuer: &str,
        expires_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: "refresh".to_string(),
            session_id: session_id.to_string(),
        }
    }
}

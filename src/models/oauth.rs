//! OAuth Models
//!
//! Data structures for the federated (Google) login flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth state record for CSRF and replay protection
///
/// Created when a flow is initiated and consumed exactly once by the
/// callback that carries it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthStateRecord {
    /// Unguessable URL-safe token
    pub state: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Set once by the single successful consumer
    pub used: bool,
}

impl OAuthStateRecord {
    pub fn new(state: String, ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        Self {
            state,
            created_at,
            expires_at: created_at + chrono::Duration::seconds(ttl_seconds as i64),
            used: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Profile returned by the identity provider's userinfo endpoint
///
/// Every field is optional on the wire; completeness is checked by the
/// callback flow rather than by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider's stable subject identifier
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub verified_email: Option<bool>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,
}

/// Query parameters delivered to the OAuth callback endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthCallbackQuery {
    /// Authorization code to exchange for an access token
    pub code: Option<String>,

    /// State token issued by `initiate`
    pub state: Option<String>,

    /// Error code when the user denied consent or the provider failed
    pub error: Option<String>,

    pub error_description: Option<String>,
}

/// Response from initiating the OAuth flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthInitResponse {
    /// Provider authorization URL the client must navigate to
    pub authorization_url: String,

    pub state: String,

    pub redirect_uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_record_expiry() {
        let record = OAuthStateRecord::new("token".to_string(), 900);
        assert!(!record.is_expired());
        assert!(!record.used);

        let expired = OAuthStateRecord::new("token".to_string(), 0);
        assert!(expired.is_expired());
    }

    #[test]
    fn test_profile_tolerates_missing_fields() {
        let profile: ProviderProfile = serde_json::from_value(json!({
            "id": "1234567890",
            "name": "Test User"
        }))
        .unwrap();

        assert_eq!(profile.id.as_deref(), Some("1234567890"));
        assert!(profile.email.is_none());
        assert!(profile.given_name.is_none());
    }

    #[test]
    fn test_callback_query_deserialization() {
        let query: OAuthCallbackQuery = serde_json::from_value(json!({
            "error": "access_denied"
        }))
        .unwrap();

        assert_eq!(query.error.as_deref(), Some("access_denied"));
        assert!(query.code.is_none());
        assert!(query.state.is_none());
    }
}

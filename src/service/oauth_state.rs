//! OAuth State Manager
//!
//! Issues and consumes the single-use state tokens that bind an OAuth
//! callback to the flow that started it.

use std::sync::Arc;

use log::{debug, warn};

use crate::models::oauth::OAuthStateRecord;
use crate::store::{get_json, keys, put_json, swap_json, EphemeralStore, StoreError};
use crate::utils::security::SecretGenerator;

/// Creates and consumes OAuth state records
pub struct OAuthStateManager {
    store: Arc<dyn EphemeralStore>,
    secrets: Arc<dyn SecretGenerator>,
    ttl_seconds: u64,
}

impl OAuthStateManager {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        secrets: Arc<dyn SecretGenerator>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            secrets,
            ttl_seconds,
        }
    }

    /// Create and persist a fresh, unused state
    pub async fn create_state(&self) -> Result<OAuthStateRecord, StoreError> {
        let record = OAuthStateRecord::new(self.secrets.state_token(), self.ttl_seconds);
        put_json(
            self.store.as_ref(),
            &keys::oauth_state(&record.state),
            &record,
            record.expires_at,
        )
        .await?;

        debug!("Created OAuth state expiring at {}", record.expires_at);
        Ok(record)
    }

    /// Consume `token` exactly once
    ///
    /// Returns `true` only for a state that exists, has not expired and has
    /// not been consumed. Of several concurrent callers presenting the same
    /// token at most one gets `true`.
    pub async fn consume_state(&self, token: &str) -> Result<bool, StoreError> {
        if token.is_empty() {
            return Ok(false);
        }

        let key = keys::oauth_state(token);
        let current = match get_json::<OAuthStateRecord>(self.store.as_ref(), &key).await? {
            Some(current) => current,
            None => {
                warn!("OAuth callback presented an unknown or expired state");
                return Ok(false);
            }
        };

        if current.value.used || current.value.is_expired() {
            warn!("OAuth callback presented a used or expired state");
            return Ok(false);
        }

        let mut consumed = current.value.clone();
        consumed.used = true;

        let won = swap_json(self.store.as_ref(), &key, &current, &consumed).await?;
        if !won {
            warn!("OAuth state was consumed by a concurrent callback");
        }
        Ok(won)
    }
}

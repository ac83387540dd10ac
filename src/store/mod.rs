//! Ephemeral Store
//!
//! Key/value storage with a per-entry expiry for the short-lived secrets of
//! the service: OTP records, OAuth state tokens and refresh sessions.
//!
//! Values are JSON documents. Every read-modify-write goes through
//! [`EphemeralStore::compare_and_swap`], which succeeds only while the live
//! value is byte-for-byte the one the caller read. Expiry is lazy: an expired
//! entry is invisible to every operation and is physically removed on the next
//! access or by [`EphemeralStore::purge_expired`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::utils::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PgEphemeralStore;

/// Errors raised by ephemeral store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Concurrent updates kept conflicting on key {0}")]
    Contention(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Storage contract for expiring entries
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Read the live value under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, replacing anything already there
    async fn put(&self, key: &str, value: String, expires_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Remove `key`; returns whether a live entry was removed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically replace the live value under `key` if it still equals
    /// `expected`. `None` as the replacement deletes the entry. The entry keeps
    /// its original expiry. Returns `false` when the value changed, expired or
    /// vanished in the meantime.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        replacement: Option<String>,
    ) -> Result<bool, StoreError>;

    /// Physically remove expired entries, returning how many were dropped
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// A decoded value together with the raw JSON it was read from
///
/// The raw text is the `expected` argument for a later compare-and-swap.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub raw: String,
}

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn EphemeralStore,
    key: &str,
) -> Result<Option<Versioned<T>>, StoreError> {
    match store.get(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)?;
            Ok(Some(Versioned { value, raw }))
        }
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn put_json<T: Serialize>(
    store: &dyn EphemeralStore,
    key: &str,
    value: &T,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.put(key, raw, expires_at).await
}

/// Compare-and-swap a decoded value against the version it was read from
pub async fn swap_json<T: Serialize>(
    store: &dyn EphemeralStore,
    key: &str,
    current: &Versioned<T>,
    replacement: &T,
) -> Result<bool, StoreError> {
    let raw = serde_json::to_string(replacement)?;
    store.compare_and_swap(key, &current.raw, Some(raw)).await
}

/// Key layout shared by every backend
pub mod keys {
    /// Authoritative OTP record for a normalized email
    pub fn otp(email: &str) -> String {
        format!("otp:{}", email)
    }

    /// OAuth state record
    pub fn oauth_state(state: &str) -> String {
        format!("oauth_state:{}", state)
    }

    /// Refresh session by session id
    pub fn refresh_session(session_id: &str) -> String {
        format!("refresh:{}", session_id)
    }
}

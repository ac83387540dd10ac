//! In-memory ephemeral store
//!
//! Suitable for single-instance deployments and tests. Every operation runs
//! inside one mutex critical section, which makes compare-and-swap atomic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EphemeralStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Process-local store backed by a `HashMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Drop `key` if it has expired, so callers only ever see live entries
    fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        Self::evict_if_expired(&mut entries, key, Utc::now());
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        Self::evict_if_expired(&mut entries, key, Utc::now());
        Ok(entries.remove(key).is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        replacement: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        Self::evict_if_expired(&mut entries, key, Utc::now());

        let matches = entries
            .get(key)
            .is_some_and(|entry| entry.value == expected);
        if !matches {
            return Ok(false);
        }

        match replacement {
            Some(value) => {
                if let Some(entry) = entries.get_mut(key) {
                    entry.value = value;
                }
            }
            None => {
                entries.remove(key);
            }
        }
        Ok(true)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_minutes(minutes: i64) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string(), in_minutes(5)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.put("k", "v".to_string(), in_minutes(-1)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.compare_and_swap("k", "v", None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();
        store.put("k", "one".to_string(), in_minutes(5)).await.unwrap();

        assert!(!store
            .compare_and_swap("k", "zero", Some("two".to_string()))
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("k", "one", Some("two".to_string()))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("two".to_string()));

        assert!(store.compare_and_swap("k", "two", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_swaps_have_single_winner() {
        let store = MemoryStore::new();
        store.put("k", "fresh".to_string(), in_minutes(5)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_swap("k", "fresh", Some(format!("taken-{}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.put("old", "v".to_string(), in_minutes(-1)).await.unwrap();
        store.put("new", "v".to_string(), in_minutes(5)).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}

//! In-process key-value store
//!
//! Mirrors the redis command semantics the cache manager relies on,
//! including lazy expiry: an expired entry is indistinguishable from
//! an absent one and is dropped the next time it is touched.
//! Expiry is measured on the tokio clock so paused-time tests work.

use crate::errors::CacheError;
use crate::store::{KeyValueStore, glob_match};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Memory-backed store with per-key TTL
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        if ttl_seconds == 0 {
            return Err(CacheError::InvalidTtl(ttl_seconds));
        }
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.lock();
        let mut matched: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set_ex("dashboard:k", "\"v\"", 1).await.unwrap();
        assert_eq!(store.get("dashboard:k").await.unwrap().as_deref(), Some("\"v\""));

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(store.get("dashboard:k").await.unwrap(), None);
        assert!(!store.exists("dashboard:k").await.unwrap());
        assert!(store.keys("dashboard:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let store = MemoryStore::new();
        let err = store.set_ex("k", "v", 0).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl(0)));
    }

    #[tokio::test]
    async fn del_counts_only_removed_keys() {
        let store = MemoryStore::new();
        store.set_ex("a", "1", 60).await.unwrap();
        store.set_ex("b", "2", 60).await.unwrap();

        let deleted = store
            .del(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_entries() {
        let store = MemoryStore::new();
        store.set_ex("short", "1", 1).await.unwrap();
        store.set_ex("long", "2", 100).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}

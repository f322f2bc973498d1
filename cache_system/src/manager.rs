//! Cache manager implementation
//!
//! This module provides the main CacheManager struct: namespaced
//! cache-aside access to a shared key-value store. Every store failure
//! is logged and degraded to a miss or a no-op; only failures of the
//! caller's compute closure reach the caller.

use crate::errors::CacheError;
use crate::keys;
use crate::memory_store::MemoryStore;
use crate::redis_store::RedisStore;
use crate::store::{KeyValueStore, escape_glob};
use config::CacheConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type InFlightMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Cache-aside manager over a shared key-value store
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    config: Arc<CacheConfig>,
    in_flight: Arc<InFlightMap>,
}

impl Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("in_flight", &self.lock_in_flight().len())
            .finish()
    }
}

impl CacheManager {
    /// Create a cache manager backed by the configured redis server
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let store = RedisStore::new(&config.redis_url, config.connection_timeout())?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Create a cache manager over any store implementation
    pub fn with_store(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a cache manager over a fresh in-process store
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    /// Namespace used when a call does not name one
    pub fn default_namespace(&self) -> &str {
        &self.config.key_prefix
    }

    /// Build `{namespace}:{key}`
    pub fn full_key(&self, key: &str, namespace: Option<&str>) -> String {
        format!("{}:{}", self.namespace(namespace), key)
    }

    /// Hash free-form key parts, for callers that build keys by hand
    pub fn cache_key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys::hash_parts(parts)
    }

    fn namespace<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.config.key_prefix)
    }

    fn effective_ttl(&self, ttl: Option<u64>) -> u64 {
        match ttl {
            Some(0) => {
                tracing::warn!(
                    default_ttl = self.config.default_ttl,
                    "zero TTL requested, using default"
                );
                self.config.default_ttl
            }
            Some(ttl) => ttl,
            None => self.config.default_ttl,
        }
    }

    /// Read and decode one fully qualified key; any failure reads as absent
    async fn read<T>(&self, full_key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = match self.store.get(full_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = full_key, error = %e, "cache get failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = full_key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Encode and write one fully qualified key; returns whether it was stored
    async fn write<T>(&self, full_key: &str, value: &T, ttl: Option<u64>) -> bool
    where
        T: Serialize + ?Sized,
    {
        let json_str = match serde_json::to_string(value) {
            Ok(json_str) => json_str,
            Err(e) => {
                tracing::warn!(key = full_key, error = %e, "cache value not serializable");
                return false;
            }
        };

        let ttl = self.effective_ttl(ttl);
        match self.store.set_ex(full_key, &json_str, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = full_key, ttl, error = %e, "cache set failed");
                false
            }
        }
    }

    /// Get a cached value
    pub async fn get<T>(&self, key: &str, namespace: Option<&str>) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.read(&self.full_key(key, namespace)).await
    }

    /// Store a value; `ttl = None` applies the configured default
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<u64>, namespace: Option<&str>) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.write(&self.full_key(key, namespace), value, ttl).await
    }

    /// Delete one key; returns whether the store accepted the command
    pub async fn delete(&self, key: &str, namespace: Option<&str>) -> bool {
        let full_key = self.full_key(key, namespace);
        match self.store.del(&[full_key.clone()]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "cache delete failed");
                false
            }
        }
    }

    /// Delete every key in `namespace` whose remainder matches the glob `pattern`
    ///
    /// The namespace itself is matched literally, so even `*` never reaches
    /// keys of another namespace.
    pub async fn delete_pattern(&self, pattern: &str, namespace: Option<&str>) -> u64 {
        let prefix = format!("{}:", self.namespace(namespace));
        let full_pattern = format!("{}{}", escape_glob(&prefix), pattern);

        let mut matched = match self.store.keys(&full_pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern = %full_pattern, error = %e, "cache key scan failed");
                return 0;
            }
        };
        matched.retain(|key| key.starts_with(&prefix));

        if matched.is_empty() {
            return 0;
        }

        match self.store.del(&matched).await {
            Ok(deleted) => {
                tracing::debug!(pattern = %full_pattern, deleted, "cache pattern invalidated");
                deleted
            }
            Err(e) => {
                tracing::warn!(pattern = %full_pattern, error = %e, "cache bulk delete failed");
                0
            }
        }
    }

    /// Check whether a live entry exists
    pub async fn exists(&self, key: &str, namespace: Option<&str>) -> bool {
        let full_key = self.full_key(key, namespace);
        self.store.exists(&full_key).await.unwrap_or_else(|e| {
            tracing::warn!(key = %full_key, error = %e, "cache exists failed");
            false
        })
    }

    /// Return the cached value, or run `compute` and cache what it yields.
    ///
    /// `Ok(None)` from `compute` is returned but never cached. Errors from
    /// `compute` are returned unchanged and nothing is written.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        namespace: Option<&str>,
        ttl: Option<u64>,
        compute: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let full_key = self.full_key(key, namespace);

        if let Some(hit) = self.read::<T>(&full_key).await {
            tracing::debug!(key = %full_key, "cache hit");
            return Ok(Some(hit));
        }

        if !self.config.coalesce_misses {
            tracing::debug!(key = %full_key, "cache miss");
            return self.compute_and_store(&full_key, ttl, compute).await;
        }

        let _in_flight = self.enter_in_flight(&full_key).await;

        // Whoever held the key before us may have filled it
        if let Some(hit) = self.read::<T>(&full_key).await {
            tracing::debug!(key = %full_key, "cache hit after in-flight wait");
            return Ok(Some(hit));
        }

        tracing::debug!(key = %full_key, "cache miss");
        self.compute_and_store(&full_key, ttl, compute).await
    }

    async fn compute_and_store<T, E, F, Fut>(
        &self,
        full_key: &str,
        ttl: Option<u64>,
        compute: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let value = compute().await?;

        match &value {
            Some(value) => {
                self.write(full_key, value, ttl).await;
            }
            None => tracing::debug!(key = full_key, "compute returned nothing, not caching"),
        }
        Ok(value)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter_in_flight(&self, full_key: &str) -> InFlight<'_> {
        let gate = {
            let mut map = self.lock_in_flight();
            release_idle_gates(&mut map);
            map.entry(full_key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        InFlight {
            map: &self.in_flight,
            guard: Some(gate.lock_owned().await),
        }
    }

    /// Number of keys with a compute currently in flight
    pub fn in_flight_count(&self) -> usize {
        let mut map = self.lock_in_flight();
        release_idle_gates(&mut map);
        map.len()
    }

    /// Ping the backing store
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.store.ping().await
    }

    /// Get the backing store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Get current configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Drop gates nobody holds or waits on.
///
/// Holders and waiters each own a clone, so a count of one is the map's
/// own reference. A waiter cancelled after the leader left strands such an
/// entry; it is swept here on the next map access.
fn release_idle_gates(map: &mut HashMap<String, Arc<AsyncMutex<()>>>) {
    map.retain(|_, gate| Arc::strong_count(gate) > 1);
}

/// Holds the per-key gate; releasing it sweeps idle entries
struct InFlight<'a> {
    map: &'a InFlightMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut map = self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        release_idle_gates(&mut map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Quote {
        symbol: String,
        price: f64,
    }

    fn quote() -> Quote {
        Quote {
            symbol: "AAPL".to_string(),
            price: 189.5,
        }
    }

    fn manager() -> CacheManager {
        CacheManager::in_memory(CacheConfig::default())
    }

    /// Store that is never reachable
    #[derive(Debug)]
    struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn del(&self, _keys: &[String]) -> Result<u64, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Timeout)
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }
    }

    #[tokio::test]
    async fn set_then_get_uses_namespace() {
        let cache = manager();
        assert!(cache.set("price", &quote(), Some(300), Some("stock")).await);

        assert_eq!(cache.get::<Quote>("price", Some("stock")).await, Some(quote()));
        assert_eq!(cache.get::<Quote>("price", None).await, None);
        assert!(cache.store().exists("stock:price").await.unwrap());
    }

    #[tokio::test]
    async fn default_namespace_is_dashboard() {
        let cache = manager();
        cache.set("layout", &vec![1, 2, 3], None, None).await;
        assert!(cache.store().exists("dashboard:layout").await.unwrap());
        assert_eq!(cache.full_key("x", None), "dashboard:x");
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = manager();
        cache.set("k", "v", Some(1), None).await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.get::<String>("k", None).await, None);
        assert!(!cache.exists("k", None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_and_zero_ttl_use_default() {
        let config = CacheConfig::new("redis://unused".to_string(), 5, "dashboard".to_string());
        let cache = CacheManager::in_memory(config);
        cache.set("implicit", &1, None, None).await;
        cache.set("zero", &2, Some(0), None).await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(cache.get::<i32>("implicit", None).await, Some(1));
        assert_eq!(cache.get::<i32>("zero", None).await, Some(2));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<i32>("implicit", None).await, None);
        assert_eq!(cache.get::<i32>("zero", None).await, None);
    }

    #[tokio::test]
    async fn get_or_compute_runs_compute_once() {
        let cache = manager();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute("price", Some("stock"), Some(300), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(Some(quote()))
                })
                .await
                .unwrap();
            assert_eq!(value, Some(quote()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nothing_is_not_cached() {
        let cache = manager();
        let value: Option<Quote> = cache
            .get_or_compute("missing", None, None, || async { Ok::<_, CacheError>(None) })
            .await
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(cache.get::<Quote>("missing", None).await, None);
        assert!(!cache.exists("missing", None).await);
    }

    #[tokio::test]
    async fn compute_error_propagates_and_is_not_cached() {
        let cache = manager();
        let result: Result<Option<Quote>, String> = cache
            .get_or_compute("price", Some("stock"), None, || async {
                Err::<Option<Quote>, _>("upstream down".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "upstream down");
        assert!(!cache.exists("price", Some("stock")).await);
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let cache = manager();
        cache
            .store()
            .set_ex("stock:price", "{not json", 60)
            .await
            .unwrap();

        assert_eq!(cache.get::<Quote>("price", Some("stock")).await, None);

        let value = cache
            .get_or_compute("price", Some("stock"), None, || async {
                Ok::<_, CacheError>(Some(quote()))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(quote()));
        assert_eq!(cache.get::<Quote>("price", Some("stock")).await, Some(quote()));
    }

    #[tokio::test]
    async fn pattern_delete_stays_in_namespace() {
        let cache = manager();
        cache.set("a", &1, None, Some("ns1")).await;
        cache.set("b", &2, None, Some("ns1")).await;
        cache.set("a", &3, None, Some("ns2")).await;

        assert_eq!(cache.delete_pattern("*", Some("ns1")).await, 2);

        assert!(!cache.exists("a", Some("ns1")).await);
        assert!(!cache.exists("b", Some("ns1")).await);
        assert_eq!(cache.get::<i32>("a", Some("ns2")).await, Some(3));
    }

    #[tokio::test]
    async fn namespace_metacharacters_do_not_widen_pattern() {
        let cache = manager();
        cache.set("x", &1, None, Some("a*")).await;
        cache.set("x", &2, None, Some("ab")).await;

        assert_eq!(cache.delete_pattern("*", Some("a*")).await, 1);
        assert_eq!(cache.get::<i32>("x", Some("ab")).await, Some(2));
    }

    #[tokio::test]
    async fn pattern_delete_matches_within_namespace() {
        let cache = manager();
        cache.set("commits:1", &1, None, Some("github")).await;
        cache.set("commits:2", &1, None, Some("github")).await;
        cache.set("issues:1", &1, None, Some("github")).await;

        assert_eq!(cache.delete_pattern("commits:*", Some("github")).await, 2);
        assert!(cache.exists("issues:1", Some("github")).await);
        assert_eq!(cache.delete_pattern("nothing*", Some("github")).await, 0);
    }

    #[tokio::test]
    async fn delete_removes_single_key() {
        let cache = manager();
        cache.set("k", &1, None, None).await;
        assert!(cache.delete("k", None).await);
        assert!(!cache.exists("k", None).await);
        // Deleting an absent key is still a successful command
        assert!(cache.delete("k", None).await);
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_miss() {
        let cache = CacheManager::with_store(Arc::new(UnreachableStore), CacheConfig::default());

        assert_eq!(cache.get::<Quote>("price", None).await, None);
        assert!(!cache.set("price", &quote(), None, None).await);
        assert!(!cache.delete("price", None).await);
        assert_eq!(cache.delete_pattern("*", None).await, 0);
        assert!(!cache.exists("price", None).await);
        assert!(cache.ping().await.is_err());

        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let value = cache
                .get_or_compute("price", None, None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(Some(quote()))
                })
                .await
                .unwrap();
            assert_eq!(value, Some(quote()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_both_compute_by_default() {
        let cache = manager();
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, CacheError>(Some(quote()))
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute("price", Some("stock"), None, fetch),
            cache.get_or_compute("price", Some("stock"), None, fetch),
        );

        assert_eq!(a.unwrap(), Some(quote()));
        assert_eq!(b.unwrap(), Some(quote()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn coalesced_misses_compute_once() {
        let config = CacheConfig::default().with_coalesced_misses(true);
        let cache = CacheManager::in_memory(config);
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, CacheError>(Some(quote()))
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_compute("price", Some("stock"), None, fetch),
            cache.get_or_compute("price", Some("stock"), None, fetch),
            cache.get_or_compute("price", Some("stock"), None, fetch),
        );

        assert_eq!(a.unwrap(), Some(quote()));
        assert_eq!(b.unwrap(), Some(quote()));
        assert_eq!(c.unwrap(), Some(quote()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_strand_its_gate() {
        let config = CacheConfig::default().with_coalesced_misses(true);
        let cache = CacheManager::in_memory(config);

        let leader = cache.enter_in_flight("stock:price").await;
        let mut waiter = Box::pin(cache.enter_in_flight("stock:price"));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("waiter should queue behind the leader"),
            _ = std::future::ready(()) => {}
        }

        // Leader leaves while the waiter still holds a clone of the gate
        drop(leader);
        assert_eq!(cache.lock_in_flight().len(), 1);

        drop(waiter);
        assert_eq!(cache.in_flight_count(), 0);
        assert!(cache.lock_in_flight().is_empty());
    }

    #[test]
    fn cache_key_hashes_parts() {
        let cache = manager();
        assert_eq!(cache.cache_key(["commits", "repo"]), keys::hash_parts(["commits", "repo"]));
    }
}

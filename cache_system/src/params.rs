//! Cache parameter configuration
//!
//! This module defines the CacheParams struct: one provider's view of
//! the shared cache manager, pinned to a namespace and a TTL.

use crate::CacheManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

/// Cache parameters for configuring cache behavior per provider
#[derive(Debug, Clone)]
pub struct CacheParams {
    /// The cache manager instance
    pub manager: Arc<CacheManager>,
    /// TTL for this provider in seconds
    pub ttl: u64,
    /// Prefix for cache keys
    pub prefix: String,
}

impl CacheParams {
    pub fn new(manager: Arc<CacheManager>, ttl: u64, prefix: &str) -> Self {
        Self {
            ttl,
            prefix: prefix.to_string(),
            manager,
        }
    }

    /// Same namespace, different TTL
    pub fn with_ttl(&self, ttl: u64) -> Self {
        Self {
            ttl,
            ..self.clone()
        }
    }

    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.manager.get(key, Some(&self.prefix)).await
    }

    pub async fn set<T>(&self, key: &str, value: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.manager
            .set(key, value, Some(self.ttl), Some(&self.prefix))
            .await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.manager.delete(key, Some(&self.prefix)).await
    }

    /// Invalidate every key of this namespace matching `pattern`
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        self.manager.delete_pattern(pattern, Some(&self.prefix)).await
    }

    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, compute: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.manager
            .get_or_compute(key, Some(&self.prefix), Some(self.ttl), compute)
            .await
    }
}

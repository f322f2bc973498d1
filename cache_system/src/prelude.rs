//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::errors::CacheError;
pub use crate::keys::CacheKey;
pub use crate::manager::CacheManager;
pub use crate::memory_store::MemoryStore;
pub use crate::params::CacheParams;
pub use crate::redis_store::RedisStore;
pub use crate::store::KeyValueStore;
pub use crate::ttl;

// Re-export centralized config
pub use config::CacheConfig;

// Common external dependencies
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json;

//! Cache system for dashboard data
//!
//! This crate provides namespaced cache-aside access to a shared
//! key-value store (redis in production), deterministic cache key
//! derivation, and the TTL policy for dashboard quantities.

pub mod errors;
pub mod keys;
pub mod manager;
pub mod memory_store;
pub mod params;
pub mod prelude;
pub mod redis_store;
pub mod store;
pub mod ttl;

// Re-export centralized config
pub use config::CacheConfig;

pub use errors::CacheError;
pub use keys::CacheKey;
pub use manager::CacheManager;
pub use memory_store::MemoryStore;
pub use params::CacheParams;
pub use redis_store::RedisStore;
pub use store::KeyValueStore;

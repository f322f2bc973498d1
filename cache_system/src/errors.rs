//! Error types for cache operations
//!
//! This module defines all error types that can occur
//! during cache operations and key-value store interactions.
//! The cache manager never hands these to its callers; they
//! are logged and degraded to misses at the manager boundary.

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Invalid TTL value: {0}")]
    InvalidTtl(u64),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    #[error("General cache error: {0}")]
    General(String),
}

impl CacheError {
    /// Whether the underlying connection should be discarded and reopened
    pub fn is_connection_failure(&self) -> bool {
        match self {
            CacheError::ConnectionError(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            CacheError::Connection(_) | CacheError::Timeout => true,
            _ => false,
        }
    }
}

//! Error types for the Feedhaus crate
//!
//! This module contains the errors that can be returned while
//! assembling or health-checking the Feedhaus coordinator. Runtime
//! cache failures never surface here; they degrade to misses.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedhausError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache_system::CacheError),

    #[error("Secret codec error: {0}")]
    Secret(#[from] secret_codec::SecretError),

    #[error("Rate governor already registered: {0}")]
    GovernorAlreadyRegistered(String),
}

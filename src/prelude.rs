//! Convenience re-exports for common Feedhaus usage
//!
//! # Example
//!
//! ```rust
//! use feedhaus::prelude::*;
//!
//! let key = CacheKey::new("get_price").arg(&"AAPL")?.build();
//! assert!(key.starts_with("get_price:"));
//! # Ok::<(), CacheError>(())
//! ```

// Core Feedhaus components
pub use crate::core::Feedhaus;
pub use crate::errors::FeedhausError;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, RateConfig, SecretConfig};

// Re-export cache system
pub use cache_system::prelude::*;

// Re-export rate governor
pub use rate_governor::prelude::*;

// Re-export secret codec
pub use secret_codec::{SecretCodec, SecretError};

// Common external dependencies
pub use tokio;

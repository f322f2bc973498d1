//! # Feedhaus
//!
//! Shared infrastructure for a personal dashboard that aggregates third-party
//! feeds: a cache-aside layer over redis, per-credential rate governors for
//! budget-limited upstream APIs, and a codec for encrypting stored tokens.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedhaus::prelude::*;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Quote {
//!     symbol: String,
//!     price: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let feedhaus = Feedhaus::new(AppConfig::load()?)?;
//!
//!     let quote: Option<Quote> = feedhaus
//!         .cached_upstream("AAPL", Some("stock_price"), Some(ttl::QUOTE_PRICE), "stocks", || async {
//!             let quote = Quote { symbol: "AAPL".to_string(), price: 189.5 };
//!             Ok(Observed::new(Some(quote)).with_headers([("x-ratelimit-remaining", "4999")]))
//!         })
//!         .await?;
//!     println!("{quote:?}");
//!
//!     let token = feedhaus.secrets().encrypt("ghp_example")?;
//!     assert_eq!(feedhaus.secrets().decrypt(&token), "ghp_example");
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::Feedhaus;
pub use errors::FeedhausError;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, RateConfig, SecretConfig};

// Re-export member crates
pub use cache_system;
pub use rate_governor;
pub use secret_codec;

// Re-export external dependencies used in public API
pub use anyhow;
pub use chrono;
pub use tokio;

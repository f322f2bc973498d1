//! TTL policy for dashboard data
//!
//! Each constant reflects how stale a quantity may get before the
//! dashboard shows misleading numbers. Values are in seconds.

/// Latest quote price
pub const QUOTE_PRICE: u64 = 300;

/// Historical price series
pub const PRICE_HISTORY: u64 = 600;

/// Repository listings
pub const REPOSITORIES: u64 = 300;

/// Commit listings
pub const COMMITS: u64 = 180;

/// Issue listings
pub const ISSUES: u64 = 120;

/// Pull request listings
pub const PULL_REQUESTS: u64 = 120;

//! Convenience re-exports for common rate-governor usage

pub use crate::budget::{BudgetObservation, Observed, RateBudget};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::errors::UpstreamError;
pub use crate::governor::{RateGovernor, RateStatus};

// Re-export centralized config
pub use config::RateConfig;

// Common external dependencies
pub use anyhow;
pub use chrono::{DateTime, Utc};

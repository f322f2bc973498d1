//! Rate governor for budget-limited upstream APIs
//!
//! This crate tracks the request budget an upstream reports for one
//! credential, decides whether a call may proceed, and waits out the
//! reset window after the budget runs dry.

pub mod budget;
pub mod clock;
pub mod errors;
pub mod governor;
pub mod prelude;

// Re-export centralized config
pub use config::RateConfig;

pub use budget::{BudgetObservation, Observed, RateBudget};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::UpstreamError;
pub use governor::{RateGovernor, RateStatus};

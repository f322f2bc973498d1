//! Error types for upstream calls
//!
//! Upstream adapters report failures through `UpstreamError`. The
//! governor only acts on `BudgetExceeded`; everything else passes
//! through untouched.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Failure of one upstream call
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream budget exceeded (reset at {reset_at:?}, retry after {retry_after:?})")]
    BudgetExceeded {
        /// Upstream reset instant, when reported
        reset_at: Option<DateTime<Utc>>,
        /// Relative wait, when reported instead of an instant
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl UpstreamError {
    /// Budget exhausted until `reset_at`
    pub fn budget_exceeded(reset_at: Option<DateTime<Utc>>) -> Self {
        UpstreamError::BudgetExceeded {
            reset_at,
            retry_after: None,
        }
    }

    /// Budget exhausted for `retry_after` from now
    pub fn retry_after(retry_after: Duration) -> Self {
        UpstreamError::BudgetExceeded {
            reset_at: None,
            retry_after: Some(retry_after),
        }
    }

    /// Any non-budget failure
    pub fn failed(message: impl std::fmt::Display) -> Self {
        UpstreamError::Failed(anyhow::anyhow!("{}", message))
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, UpstreamError::BudgetExceeded { .. })
    }
}

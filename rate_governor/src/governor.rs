//! Rate governor implementation
//!
//! One governor tracks the request budget of one upstream credential.
//! The budget sits behind a plain mutex that is only held for the
//! read or update of the counters, never across an upstream call or a
//! sleep.

use crate::budget::{BudgetObservation, Observed, RateBudget};
use crate::clock::{Clock, SystemClock};
use crate::errors::UpstreamError;
use chrono::{DateTime, Utc};
use config::RateConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Point-in-time view of a governor's budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    pub context: String,
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub exhausted: bool,
}

/// Budget tracker and throttle for one upstream credential context
pub struct RateGovernor {
    context: String,
    limit: u64,
    reset_buffer: Duration,
    budget: Mutex<RateBudget>,
    clock: Arc<dyn Clock>,
}

impl Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("context", &self.context)
            .field("limit", &self.limit)
            .field("reset_buffer", &self.reset_buffer)
            .field("budget", &*self.lock())
            .finish()
    }
}

impl RateGovernor {
    /// Create a governor reading the system clock
    pub fn new(context: impl Into<String>, config: &RateConfig) -> Self {
        Self::with_clock(context, config, Arc::new(SystemClock))
    }

    /// Create a governor reading `clock`
    pub fn with_clock(context: impl Into<String>, config: &RateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            context: context.into(),
            limit: config.limit,
            reset_buffer: config.reset_buffer(),
            budget: Mutex::new(RateBudget::new(config.limit)),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateBudget> {
        // The budget is plain counters; a panic mid-update cannot leave it torn
        self.budget.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credential context this governor belongs to
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Feed budget metadata from a successful response
    pub fn record_observation(&self, remaining: u64, reset_at: Option<DateTime<Utc>>) {
        self.observe(BudgetObservation::new(remaining, reset_at));
    }

    pub fn observe(&self, observation: BudgetObservation) {
        let now = self.clock.now();
        let mut budget = self.lock();
        budget.observe(observation, now);

        if budget.is_exhausted() {
            tracing::warn!(
                context = %self.context,
                reset_at = ?budget.reset_at,
                "upstream budget exhausted"
            );
        }
    }

    /// Record an explicit budget-exceeded signal from the upstream.
    ///
    /// The reset instant comes from the signal, else `now + retry_after`,
    /// else whatever reset was already known.
    pub fn record_exhausted(&self, reset_at: Option<DateTime<Utc>>, retry_after: Option<Duration>) {
        let now = self.clock.now();
        let reset_at = reset_at.or_else(|| {
            retry_after
                .and_then(|wait| chrono::Duration::from_std(wait).ok())
                .and_then(|wait| now.checked_add_signed(wait))
        });

        let mut budget = self.lock();
        budget.exhaust(reset_at, now);
        tracing::warn!(
            context = %self.context,
            reset_at = ?budget.reset_at,
            "upstream rejected call for budget"
        );
    }

    /// True exactly when the last known remaining count is zero
    pub fn is_exhausted(&self) -> bool {
        self.lock().is_exhausted()
    }

    /// Time until `reset_at` plus the safety buffer, floored at zero
    pub fn wait_duration(&self) -> Duration {
        let Some(reset_at) = self.lock().reset_at else {
            return Duration::ZERO;
        };

        (reset_at - self.clock.now())
            .to_std()
            .map(|until_reset| until_reset + self.reset_buffer)
            .unwrap_or_else(|_| {
                // Reset already passed; only the part of the buffer still ahead remains
                let overdue = (self.clock.now() - reset_at).to_std().unwrap_or(Duration::ZERO);
                self.reset_buffer.saturating_sub(overdue)
            })
    }

    /// Suspend until the budget may have refreshed; returns at once when not exhausted
    pub async fn await_capacity(&self) {
        if !self.is_exhausted() {
            return;
        }

        let wait = self.wait_duration();
        if wait.is_zero() {
            tracing::debug!(context = %self.context, "reset window passed, proceeding");
            return;
        }

        tracing::info!(
            context = %self.context,
            wait_seconds = wait.as_secs(),
            "upstream budget exhausted, waiting for reset"
        );
        tokio::time::sleep(wait).await;
    }

    /// Run one upstream call under this governor.
    ///
    /// Waits for capacity, feeds any reported budget back in, and on a
    /// budget rejection waits for the reset and retries exactly once. A
    /// rejection with no known reset, or a second rejection, is returned.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observed<T>, UpstreamError>>,
    {
        self.await_capacity().await;

        match self.attempt(&mut op).await {
            Err(UpstreamError::BudgetExceeded {
                reset_at,
                retry_after,
            }) => {
                self.record_exhausted(reset_at, retry_after);
                if self.lock().reset_at.is_none() {
                    return Err(UpstreamError::BudgetExceeded {
                        reset_at,
                        retry_after,
                    });
                }

                self.await_capacity().await;
                let retried = self.attempt(&mut op).await;
                if let Err(UpstreamError::BudgetExceeded {
                    reset_at,
                    retry_after,
                }) = &retried
                {
                    self.record_exhausted(*reset_at, *retry_after);
                }
                retried
            }
            other => other,
        }
    }

    async fn attempt<T, F, Fut>(&self, op: &mut F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observed<T>, UpstreamError>>,
    {
        let observed = op().await?;
        if let Some(observation) = observed.observation {
            self.observe(observation);
        }
        Ok(observed.payload)
    }

    /// Snapshot of the current budget
    pub fn budget(&self) -> RateBudget {
        self.lock().clone()
    }

    pub fn status(&self) -> RateStatus {
        let budget = self.lock();
        RateStatus {
            context: self.context.clone(),
            limit: self.limit,
            remaining: budget.remaining,
            used: self.limit.saturating_sub(budget.remaining),
            reset_at: budget.reset_at,
            last_observed_at: budget.last_observed_at,
            exhausted: budget.is_exhausted(),
        }
    }
}

//! Rate budget state and upstream observations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response header carrying the remaining request count
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Response header carrying the reset instant as epoch seconds
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Budget metadata reported alongside a successful upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetObservation {
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl BudgetObservation {
    pub fn new(remaining: u64, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            remaining,
            reset_at,
        }
    }

    /// Parse the conventional `x-ratelimit-*` headers.
    ///
    /// Header names match case-insensitively. Returns `None` when the
    /// remaining count is absent or unparsable; an unparsable reset is
    /// dropped on its own.
    pub fn from_headers<I, K, V>(headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut remaining = None;
        let mut reset_at = None;

        for (name, value) in headers {
            let name = name.as_ref();
            let value = value.as_ref().trim();
            if name.eq_ignore_ascii_case(REMAINING_HEADER) {
                remaining = value.parse::<i64>().ok().map(|n| n.max(0) as u64);
            } else if name.eq_ignore_ascii_case(RESET_HEADER) {
                reset_at = value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0));
            }
        }

        remaining.map(|remaining| Self::new(remaining, reset_at))
    }
}

/// An upstream payload plus whatever budget metadata came with it
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub payload: T,
    pub observation: Option<BudgetObservation>,
}

impl<T> Observed<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            observation: None,
        }
    }

    pub fn with_observation(mut self, observation: BudgetObservation) -> Self {
        self.observation = Some(observation);
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.observation = BudgetObservation::from_headers(headers);
        self
    }
}

/// Remaining request budget for one upstream credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
}

impl RateBudget {
    /// Budget before any observation
    pub fn new(limit: u64) -> Self {
        Self {
            remaining: limit,
            reset_at: None,
            last_observed_at: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Fold in an observation taken at `now`.
    ///
    /// Within one known reset window the count only goes down. A new
    /// reset instant, an elapsed window, no known window at all, or the
    /// very first observation accept the reported count as-is.
    pub(crate) fn observe(&mut self, observation: BudgetObservation, now: DateTime<Utc>) {
        let first = self.last_observed_at.is_none();
        let no_window = self.reset_at.is_none();
        let window_elapsed = self.reset_at.is_some_and(|reset_at| now >= reset_at);
        let new_window = observation
            .reset_at
            .is_some_and(|reset_at| Some(reset_at) != self.reset_at);

        if first || no_window || window_elapsed || new_window {
            self.remaining = observation.remaining;
        } else {
            self.remaining = self.remaining.min(observation.remaining);
        }

        if observation.reset_at.is_some() {
            self.reset_at = observation.reset_at;
        }
        self.last_observed_at = Some(now);
    }

    /// Record an authoritative exhaustion signal
    pub(crate) fn exhaust(&mut self, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.remaining = 0;
        if reset_at.is_some() {
            self.reset_at = reset_at;
        }
        self.last_observed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn parses_headers_case_insensitively() {
        let headers = vec![
            ("X-RateLimit-Remaining", "4321"),
            ("X-RateLimit-Reset", "1700000000"),
            ("content-type", "application/json"),
        ];
        let observation = BudgetObservation::from_headers(headers).unwrap();
        assert_eq!(observation.remaining, 4321);
        assert_eq!(observation.reset_at, Some(at(1_700_000_000)));
    }

    #[test]
    fn unparsable_headers_are_ignored() {
        assert_eq!(BudgetObservation::from_headers([("x-ratelimit-remaining", "lots")]), None);
        assert_eq!(BudgetObservation::from_headers(Vec::<(&str, &str)>::new()), None);

        let observation = BudgetObservation::from_headers([
            ("x-ratelimit-remaining", "-3"),
            ("x-ratelimit-reset", "soon"),
        ])
        .unwrap();
        assert_eq!(observation, BudgetObservation::new(0, None));
    }

    #[test]
    fn remaining_only_decreases_within_window() {
        let mut budget = RateBudget::new(5000);
        budget.observe(BudgetObservation::new(100, Some(at(1000))), at(0));
        budget.observe(BudgetObservation::new(150, Some(at(1000))), at(10));
        assert_eq!(budget.remaining, 100);

        budget.observe(BudgetObservation::new(90, None), at(20));
        assert_eq!(budget.remaining, 90);
        assert_eq!(budget.reset_at, Some(at(1000)));
    }

    #[test]
    fn new_window_or_elapsed_reset_accepts_reported_count() {
        let mut budget = RateBudget::new(5000);
        budget.observe(BudgetObservation::new(10, Some(at(1000))), at(0));

        budget.observe(BudgetObservation::new(4999, Some(at(4600))), at(1001));
        assert_eq!(budget.remaining, 4999);
        assert_eq!(budget.reset_at, Some(at(4600)));

        budget.observe(BudgetObservation::new(5000, None), at(4601));
        assert_eq!(budget.remaining, 5000);
    }

    #[test]
    fn recovers_from_exhaustion_without_reset_instant() {
        let mut budget = RateBudget::new(5000);
        budget.exhaust(None, at(0));
        budget.observe(BudgetObservation::new(4999, None), at(7200));
        assert_eq!(budget.remaining, 4999);
        assert!(!budget.is_exhausted());

        let mut budget = RateBudget::new(5000);
        budget.observe(BudgetObservation::new(0, None), at(0));
        budget.observe(BudgetObservation::new(60, None), at(7200));
        assert_eq!(budget.remaining, 60);
    }

    #[test]
    fn first_observation_may_exceed_configured_limit() {
        let mut budget = RateBudget::new(60);
        budget.observe(BudgetObservation::new(14_000, None), at(0));
        assert_eq!(budget.remaining, 14_000);
    }

    #[test]
    fn exhaust_keeps_known_reset_when_signal_has_none() {
        let mut budget = RateBudget::new(5000);
        budget.observe(BudgetObservation::new(3, Some(at(900))), at(0));
        budget.exhaust(None, at(5));
        assert!(budget.is_exhausted());
        assert_eq!(budget.reset_at, Some(at(900)));

        budget.exhaust(Some(at(1200)), at(6));
        assert_eq!(budget.reset_at, Some(at(1200)));
    }

    #[test]
    fn observed_carries_header_metadata() {
        let observed = Observed::new("payload").with_headers([("x-ratelimit-remaining", "7")]);
        assert_eq!(observed.observation, Some(BudgetObservation::new(7, None)));
        assert_eq!(Observed::new(1).observation, None);
    }
}

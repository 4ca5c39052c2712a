//! Retry policy for remote model calls
//!
//! The policy knows nothing about HTTP: callers classify each attempt as
//! success, transient or fatal, and `RetryState` answers whether to stop,
//! give up, or sleep and try again. Backoff is exponential from the base
//! delay and capped at `max_delay`.

use std::time::Duration;

use crate::config::RetryConfig;

/// Status codes worth retrying (rate limiting, temporary server faults)
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Retryable: transient status or connection-level failure
    Transient,
    /// Not retryable
    Fatal,
}

impl AttemptOutcome {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            Self::Success
        } else if TRANSIENT_STATUSES.contains(&status) {
            Self::Transient
        } else {
            Self::Fatal
        }
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempt succeeded
    Done,
    /// Sleep for the delay, then make another attempt
    RetryAfter(Duration),
    /// Fatal outcome, or no attempts left
    GiveUp,
}

/// Bounded exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-indexed): `base * 2^(retry-1)`,
    /// capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Fresh state for one logical call
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Attempt counter for one logical call
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the outcome of the attempt that just finished
    pub fn record(&mut self, outcome: AttemptOutcome) -> RetryDecision {
        self.attempts += 1;
        match outcome {
            AttemptOutcome::Success => RetryDecision::Done,
            AttemptOutcome::Fatal => RetryDecision::GiveUp,
            AttemptOutcome::Transient if self.attempts >= self.policy.max_attempts => {
                RetryDecision::GiveUp
            }
            AttemptOutcome::Transient => {
                RetryDecision::RetryAfter(self.policy.delay_for(self.attempts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(AttemptOutcome::from_status(200), AttemptOutcome::Success);
        assert_eq!(AttemptOutcome::from_status(204), AttemptOutcome::Success);
        for status in [429, 500, 502, 503, 504] {
            assert_eq!(AttemptOutcome::from_status(status), AttemptOutcome::Transient);
        }
        for status in [400, 401, 403, 404, 413, 422, 501] {
            assert_eq!(AttemptOutcome::from_status(status), AttemptOutcome::Fatal);
        }
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = policy(5);
        assert_eq!(p.delay_for(6), Duration::from_secs(30));
        assert_eq!(p.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_transient_until_exhausted() {
        let mut state = policy(3).start();
        assert_eq!(
            state.record(AttemptOutcome::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            state.record(AttemptOutcome::Transient),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(state.record(AttemptOutcome::Transient), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_fatal_stops_immediately() {
        let mut state = policy(5).start();
        assert_eq!(state.record(AttemptOutcome::Fatal), RetryDecision::GiveUp);
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn test_success_after_retries() {
        let mut state = policy(5).start();
        state.record(AttemptOutcome::Transient);
        state.record(AttemptOutcome::Transient);
        assert_eq!(state.record(AttemptOutcome::Success), RetryDecision::Done);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let mut state = policy(1).start();
        assert_eq!(state.record(AttemptOutcome::Transient), RetryDecision::GiveUp);
    }
}

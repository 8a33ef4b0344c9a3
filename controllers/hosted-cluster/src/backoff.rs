//! # Exponential Backoff
//!
//! Per-resource failure backoff for the reconcile loop. Each consecutive
//! failure doubles the delay, starting at the minimum and capped at the
//! maximum: 1s, 2s, 4s, 8s, 10s, 10s, ...
//!
//! A success discards the sequence; the next failure starts over.

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl ExponentialBackoff {
    /// Create a new backoff with the given minimum and maximum in seconds
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        self.current_seconds = self.current_seconds.saturating_mul(2).min(self.max_seconds);
        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(1, 10);

        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);
        assert_eq!(backoff.next_backoff_seconds(), 4);
        assert_eq!(backoff.next_backoff_seconds(), 8);
        assert_eq!(backoff.next_backoff_seconds(), 10); // max
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn test_exponential_backoff_does_not_overflow() {
        let mut backoff = ExponentialBackoff::new(u64::MAX / 2 + 1, u64::MAX);

        backoff.next_backoff_seconds();
        assert_eq!(backoff.next_backoff_seconds(), u64::MAX);
        assert_eq!(backoff.next_backoff_seconds(), u64::MAX);
    }
}

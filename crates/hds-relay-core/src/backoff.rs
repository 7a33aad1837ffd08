//! Reconnect backoff for the pull transport
//!
//! Deterministic doubling without jitter. A clean session resets the wait;
//! a failed one returns the current wait and doubles it up to `max`.

use std::time::Duration;

/// Default first wait before reconnecting
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default ceiling for the reconnect wait
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    /// `initial` is clamped to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Wait to apply after a session that ended without error
    pub fn after_clean_session(&mut self) -> Duration {
        self.next = self.initial;
        self.next
    }

    /// Wait to apply after a failed or aborted session
    pub fn after_failed_session(&mut self) -> Duration {
        let wait = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        wait
    }

    /// Wait that the next failure will return
    pub fn current(&self) -> Duration {
        self.next
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_consecutive_failures_double() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.after_failed_session(), SEC);
        assert_eq!(backoff.after_failed_session(), 2 * SEC);
        assert_eq!(backoff.after_failed_session(), 4 * SEC);
        assert_eq!(backoff.current(), 8 * SEC);
    }

    #[test]
    fn test_clean_session_resets() {
        let mut backoff = Backoff::default();
        backoff.after_failed_session();
        backoff.after_failed_session();
        backoff.after_failed_session();

        assert_eq!(backoff.after_clean_session(), SEC);
        assert_eq!(backoff.after_failed_session(), SEC);
        assert_eq!(backoff.after_failed_session(), 2 * SEC);
    }

    #[test]
    fn test_never_exceeds_max() {
        let max = Duration::from_secs(10 * 60);
        let mut backoff = Backoff::new(SEC, max);
        for _ in 0..64 {
            assert!(backoff.after_failed_session() <= max);
        }
        assert_eq!(backoff.current(), max);
        assert_eq!(backoff.after_failed_session(), max);
    }

    #[test]
    fn test_initial_clamped_to_max() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(backoff.initial(), Duration::from_secs(5));
        assert_eq!(backoff.after_failed_session(), Duration::from_secs(5));
        assert_eq!(backoff.max(), Duration::from_secs(5));
    }
}

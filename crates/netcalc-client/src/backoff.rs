//! Exponential reconnect backoff.
//!
//! The delay starts at `initial` and doubles after every failed attempt. Once
//! the next delay would exceed the ceiling the client gives up, so the number
//! of attempts follows from the ceiling rather than being fixed.

use std::time::Duration;

/// First delay after a failed connect.
pub const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling: the last delay waited is 32 s.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Doubling delay sequence with a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    ceiling: Duration,
    next: Duration,
    attempts: u32,
    last: Duration,
}

impl Backoff {
    /// Create a backoff starting at `initial` and giving up past `ceiling`.
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self { initial, ceiling, next: initial, attempts: 0, last: Duration::ZERO }
    }

    /// Delay before the next attempt, or `None` once it would exceed the ceiling.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.next > self.ceiling {
            return None;
        }
        let delay = self.next;
        self.next = delay.checked_mul(2).unwrap_or(Duration::MAX);
        self.attempts += 1;
        self.last = delay;
        Some(delay)
    }

    /// Start over after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
        self.last = Duration::ZERO;
    }

    /// Delays handed out since the last reset.
    pub fn retries(&self) -> u32 {
        self.attempts
    }

    /// Longest delay handed out since the last reset.
    pub fn last_delay(&self) -> Duration {
        self.last
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

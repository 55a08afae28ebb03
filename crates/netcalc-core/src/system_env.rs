//! Production Environment implementation using system clocks.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait that uses the real monotonic clock, the local wall
//! clock and Tokio timers.

use std::time::{Duration, Instant};

use crate::{env::Environment, timestamp::Timestamp};

/// Production environment using system time.
///
/// This implementation:
/// - Uses `std::time::Instant::now()` for monotonic time
/// - Uses `chrono::Local` (through `Timestamp::now`) for wall-clock time
/// - Uses `tokio::time::sleep()` for async sleeping
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> Timestamp {
        Timestamp::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

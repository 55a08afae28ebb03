//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the request worker and the client driver
//! from system clocks and timers. This enables:
//!
//! - Fast tests: the client's reconnect backoff can sleep for zero time while
//!   still observing the exact delay sequence it asked for.
//!
//! - Production Runtime: `SystemEnv` uses the real monotonic clock, the local
//!   wall clock and Tokio timers without any change to the callers.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

use crate::timestamp::Timestamp;

/// Abstract environment providing time and async sleeping.
///
/// Two clocks are exposed on purpose: latency is measured on the monotonic
/// clock, while values shown to people or written on the wire come from the
/// wall clock.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: This method MUST return values that never decrease
    ///   within a single execution context.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time with microsecond resolution.
    fn wall_clock(&self) -> Timestamp;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait. Callers are the client's
    /// reconnect loop and the server's accept retry.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

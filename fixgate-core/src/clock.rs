/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Time sources.
//!
//! Every deadline in the engine is an absolute value compared against a
//! clock reading, so tests can drive time explicitly with [`ManualClock`].

use crate::types::Timestamp;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    /// Wall-clock milliseconds since the Unix epoch.
    fn time_ms(&self) -> u64;

    /// Monotonic nanoseconds from an arbitrary origin.
    fn nano_time(&self) -> u64;

    /// Wall-clock time as a [`Timestamp`].
    fn timestamp(&self) -> Timestamp {
        Timestamp::from_millis(self.time_ms())
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn time_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn nano_time(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn timestamp(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start_ms` milliseconds since the epoch.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(delta, Ordering::AcqRel);
    }

    /// Sets the clock to an absolute reading.
    pub fn set_ms(&self, millis: u64) {
        self.millis.store(millis, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn time_ms(&self) -> u64 {
        self.millis.load(Ordering::Acquire)
    }

    fn nano_time(&self) -> u64 {
        self.time_ms().saturating_mul(1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();
        clock.advance(Duration::from_millis(50));
        assert_eq!(shared.time_ms(), 1_050);
        assert_eq!(shared.nano_time(), 1_050_000_000);
        assert_eq!(shared.timestamp().as_millis(), 1_050);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::default();
        clock.set_ms(42);
        assert_eq!(clock.time_ms(), 42);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.nano_time();
        let second = clock.nano_time();
        assert!(second >= first);
        assert!(clock.time_ms() > 0);
    }
}

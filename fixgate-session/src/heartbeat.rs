/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Heartbeat and inbound deadlines.
//!
//! Timers are absolute millisecond deadlines checked on every poll:
//! - The heartbeat deadline moves forward whenever we send anything
//! - The inbound deadline moves forward whenever the peer sends something
//!   in sequence

use crate::config::duration_ms;
use std::time::Duration;

/// Fraction of the heartbeat interval after which we send a heartbeat.
pub const HEARTBEAT_PAUSE_FACTOR: f64 = 0.8;

/// TestReqID used for liveness checks.
pub const TEST_REQ_ID: &str = "TEST";

/// Deadlines for one session.
#[derive(Debug, Clone)]
pub struct HeartbeatTimers {
    interval_ms: u64,
    sending_interval_ms: u64,
    reasonable_transmission_ms: u64,
    next_heartbeat_ms: u64,
    next_inbound_ms: u64,
}

impl HeartbeatTimers {
    /// Creates timers for `interval` and starts both deadlines at `now_ms`.
    #[must_use]
    pub fn new(interval: Duration, reasonable_transmission_time: Duration, now_ms: u64) -> Self {
        let mut timers = Self {
            interval_ms: 0,
            sending_interval_ms: 0,
            reasonable_transmission_ms: duration_ms(reasonable_transmission_time),
            next_heartbeat_ms: 0,
            next_inbound_ms: 0,
        };
        timers.set_interval_ms(duration_ms(interval), now_ms);
        timers
    }

    /// Applies a negotiated heartbeat interval and restarts both deadlines.
    pub fn set_interval_secs(&mut self, secs: u64, now_ms: u64) {
        self.set_interval_ms(secs.saturating_mul(1000), now_ms);
    }

    fn set_interval_ms(&mut self, interval_ms: u64, now_ms: u64) {
        self.interval_ms = interval_ms;
        self.sending_interval_ms = (interval_ms as f64 * HEARTBEAT_PAUSE_FACTOR) as u64;
        self.on_sent(now_ms);
        self.on_received(now_ms);
    }

    /// Something was sent at `now_ms`.
    #[inline]
    pub fn on_sent(&mut self, now_ms: u64) {
        self.next_heartbeat_ms = now_ms.saturating_add(self.sending_interval_ms);
    }

    /// An in-sequence message arrived at `now_ms`.
    #[inline]
    pub fn on_received(&mut self, now_ms: u64) {
        self.next_inbound_ms = now_ms
            .saturating_add(self.reasonable_transmission_ms)
            .saturating_add(self.interval_ms);
    }

    /// Overrides the inbound deadline.
    #[inline]
    pub fn set_next_inbound_ms(&mut self, deadline_ms: u64) {
        self.next_inbound_ms = deadline_ms;
    }

    /// Returns true if a heartbeat is due.
    #[inline]
    #[must_use]
    pub const fn heartbeat_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_heartbeat_ms
    }

    /// Returns true if the peer has been silent too long.
    #[inline]
    #[must_use]
    pub const fn inbound_due(&self, now_ms: u64) -> bool {
        now_ms >= self.next_inbound_ms
    }

    /// Negotiated heartbeat interval in milliseconds.
    #[must_use]
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Heartbeat interval in whole seconds.
    #[must_use]
    pub const fn interval_secs(&self) -> u64 {
        self.interval_ms / 1000
    }

    /// Next heartbeat deadline.
    #[must_use]
    pub const fn next_heartbeat_ms(&self) -> u64 {
        self.next_heartbeat_ms
    }

    /// Next inbound deadline.
    #[must_use]
    pub const fn next_inbound_ms(&self) -> u64 {
        self.next_inbound_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlines_follow_interval() {
        let timers = HeartbeatTimers::new(Duration::from_secs(10), Duration::from_secs(1), 1_000);
        assert_eq!(timers.interval_secs(), 10);
        assert_eq!(timers.next_heartbeat_ms(), 1_000 + 8_000);
        assert_eq!(timers.next_inbound_ms(), 1_000 + 11_000);
        assert!(!timers.heartbeat_due(8_999));
        assert!(timers.heartbeat_due(9_000));
        assert!(timers.inbound_due(12_000));
    }

    #[test]
    fn test_activity_pushes_deadlines() {
        let mut timers = HeartbeatTimers::new(Duration::from_secs(10), Duration::from_secs(1), 0);
        timers.on_sent(5_000);
        timers.on_received(6_000);
        assert_eq!(timers.next_heartbeat_ms(), 13_000);
        assert_eq!(timers.next_inbound_ms(), 17_000);
    }

    #[test]
    fn test_set_interval_restarts() {
        let mut timers = HeartbeatTimers::new(Duration::from_secs(30), Duration::from_secs(1), 0);
        timers.set_interval_secs(5, 100);
        assert_eq!(timers.interval_ms(), 5_000);
        assert_eq!(timers.next_heartbeat_ms(), 4_100);
        assert_eq!(timers.next_inbound_ms(), 6_100);
    }
}

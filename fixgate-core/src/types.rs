/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Core types for session operations.
//!
//! This module provides fundamental types used throughout the fixgate engine:
//! - [`ConnectionId`]: Ephemeral identifier of one transport connection
//! - [`SessionId`]: Durable identifier bound to a composite key
//! - [`Timestamp`]: UTC timestamp in FIX `SendingTime` format
//! - [`CompId`]: Component identifier (SenderCompID, TargetCompID)

use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length for CompID strings in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// Identifier of a single transport connection.
///
/// Unique among the currently live connections; a reconnect of the same
/// counterparty gets a fresh value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new connection identifier.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable session identifier.
///
/// Allocated once per composite key and reused across reconnections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Placeholder for a session whose identity has not been resolved yet.
    pub const UNKNOWN: Self = Self(0);

    /// Creates a new session identifier.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns true unless this is [`SessionId::UNKNOWN`].
    #[inline]
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.0 != Self::UNKNOWN.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC timestamp with nanosecond precision.
///
/// Rendered on the wire as `YYYYMMDD-HH:MM:SS.sss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
    nanos_since_epoch: u64,
}

impl Timestamp {
    /// Creates a timestamp from nanoseconds since Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            nanos_since_epoch: nanos,
        }
    }

    /// Creates a timestamp from milliseconds since Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos_since_epoch: millis * 1_000_000,
        }
    }

    /// Returns the current UTC timestamp.
    #[inline]
    #[must_use]
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Returns nanoseconds since Unix epoch.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos_since_epoch
    }

    /// Returns milliseconds since Unix epoch.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.nanos_since_epoch / 1_000_000
    }

    /// Converts to a chrono `DateTime<Utc>`.
    #[must_use]
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos_since_epoch as i64)
    }

    /// Formats the timestamp with millisecond precision.
    ///
    /// Format: `YYYYMMDD-HH:MM:SS.sss`
    #[must_use]
    pub fn format_millis(self) -> ArrayString<21> {
        let dt = self.to_datetime();
        let mut buf = ArrayString::new();
        let _ = std::fmt::write(
            &mut buf,
            format_args!("{}", dt.format("%Y%m%d-%H:%M:%S%.3f")),
        );
        buf
    }

    /// Parses a FIX `UTCTimestamp` value.
    ///
    /// Accepts second precision as well as any fractional precision.
    ///
    /// # Returns
    /// `None` when the value is not a valid timestamp.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let naive = NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%d-%H:%M:%S"))
            .ok()?;
        let nanos = naive.and_utc().timestamp_nanos_opt()?;
        u64::try_from(nanos).ok().map(Self::from_nanos)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self {
            nanos_since_epoch: dt.timestamp_nanos_opt().unwrap_or(0) as u64,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_millis())
    }
}

/// Component identifier for FIX sessions.
///
/// Used for SenderCompID (tag 49) and TargetCompID (tag 56). Must be
/// non-empty, at most 32 bytes and free of the SOH delimiter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Creates a new CompId from a string slice.
    ///
    /// # Returns
    /// `None` if the value is empty, too long, or contains SOH.
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        if s.is_empty() || s.contains('\x01') {
            return None;
        }
        ArrayString::from(s).ok().map(Self)
    }

    /// Returns the CompId as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for CompId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompId {
    type Err = crate::error::SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or(crate::error::SessionError::MissingCompId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unknown() {
        assert!(!SessionId::UNKNOWN.is_known());
        assert!(SessionId::new(1).is_known());
    }

    #[test]
    fn test_timestamp_conversions() {
        let ts = Timestamp::from_millis(1000);
        assert_eq!(ts.as_millis(), 1000);
        assert_eq!(ts.as_nanos(), 1_000_000_000);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = Timestamp::from_millis(0);
        assert_eq!(ts.format_millis().as_str(), "19700101-00:00:00.000");
    }

    #[test]
    fn test_timestamp_parse() {
        let ts = Timestamp::parse("19700101-00:00:01.250").unwrap();
        assert_eq!(ts.as_millis(), 1250);

        let ts = Timestamp::parse("19700101-00:01:00").unwrap();
        assert_eq!(ts.as_millis(), 60_000);

        assert!(Timestamp::parse("not-a-time").is_none());
    }

    #[test]
    fn test_comp_id() {
        let id = CompId::new("SENDER").unwrap();
        assert_eq!(id.as_str(), "SENDER");
        assert_eq!(id.to_string(), "SENDER");
    }

    #[test]
    fn test_comp_id_rejects_invalid_values() {
        assert!(CompId::new("").is_none());
        assert!(CompId::new("A\x01B").is_none());
        assert!(CompId::new(&"A".repeat(COMP_ID_MAX_LEN + 1)).is_none());
        assert!("".parse::<CompId>().is_err());
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session configuration.
//!
//! This module provides configuration options for FIX sessions.

use fixgate_core::{CompId, SessionError};
use std::time::Duration;

/// BeginString used when none is configured.
pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.4";

/// Configuration for a FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// BeginString expected on every inbound message (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Heartbeat interval used before a logon negotiates one.
    pub heartbeat_interval: Duration,
    /// Maximum distance between a logon's SendingTime and local time.
    pub sending_time_window: Duration,
    /// Grace added to the inbound deadline on top of the heartbeat interval.
    pub reasonable_transmission_time: Duration,
    /// Time allowed for the logon exchange to complete.
    pub logon_timeout: Duration,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Whether every inbound message must carry the session's comp ids.
    pub validate_comp_ids: bool,
    /// Whether an initiator asks the peer to reset sequence numbers.
    pub reset_seq_num_on_logon: bool,
    /// Initiator Sender CompID (tag 49).
    pub sender_comp_id: Option<CompId>,
    /// Initiator Sender SubID (tag 50).
    pub sender_sub_id: Option<String>,
    /// Initiator Target CompID (tag 56).
    pub target_comp_id: Option<CompId>,
    /// Initiator Target SubID (tag 57).
    pub target_sub_id: Option<String>,
    /// Username (tag 553) sent on an initiated logon.
    pub username: Option<String>,
    /// Password (tag 554) sent on an initiated logon.
    pub password: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            begin_string: DEFAULT_BEGIN_STRING.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            sending_time_window: Duration::from_secs(120),
            reasonable_transmission_time: Duration::from_secs(1),
            logon_timeout: Duration::from_secs(10),
            validate_checksum: true,
            validate_comp_ids: true,
            reset_seq_num_on_logon: false,
            sender_comp_id: None,
            sender_sub_id: None,
            target_comp_id: None,
            target_sub_id: None,
            username: None,
            password: None,
        }
    }
}

impl SessionConfig {
    /// Returns a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Heartbeat interval in whole seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Sending time window in milliseconds.
    #[must_use]
    pub fn sending_time_window_ms(&self) -> u64 {
        duration_ms(self.sending_time_window)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.config.begin_string = version.into();
        self
    }

    /// Sets the pre-logon heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Sets the accepted SendingTime window.
    #[must_use]
    pub fn sending_time_window(mut self, window: Duration) -> Self {
        self.config.sending_time_window = window;
        self
    }

    /// Sets the reasonable transmission time.
    #[must_use]
    pub fn reasonable_transmission_time(mut self, grace: Duration) -> Self {
        self.config.reasonable_transmission_time = grace;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn logon_timeout(mut self, timeout: Duration) -> Self {
        self.config.logon_timeout = timeout;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn validate_checksum(mut self, validate: bool) -> Self {
        self.config.validate_checksum = validate;
        self
    }

    /// Sets whether to validate comp ids on every message.
    #[must_use]
    pub const fn validate_comp_ids(mut self, validate: bool) -> Self {
        self.config.validate_comp_ids = validate;
        self
    }

    /// Sets whether an initiated logon carries ResetSeqNumFlag=Y.
    #[must_use]
    pub const fn reset_seq_num_on_logon(mut self, reset: bool) -> Self {
        self.config.reset_seq_num_on_logon = reset;
        self
    }

    /// Sets the initiator's own comp id and optional sub id.
    #[must_use]
    pub fn sender(mut self, comp_id: CompId, sub_id: Option<String>) -> Self {
        self.config.sender_comp_id = Some(comp_id);
        self.config.sender_sub_id = sub_id;
        self
    }

    /// Sets the counterparty comp id and optional sub id.
    #[must_use]
    pub fn target(mut self, comp_id: CompId, sub_id: Option<String>) -> Self {
        self.config.target_comp_id = Some(comp_id);
        self.config.target_sub_id = sub_id;
        self
    }

    /// Sets the credentials sent on an initiated logon.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the begin string is empty or
    /// not a FIX version, or if the heartbeat interval, sending time window
    /// or logon timeout is zero.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let config = self.config;
        if !config.begin_string.starts_with("FIX") || config.begin_string.contains('\x01') {
            return Err(SessionError::Configuration(format!(
                "invalid begin string '{}'",
                config.begin_string
            )));
        }
        if config.heartbeat_interval.as_secs() == 0 {
            return Err(SessionError::Configuration(
                "heartbeat interval must be at least one second".to_string(),
            ));
        }
        if config.sending_time_window.is_zero() {
            return Err(SessionError::Configuration(
                "sending time window must be positive".to_string(),
            ));
        }
        if config.logon_timeout.is_zero() {
            return Err(SessionError::Configuration(
                "logon timeout must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Saturating conversion of a duration to milliseconds.
#[inline]
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.begin_string, "FIX.4.4");
        assert_eq!(config.heartbeat_interval_secs(), 30);
        assert_eq!(config.sending_time_window_ms(), 120_000);
        assert!(config.validate_checksum);
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .begin_string("FIX.4.2")
            .heartbeat_interval(Duration::from_secs(60))
            .sender(CompId::new("BANK").unwrap(), Some("DESK".to_string()))
            .target(CompId::new("GATEWAY").unwrap(), None)
            .reset_seq_num_on_logon(true)
            .build()
            .unwrap();

        assert_eq!(config.begin_string, "FIX.4.2");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.sender_sub_id.as_deref(), Some("DESK"));
        assert!(config.reset_seq_num_on_logon);
    }

    #[test]
    fn test_session_config_builder_rejects_invalid_values() {
        assert!(matches!(
            SessionConfig::builder().begin_string("").build(),
            Err(SessionError::Configuration(_))
        ));
        assert!(matches!(
            SessionConfig::builder()
                .heartbeat_interval(Duration::from_millis(10))
                .build(),
            Err(SessionError::Configuration(_))
        ));
        assert!(matches!(
            SessionConfig::builder()
                .sending_time_window(Duration::ZERO)
                .build(),
            Err(SessionError::Configuration(_))
        ));
    }
}

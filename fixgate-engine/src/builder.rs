/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! [`EngineBuilder`] assembles an [`EngineConfig`]: the default session
//! configuration, handshake settings, strategy objects, clock and the
//! publications and indexes the engine records to.

use crate::strategy::{
    AcceptAllAuthenticator, Authenticator, ErrorHandler, FixedPersistence, LoggingErrorHandler,
    PersistenceLevel, SessionPersistenceStrategy,
};
use fixgate_core::{Clock, SessionError, SystemClock};
use fixgate_session::config::duration_ms;
use fixgate_session::{SenderTargetIdStrategy, SessionConfig, SessionIdStrategy};
use fixgate_store::{MemoryPublication, MemorySequenceIndex, Publication, SequenceNumberIndex};
use std::sync::Arc;
use std::time::Duration;

/// Default time an authenticator has to deliver its verdict.
pub const DEFAULT_AUTHENTICATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Complete engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Settings applied to every session.
    pub session: SessionConfig,
    /// Archive inbound messages to `inbound`.
    pub log_all_messages: bool,
    /// Time an authenticator has to deliver its verdict.
    pub authentication_timeout: Duration,
    /// Decides whether logons are accepted.
    pub authenticator: Arc<dyn Authenticator>,
    /// Decides whether logons reset or resume sequence numbers.
    pub persistence: Arc<dyn SessionPersistenceStrategy>,
    /// Derives composite keys from headers.
    pub id_strategy: Arc<dyn SessionIdStrategy>,
    /// Sink for collaborator faults.
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Archive of sent messages.
    pub outbound: Arc<dyn Publication>,
    /// Archive of received messages.
    pub inbound: Arc<dyn Publication>,
    /// Index following `outbound`.
    pub sent_index: Arc<dyn SequenceNumberIndex>,
    /// Index following `inbound`.
    pub received_index: Arc<dyn SequenceNumberIndex>,
}

impl EngineConfig {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Authentication timeout in milliseconds.
    #[must_use]
    pub fn authentication_timeout_ms(&self) -> u64 {
        duration_ms(self.authentication_timeout)
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("session", &self.session)
            .field("log_all_messages", &self.log_all_messages)
            .field("authentication_timeout", &self.authentication_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineConfig`].
pub struct EngineBuilder {
    session: SessionConfig,
    log_all_messages: bool,
    authentication_timeout: Duration,
    authenticator: Arc<dyn Authenticator>,
    persistence: Arc<dyn SessionPersistenceStrategy>,
    id_strategy: Arc<dyn SessionIdStrategy>,
    error_handler: Arc<dyn ErrorHandler>,
    clock: Arc<dyn Clock>,
    outbound: Arc<dyn Publication>,
    inbound: Arc<dyn Publication>,
    sent_index: Arc<dyn SequenceNumberIndex>,
    received_index: Arc<dyn SequenceNumberIndex>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with default settings: accept every logon, reset
    /// sequence numbers on every logon, log all messages in memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: SessionConfig::default(),
            log_all_messages: true,
            authentication_timeout: DEFAULT_AUTHENTICATION_TIMEOUT,
            authenticator: Arc::new(AcceptAllAuthenticator),
            persistence: Arc::new(FixedPersistence(PersistenceLevel::ResetSequenceNumbers)),
            id_strategy: Arc::new(SenderTargetIdStrategy),
            error_handler: Arc::new(LoggingErrorHandler),
            clock: Arc::new(SystemClock::new()),
            outbound: Arc::new(MemoryPublication::new()),
            inbound: Arc::new(MemoryPublication::new()),
            sent_index: Arc::new(MemorySequenceIndex::new()),
            received_index: Arc::new(MemorySequenceIndex::new()),
        }
    }

    /// Sets the session configuration.
    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Enables or disables archiving of inbound messages.
    #[must_use]
    pub const fn with_log_all_messages(mut self, enabled: bool) -> Self {
        self.log_all_messages = enabled;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub const fn with_authentication_timeout(mut self, timeout: Duration) -> Self {
        self.authentication_timeout = timeout;
        self
    }

    /// Sets the authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Sets the persistence strategy.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn SessionPersistenceStrategy>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets the session id strategy.
    #[must_use]
    pub fn with_id_strategy(mut self, strategy: Arc<dyn SessionIdStrategy>) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Sets the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the outbound and inbound archives.
    #[must_use]
    pub fn with_publications(
        mut self,
        outbound: Arc<dyn Publication>,
        inbound: Arc<dyn Publication>,
    ) -> Self {
        self.outbound = outbound;
        self.inbound = inbound;
        self
    }

    /// Sets the indexes following the outbound and inbound archives.
    #[must_use]
    pub fn with_indexes(
        mut self,
        sent: Arc<dyn SequenceNumberIndex>,
        received: Arc<dyn SequenceNumberIndex>,
    ) -> Self {
        self.sent_index = sent;
        self.received_index = received;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` for a zero authentication
    /// timeout.
    pub fn build(self) -> Result<EngineConfig, SessionError> {
        if self.authentication_timeout.is_zero() {
            return Err(SessionError::Configuration(
                "authentication timeout must be positive".to_string(),
            ));
        }
        Ok(EngineConfig {
            session: self.session,
            log_all_messages: self.log_all_messages,
            authentication_timeout: self.authentication_timeout,
            authenticator: self.authenticator,
            persistence: self.persistence,
            id_strategy: self.id_strategy,
            error_handler: self.error_handler,
            clock: self.clock,
            outbound: self.outbound,
            inbound: self.inbound,
            sent_index: self.sent_index,
            received_index: self.received_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_builder_default() {
        let config = EngineBuilder::new().build().unwrap();
        assert!(config.log_all_messages);
        assert_eq!(config.authentication_timeout_ms(), 5_000);
        assert_eq!(config.session.begin_string, "FIX.4.4");
    }

    #[test]
    fn test_engine_builder_overrides() {
        let session = SessionConfig::builder()
            .heartbeat_interval(Duration::from_secs(5))
            .build()
            .unwrap();
        let config = EngineConfig::builder()
            .with_session_config(session)
            .with_log_all_messages(false)
            .with_authentication_timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert!(!config.log_all_messages);
        assert_eq!(config.authentication_timeout_ms(), 250);
        assert_eq!(config.session.heartbeat_interval_secs(), 5);
    }

    #[test]
    fn test_engine_builder_rejects_zero_timeout() {
        let err = EngineBuilder::new()
            .with_authentication_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Acceptor logon handshake.
//!
//! A [`PendingAcceptorLogon`] holds an inbound connection between its first
//! message (a logon) and the moment it either becomes a session or is
//! turned away. It is polled by the gateway thread and never blocks: the
//! authenticator's verdict, the index catch-up and the reject linger are
//! all checked against the time passed to [`PendingAcceptorLogon::poll`].
//!
//! ```text
//! AUTHENTICATING -> AUTHENTICATED -> INDEXER_CATCHUP -> ACCEPTED
//!       |
//!       +-> SENDING_REJECT_MESSAGE -> LINGERING_REJECT_MESSAGE -> REJECTED
//! ```

use crate::builder::EngineConfig;
use crate::channel::TransportChannel;
use crate::contexts::{SessionContext, SessionContexts};
use crate::strategy::{AuthenticationProxy, AuthenticationVerdict, PersistenceLevel, ProtocolVariant};
use anyhow::anyhow;
use bytes::{Buf, Bytes, BytesMut};
use fixgate_core::{ConnectionId, DisconnectReason, SessionId};
use fixgate_session::{CompositeKey, LogonMessage, OutboundHeader, OutboundMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticationState {
    /// Waiting for the authenticator's verdict.
    Authenticating,
    /// Authenticator accepted; resolving the session context.
    Authenticated,
    /// Waiting for the sequence number indexes to catch up.
    IndexerCatchup,
    /// Ready to become a session.
    Accepted,
    /// Writing the reject message.
    SendingRejectMessage,
    /// Reject message written; keeping the connection open briefly.
    LingeringRejectMessage,
    /// Turned away.
    Rejected,
}

impl AuthenticationState {
    /// Returns true for `ACCEPTED` and `REJECTED`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Upper snake case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticating => "AUTHENTICATING",
            Self::Authenticated => "AUTHENTICATED",
            Self::IndexerCatchup => "INDEXER_CATCHUP",
            Self::Accepted => "ACCEPTED",
            Self::SendingRejectMessage => "SENDING_REJECT_MESSAGE",
            Self::LingeringRejectMessage => "LINGERING_REJECT_MESSAGE",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AuthenticationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logon that passed the handshake.
pub struct AcceptedLogon {
    /// Connection the logon arrived on.
    pub connection_id: ConnectionId,
    /// Durable session id.
    pub session_id: SessionId,
    /// Composite key of the session.
    pub key: CompositeKey,
    /// Whether sequence numbers restart at 1.
    pub reset_sequence_numbers: bool,
    /// Variant chosen by the authenticator.
    pub variant: ProtocolVariant,
    /// The logon itself, replayed into the new session.
    pub logon: LogonMessage,
    /// The logon as received.
    pub logon_bytes: Bytes,
    /// Write side of the connection.
    pub channel: Box<dyn TransportChannel>,
}

impl fmt::Debug for AcceptedLogon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptedLogon")
            .field("connection_id", &self.connection_id)
            .field("session_id", &self.session_id)
            .field("key", &self.key)
            .field("reset_sequence_numbers", &self.reset_sequence_numbers)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

/// Result of a finished handshake.
#[derive(Debug)]
pub enum LogonOutcome {
    /// The logon becomes a session.
    Accepted(AcceptedLogon),
    /// The connection was turned away and closed.
    Rejected {
        /// Connection the logon arrived on.
        connection_id: ConnectionId,
        /// Why.
        reason: DisconnectReason,
    },
}

/// Acceptor side of the logon handshake for one connection.
pub struct PendingAcceptorLogon {
    connection_id: ConnectionId,
    logon: LogonMessage,
    logon_bytes: Bytes,
    channel: Option<Box<dyn TransportChannel>>,
    config: Arc<EngineConfig>,
    contexts: SessionContexts,
    state: AuthenticationState,
    verdict: oneshot::Receiver<AuthenticationVerdict>,
    level: PersistenceLevel,
    variant: ProtocolVariant,
    authentication_deadline_ms: u64,
    required_sent_position: u64,
    required_received_position: u64,
    context: Option<SessionContext>,
    reset_sequence_numbers: bool,
    reject_buffer: BytesMut,
    linger_timeout_ms: u64,
    linger_deadline_ms: u64,
    reason: Option<DisconnectReason>,
}

impl PendingAcceptorLogon {
    /// Starts the handshake for `logon` received on `connection_id`.
    ///
    /// The persistence strategy and the authenticator are invoked here; a
    /// synchronous verdict is picked up by the first [`poll`](Self::poll).
    pub fn new(
        connection_id: ConnectionId,
        logon: LogonMessage,
        logon_bytes: Bytes,
        channel: Box<dyn TransportChannel>,
        config: Arc<EngineConfig>,
        contexts: SessionContexts,
        now_ms: u64,
    ) -> Self {
        let level = config
            .persistence
            .persistence_level(&logon)
            .unwrap_or_else(|error| {
                config
                    .error_handler
                    .on_error(&error.context("persistence strategy failed"));
                PersistenceLevel::ResetSequenceNumbers
            });
        let (proxy, verdict) = AuthenticationProxy::channel(connection_id);

        let mut pending = Self {
            connection_id,
            logon,
            logon_bytes,
            channel: Some(channel),
            required_sent_position: config.outbound.position(),
            required_received_position: config.inbound.position(),
            authentication_deadline_ms: now_ms.saturating_add(config.authentication_timeout_ms()),
            config,
            contexts,
            state: AuthenticationState::Authenticating,
            verdict,
            level,
            variant: ProtocolVariant::default(),
            context: None,
            reset_sequence_numbers: false,
            reject_buffer: BytesMut::new(),
            linger_timeout_ms: 0,
            linger_deadline_ms: 0,
            reason: None,
        };

        if level == PersistenceLevel::IndexedPersistent && !pending.config.log_all_messages {
            warn!(
                %connection_id,
                "indexed persistence requires logging all messages"
            );
            pending.reject(DisconnectReason::InvalidConfigurationNotLoggingMessages);
            return pending;
        }

        debug!(%connection_id, ?level, "authenticating logon");
        let authenticator = Arc::clone(&pending.config.authenticator);
        if let Err(error) = authenticator.authenticate(&pending.logon, proxy) {
            pending
                .config
                .error_handler
                .on_error(&error.context("authenticator failed"));
            match pending.verdict.try_recv() {
                Ok(AuthenticationVerdict::Reject {
                    message,
                    linger_timeout_ms,
                }) => pending.start_reject(&message, linger_timeout_ms),
                _ => pending.reject(DisconnectReason::FailedAuthentication),
            }
        }
        pending
    }

    /// Connection the logon arrived on.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Current handshake state.
    #[must_use]
    pub const fn state(&self) -> AuthenticationState {
        self.state
    }

    /// Returns true once the handshake has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Why the logon was rejected, once it was.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<DisconnectReason> {
        self.reason
    }

    /// Advances the handshake.
    ///
    /// # Returns
    /// The number of actions taken.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        match self.state {
            AuthenticationState::Authenticating => self.poll_authenticating(now_ms),
            AuthenticationState::Authenticated => {
                self.on_authenticated();
                1
            }
            AuthenticationState::IndexerCatchup => self.poll_indexer_catchup(),
            AuthenticationState::SendingRejectMessage => self.poll_sending_reject(now_ms),
            AuthenticationState::LingeringRejectMessage => {
                if now_ms >= self.linger_deadline_ms {
                    self.finish_reject();
                    1
                } else {
                    0
                }
            }
            AuthenticationState::Accepted | AuthenticationState::Rejected => 0,
        }
    }

    /// The connection closed before the handshake finished.
    pub fn abandon(&mut self) {
        if !self.is_terminal() {
            debug!(connection_id = %self.connection_id, state = %self.state, "logon abandoned");
            self.reason.get_or_insert(DisconnectReason::RemoteDisconnect);
            self.finish_reject();
        }
    }

    /// Consumes a finished handshake.
    ///
    /// A handshake that is not `ACCEPTED` is reported as rejected.
    #[must_use]
    pub fn into_outcome(mut self) -> LogonOutcome {
        if self.state == AuthenticationState::Accepted
            && let (Some(context), Some(channel)) = (self.context.take(), self.channel.take())
        {
            return LogonOutcome::Accepted(AcceptedLogon {
                connection_id: self.connection_id,
                session_id: context.session_id,
                key: context.key,
                reset_sequence_numbers: self.reset_sequence_numbers,
                variant: self.variant,
                logon: self.logon,
                logon_bytes: self.logon_bytes,
                channel,
            });
        }
        self.finish_reject();
        LogonOutcome::Rejected {
            connection_id: self.connection_id,
            reason: self
                .reason
                .unwrap_or(DisconnectReason::FailedAuthentication),
        }
    }

    fn poll_authenticating(&mut self, now_ms: u64) -> usize {
        match self.verdict.try_recv() {
            Ok(AuthenticationVerdict::Accept(variant)) => {
                self.variant = variant;
                self.set_state(AuthenticationState::Authenticated);
                self.on_authenticated();
                1
            }
            Ok(AuthenticationVerdict::Reject {
                message,
                linger_timeout_ms,
            }) => {
                self.start_reject(&message, linger_timeout_ms);
                1
            }
            Err(TryRecvError::Empty) => {
                if now_ms >= self.authentication_deadline_ms {
                    warn!(connection_id = %self.connection_id, "authentication timed out");
                    self.reject(DisconnectReason::AuthenticationTimeout);
                    1
                } else {
                    0
                }
            }
            Err(TryRecvError::Closed) => {
                self.config.error_handler.on_error(&anyhow!(
                    "authenticator for connection {} gave up without a verdict",
                    self.connection_id
                ));
                self.reject(DisconnectReason::FailedAuthentication);
                1
            }
        }
    }

    fn on_authenticated(&mut self) {
        let key = match self.config.id_strategy.on_accept_logon(&self.logon.header) {
            Ok(key) => key,
            Err(error) => {
                warn!(connection_id = %self.connection_id, %error, "cannot identify logon");
                self.reject(DisconnectReason::MissingLogonCompId);
                return;
            }
        };

        let reset = self.level == PersistenceLevel::ResetSequenceNumbers
            || self.logon.reset_seq_num_flag;
        let now = self.config.clock.timestamp();
        let Some(context) = self.contexts.on_logon(&key, now, reset) else {
            warn!(connection_id = %self.connection_id, %key, "session already logged on");
            self.reject(DisconnectReason::DuplicateSession);
            return;
        };

        info!(
            connection_id = %self.connection_id,
            session_id = %context.session_id,
            %key,
            reset,
            "logon authenticated"
        );
        self.context = Some(context);
        self.reset_sequence_numbers = reset;
        if reset {
            self.set_state(AuthenticationState::Accepted);
        } else {
            self.set_state(AuthenticationState::IndexerCatchup);
            self.poll_indexer_catchup();
        }
    }

    fn poll_indexer_catchup(&mut self) -> usize {
        let sent = self.config.sent_index.indexed_position();
        let received = self.config.received_index.indexed_position();
        if sent >= self.required_sent_position && received >= self.required_received_position {
            self.set_state(AuthenticationState::Accepted);
            1
        } else {
            0
        }
    }

    fn start_reject(&mut self, message: &OutboundMessage, linger_timeout_ms: u64) {
        self.reason = Some(DisconnectReason::FailedAuthentication);
        let inbound = &self.logon.header;
        let header = OutboundHeader {
            sender_comp_id: inbound.target_comp_id.clone().unwrap_or_default(),
            sender_sub_id: inbound.target_sub_id.clone(),
            target_comp_id: inbound.sender_comp_id.clone().unwrap_or_default(),
            target_sub_id: inbound.sender_sub_id.clone(),
        };
        let encoded = message.encode(
            &self.config.session.begin_string,
            &header,
            1,
            self.config.clock.timestamp(),
            None,
        );
        match encoded {
            Ok(bytes) => {
                info!(
                    connection_id = %self.connection_id,
                    msg_type = %message.msg_type(),
                    linger_timeout_ms,
                    "rejecting logon"
                );
                self.reject_buffer = bytes;
                self.linger_timeout_ms = linger_timeout_ms;
                self.set_state(AuthenticationState::SendingRejectMessage);
            }
            Err(error) => {
                self.config.error_handler.on_error(
                    &anyhow::Error::new(error).context("cannot encode logon reject message"),
                );
                self.finish_reject();
            }
        }
    }

    fn poll_sending_reject(&mut self, now_ms: u64) -> usize {
        let Some(channel) = self.channel.as_mut() else {
            self.finish_reject();
            return 1;
        };
        match channel.write(&self.reject_buffer) {
            Ok(written) => {
                self.reject_buffer.advance(written);
                if self.reject_buffer.is_empty() {
                    self.linger_deadline_ms = now_ms.saturating_add(self.linger_timeout_ms);
                    self.set_state(AuthenticationState::LingeringRejectMessage);
                }
                usize::from(written > 0)
            }
            Err(error) => {
                debug!(connection_id = %self.connection_id, %error, "peer gone while rejecting");
                self.finish_reject();
                1
            }
        }
    }

    fn reject(&mut self, reason: DisconnectReason) {
        info!(connection_id = %self.connection_id, %reason, "logon rejected");
        self.reason = Some(reason);
        self.finish_reject();
    }

    fn finish_reject(&mut self) {
        if let Some(context) = self.context.take() {
            self.contexts.on_disconnect(context.session_id);
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.set_state(AuthenticationState::Rejected);
    }

    fn set_state(&mut self, state: AuthenticationState) {
        if self.state != state {
            debug!(
                connection_id = %self.connection_id,
                from = %self.state,
                to = %state,
                "handshake state change"
            );
            self.state = state;
        }
    }
}

impl fmt::Debug for PendingAcceptorLogon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAcceptorLogon")
            .field("connection_id", &self.connection_id)
            .field("state", &self.state)
            .field("level", &self.level)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use crate::channel::MemoryChannel;
    use crate::strategy::{Authenticator, ErrorHandler, FixedPersistence};
    use fixgate_codec::Decoder;
    use fixgate_core::{ManualClock, MsgType, SessionError, Timestamp, tags};
    use fixgate_session::SessionHeader;
    use fixgate_store::{MemoryPublication, MemorySequenceIndex, MessageHeader, Publication};
    use parking_lot::Mutex;
    use std::time::Duration;

    pub(crate) const START_MS: u64 = 1_700_000_000_000;

    pub(crate) fn logon_from(sender: &str) -> LogonMessage {
        LogonMessage {
            header: SessionHeader::new(MsgType::Logon, Some(1))
                .with_comp_ids(sender, "GATEWAY")
                .with_sending_time(Timestamp::from_millis(START_MS)),
            heart_bt_int: 30,
            reset_seq_num_flag: false,
            username: None,
            password: None,
        }
    }

    struct Rejecting {
        linger_timeout_ms: i64,
    }

    impl Authenticator for Rejecting {
        fn authenticate(&self, _logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()> {
            let logout = OutboundMessage::new(MsgType::Logout).with_field(tags::TEXT, "not welcome");
            proxy.reject(logout, self.linger_timeout_ms)?;
            Ok(())
        }
    }

    /// Holds on to the proxy so the test decides when to answer.
    #[derive(Default)]
    struct Deferred {
        proxies: Mutex<Vec<AuthenticationProxy>>,
    }

    impl Authenticator for Arc<Deferred> {
        fn authenticate(&self, _logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()> {
            self.proxies.lock().push(proxy);
            Ok(())
        }
    }

    struct Failing;

    impl Authenticator for Failing {
        fn authenticate(&self, _logon: &LogonMessage, _proxy: AuthenticationProxy) -> anyhow::Result<()> {
            Err(anyhow!("directory unavailable"))
        }
    }

    #[derive(Default)]
    struct CountingErrors(Mutex<Vec<String>>);

    impl ErrorHandler for Arc<CountingErrors> {
        fn on_error(&self, error: &anyhow::Error) {
            self.0.lock().push(format!("{error:#}"));
        }
    }

    fn builder(clock: &ManualClock) -> EngineBuilder {
        EngineBuilder::new().with_clock(Arc::new(clock.clone()))
    }

    fn pending(
        config: EngineConfig,
        contexts: &SessionContexts,
        sender: &str,
        channel: MemoryChannel,
    ) -> PendingAcceptorLogon {
        PendingAcceptorLogon::new(
            ConnectionId::new(1),
            logon_from(sender),
            Bytes::new(),
            Box::new(channel),
            Arc::new(config),
            contexts.clone(),
            START_MS,
        )
    }

    #[test]
    fn test_accept_with_reset() {
        let clock = ManualClock::new(START_MS);
        let contexts = SessionContexts::new();
        let mut logon = pending(
            builder(&clock).build().unwrap(),
            &contexts,
            "CLIENT",
            MemoryChannel::new(),
        );
        assert_eq!(logon.state(), AuthenticationState::Authenticating);

        logon.poll(START_MS);
        assert_eq!(logon.state(), AuthenticationState::Accepted);
        match logon.into_outcome() {
            LogonOutcome::Accepted(accepted) => {
                assert_eq!(accepted.session_id, SessionId::new(1));
                assert_eq!(accepted.key.to_string(), "GATEWAY->CLIENT");
                assert!(accepted.reset_sequence_numbers);
                assert_eq!(accepted.variant, ProtocolVariant::Fix);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_key_yields_one_accept_and_one_reject() {
        let clock = ManualClock::new(START_MS);
        let contexts = SessionContexts::new();
        let config = builder(&clock).build().unwrap();
        let mut first = pending(config.clone(), &contexts, "CLIENT", MemoryChannel::new());
        let second_channel = MemoryChannel::new();
        let mut second = pending(config, &contexts, "CLIENT", second_channel.clone());

        first.poll(START_MS);
        second.poll(START_MS);

        let states = [first.state(), second.state()];
        assert_eq!(
            states,
            [AuthenticationState::Accepted, AuthenticationState::Rejected]
        );
        assert_eq!(
            second.reject_reason(),
            Some(DisconnectReason::DuplicateSession)
        );
        assert!(second_channel.is_closed());
    }

    #[test]
    fn test_reject_lingers_after_drain() {
        let clock = ManualClock::new(START_MS);
        let contexts = SessionContexts::new();
        let config = builder(&clock)
            .with_authenticator(Arc::new(Rejecting {
                linger_timeout_ms: 50,
            }))
            .build()
            .unwrap();
        let observer = MemoryChannel::new().with_max_write(16);
        let mut logon = pending(config, &contexts, "CLIENT", observer.clone());

        let mut now = START_MS;
        logon.poll(now);
        assert_eq!(logon.state(), AuthenticationState::SendingRejectMessage);
        while logon.state() == AuthenticationState::SendingRejectMessage {
            now += 1;
            logon.poll(now);
        }
        assert_eq!(logon.state(), AuthenticationState::LingeringRejectMessage);
        let drained_at = now;
        assert!(!observer.is_closed());

        let raw_bytes = observer.written();
        let raw = Decoder::new(&raw_bytes).decode().unwrap();
        assert_eq!(raw.msg_type(), &MsgType::Logout);
        assert_eq!(raw.get_uint(tags::MSG_SEQ_NUM).unwrap(), Some(1));
        assert_eq!(raw.get_str(tags::SENDER_COMP_ID).unwrap(), Some("GATEWAY"));
        assert_eq!(raw.get_str(tags::TARGET_COMP_ID).unwrap(), Some("CLIENT"));

        logon.poll(drained_at + 49);
        assert_eq!(logon.state(), AuthenticationState::LingeringRejectMessage);
        assert!(!observer.is_closed());

        logon.poll(drained_at + 50);
        assert_eq!(logon.state(), AuthenticationState::Rejected);
        assert!(observer.is_closed());
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::FailedAuthentication)
        );
    }

    #[test]
    fn test_negative_linger_fails_authentication() {
        let clock = ManualClock::new(START_MS);
        let errors = Arc::new(CountingErrors::default());
        let config = builder(&clock)
            .with_authenticator(Arc::new(Rejecting {
                linger_timeout_ms: -1,
            }))
            .with_error_handler(Arc::new(Arc::clone(&errors)))
            .build()
            .unwrap();
        let logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());

        assert_eq!(logon.state(), AuthenticationState::Rejected);
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::FailedAuthentication)
        );
        let reported = errors.0.lock().clone();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains(
            &SessionError::NegativeLingerTimeout {
                linger_timeout_ms: -1
            }
            .to_string()
        ));
    }

    #[test]
    fn test_authenticator_fault_rejects() {
        let clock = ManualClock::new(START_MS);
        let errors = Arc::new(CountingErrors::default());
        let config = builder(&clock)
            .with_authenticator(Arc::new(Failing))
            .with_error_handler(Arc::new(Arc::clone(&errors)))
            .build()
            .unwrap();
        let logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());
        assert_eq!(logon.state(), AuthenticationState::Rejected);
        assert_eq!(errors.0.lock().len(), 1);
    }

    #[test]
    fn test_authentication_timeout() {
        let clock = ManualClock::new(START_MS);
        let deferred = Arc::new(Deferred::default());
        let config = builder(&clock)
            .with_authenticator(Arc::new(Arc::clone(&deferred)))
            .with_authentication_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let mut logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());

        assert_eq!(logon.poll(START_MS + 99), 0);
        assert_eq!(logon.state(), AuthenticationState::Authenticating);
        logon.poll(START_MS + 100);
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::AuthenticationTimeout)
        );

        // A late verdict is ignored.
        if let Some(proxy) = deferred.proxies.lock().pop() {
            proxy.accept();
        }
        assert_eq!(logon.state(), AuthenticationState::Rejected);
    }

    #[test]
    fn test_dropped_proxy_fails_authentication() {
        let clock = ManualClock::new(START_MS);
        let deferred = Arc::new(Deferred::default());
        let config = builder(&clock)
            .with_authenticator(Arc::new(Arc::clone(&deferred)))
            .build()
            .unwrap();
        let mut logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());
        deferred.proxies.lock().clear();

        logon.poll(START_MS);
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::FailedAuthentication)
        );
    }

    #[tokio::test]
    async fn test_async_authenticator_verdict_on_later_poll() {
        struct Background;

        impl Authenticator for Background {
            fn authenticate(&self, _logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()> {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    proxy.accept_with(ProtocolVariant::Fixt);
                });
                Ok(())
            }
        }

        let clock = ManualClock::new(START_MS);
        let config = builder(&clock)
            .with_authenticator(Arc::new(Background))
            .build()
            .unwrap();
        let mut logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());

        for _ in 0..100 {
            if logon.is_terminal() {
                break;
            }
            logon.poll(START_MS);
            tokio::task::yield_now().await;
        }
        assert_eq!(logon.state(), AuthenticationState::Accepted);
        match logon.into_outcome() {
            LogonOutcome::Accepted(accepted) => assert_eq!(accepted.variant, ProtocolVariant::Fixt),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_indexed_persistence_without_logging_is_rejected() {
        let clock = ManualClock::new(START_MS);
        let config = builder(&clock)
            .with_persistence(Arc::new(FixedPersistence(PersistenceLevel::IndexedPersistent)))
            .with_log_all_messages(false)
            .build()
            .unwrap();
        let logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());
        assert_eq!(logon.state(), AuthenticationState::Rejected);
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::InvalidConfigurationNotLoggingMessages)
        );
    }

    #[test]
    fn test_indexer_catchup_waits_for_recorded_position() {
        let clock = ManualClock::new(START_MS);
        let outbound = Arc::new(MemoryPublication::new());
        let inbound = Arc::new(MemoryPublication::new());
        let sent_index = Arc::new(MemorySequenceIndex::new());
        let received_index = Arc::new(MemorySequenceIndex::new());
        outbound
            .save_message(
                b"8=FIX.4.4",
                &MessageHeader {
                    connection_id: ConnectionId::new(9),
                    session_id: SessionId::new(1),
                    msg_type: MsgType::Logout,
                    msg_seq_num: 7,
                },
            )
            .unwrap();

        let config = builder(&clock)
            .with_persistence(Arc::new(FixedPersistence(PersistenceLevel::IndexedPersistent)))
            .with_publications(
                Arc::clone(&outbound) as Arc<dyn Publication>,
                Arc::clone(&inbound) as Arc<dyn Publication>,
            )
            .with_indexes(
                Arc::clone(&sent_index) as Arc<dyn fixgate_store::SequenceNumberIndex>,
                Arc::clone(&received_index) as Arc<dyn fixgate_store::SequenceNumberIndex>,
            )
            .build()
            .unwrap();
        let mut logon = pending(config, &SessionContexts::new(), "CLIENT", MemoryChannel::new());

        logon.poll(START_MS);
        assert_eq!(logon.state(), AuthenticationState::IndexerCatchup);
        assert_eq!(logon.poll(START_MS + 1), 0);

        sent_index.catch_up(&outbound);
        logon.poll(START_MS + 2);
        assert_eq!(logon.state(), AuthenticationState::Accepted);
        match logon.into_outcome() {
            LogonOutcome::Accepted(accepted) => assert!(!accepted.reset_sequence_numbers),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_abandon_releases_context() {
        let clock = ManualClock::new(START_MS);
        let contexts = SessionContexts::new();
        let outbound = Arc::new(MemoryPublication::new());
        outbound
            .save_logon(ConnectionId::new(9), SessionId::new(1))
            .unwrap();
        let config = builder(&clock)
            .with_persistence(Arc::new(FixedPersistence(PersistenceLevel::IndexedPersistent)))
            .with_publications(
                outbound as Arc<dyn Publication>,
                Arc::new(MemoryPublication::new()),
            )
            .build()
            .unwrap();
        let mut logon = pending(config, &contexts, "CLIENT", MemoryChannel::new());
        logon.poll(START_MS);
        assert_eq!(logon.state(), AuthenticationState::IndexerCatchup);
        assert!(contexts.is_active(SessionId::new(1)));

        logon.abandon();
        assert!(!contexts.is_active(SessionId::new(1)));
        assert_eq!(
            logon.reject_reason(),
            Some(DisconnectReason::RemoteDisconnect)
        );
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Owned session handles.
//!
//! A [`SessionHandle`] bundles a [`Session`] with the parser bound to it
//! and the inbound archive. It is the unit of ownership moved between the
//! gateway and a [`SessionOwner`](crate::library::SessionOwner): whoever
//! holds the handle is the only one allowed to poll it.

use crate::builder::EngineConfig;
use fixgate_core::{Clock, ConnectionId, DecodeError, MsgType, SessionError, SessionId};
use fixgate_session::{
    CompositeKey, DirectSessionProxy, InboundSummary, LogonMessage, OutboundMessage,
    SequenceCounter, Session, SessionConfig, SessionIdStrategy, SessionParser, SessionParts,
    SessionSnapshot, SessionState,
};
use fixgate_store::{MessageHeader, Publication};
use std::sync::Arc;
use tracing::warn;

/// A session together with its parser.
pub struct SessionHandle {
    session: Session,
    parser: SessionParser,
    archive: Option<Arc<dyn Publication>>,
}

impl SessionHandle {
    /// Connection the session runs on.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.session.connection_id()
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The session, mutably.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Parses `bytes` into the session and archives them.
    ///
    /// # Errors
    /// Returns `DecodeError` if `bytes` is not a well framed message; such
    /// bytes are not archived.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Result<InboundSummary, DecodeError> {
        let summary = self.parser.parse(&mut self.session, bytes)?;
        self.archive_inbound(bytes, &summary.msg_type, summary.msg_seq_num);
        Ok(summary)
    }

    /// Replays a logon that was decoded and authenticated elsewhere.
    pub fn replay_logon(
        &mut self,
        logon: &LogonMessage,
        bytes: &[u8],
        session_id: SessionId,
        key: CompositeKey,
    ) {
        self.session.on_logon(logon, session_id, key);
        self.archive_inbound(bytes, &logon.header.msg_type, logon.header.msg_seq_num);
    }

    fn archive_inbound(&self, bytes: &[u8], msg_type: &MsgType, msg_seq_num: Option<u64>) {
        let Some(archive) = &self.archive else {
            return;
        };
        let header = MessageHeader {
            connection_id: self.session.connection_id(),
            session_id: self.session.id(),
            msg_type: msg_type.clone(),
            msg_seq_num: msg_seq_num.unwrap_or(0),
        };
        if let Err(error) = archive.save_message(bytes, &header) {
            warn!(
                connection_id = %header.connection_id,
                %error,
                "failed to archive inbound message"
            );
        }
    }

    /// Fires due timers.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        self.session.poll(now_ms)
    }

    /// Sends an application message.
    ///
    /// # Errors
    /// See [`Session::send`].
    pub fn send(&mut self, message: &OutboundMessage) -> Result<u64, SessionError> {
        self.session.send(message)
    }

    /// Gives up ownership, returning what the next owner needs.
    ///
    /// The snapshot is taken before the session is disabled, so it carries
    /// the state the next owner resumes in.
    #[must_use]
    pub fn release(mut self) -> SessionSnapshot {
        let snapshot = self.session.snapshot();
        self.session.disable();
        snapshot
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .field("archiving", &self.archive.is_some())
            .finish()
    }
}

/// Builds session handles with the engine's collaborators.
#[derive(Clone)]
pub struct SessionFactory {
    config: SessionConfig,
    strategy: Arc<dyn SessionIdStrategy>,
    clock: Arc<dyn Clock>,
    outbound: Arc<dyn Publication>,
    archive: Option<Arc<dyn Publication>>,
}

impl SessionFactory {
    /// Creates a factory whose sessions publish to `outbound`.
    #[must_use]
    pub fn new(engine: &EngineConfig, outbound: Arc<dyn Publication>) -> Self {
        Self {
            config: engine.session.clone(),
            strategy: Arc::clone(&engine.id_strategy),
            clock: Arc::clone(&engine.clock),
            outbound,
            archive: engine
                .log_all_messages
                .then(|| Arc::clone(&engine.inbound)),
        }
    }

    /// Session configuration shared by every handle.
    #[must_use]
    pub const fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates an acceptor session waiting for its logon.
    #[must_use]
    pub fn acceptor(
        &self,
        connection_id: ConnectionId,
        last_sent_msg_seq_num: u64,
        last_received_msg_seq_num: u64,
    ) -> SessionHandle {
        let parts = self.parts(
            connection_id,
            last_sent_msg_seq_num,
            last_received_msg_seq_num,
        );
        self.handle(Session::new(parts, &self.config, SessionState::Connected))
    }

    /// Rebuilds a released session without consuming sequence numbers.
    #[must_use]
    pub fn acquire(&self, snapshot: &SessionSnapshot) -> SessionHandle {
        let parts = self.parts(
            snapshot.connection_id,
            snapshot.last_sent_msg_seq_num,
            snapshot.last_received_msg_seq_num,
        );
        self.handle(Session::from_snapshot(parts, &self.config, snapshot))
    }

    fn parts(&self, connection_id: ConnectionId, last_sent: u64, last_received: u64) -> SessionParts {
        let proxy = DirectSessionProxy::new(
            connection_id,
            self.config.begin_string.clone(),
            Arc::clone(&self.strategy),
            Arc::clone(&self.clock),
            Arc::clone(&self.outbound),
        );
        SessionParts {
            connection_id,
            proxy: Box::new(proxy),
            publication: Arc::clone(&self.outbound),
            clock: Arc::clone(&self.clock),
            sent: SequenceCounter::new(last_sent),
            received: SequenceCounter::new(last_received),
        }
    }

    fn handle(&self, session: Session) -> SessionHandle {
        SessionHandle {
            session,
            parser: SessionParser::new(&self.config, Arc::clone(&self.strategy)),
            archive: self.archive.clone(),
        }
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .field("archiving", &self.archive.is_some())
            .finish_non_exhaustive()
    }
}

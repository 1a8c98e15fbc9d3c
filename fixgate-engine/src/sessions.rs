/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Gateway session pool.
//!
//! [`GatewaySessions`] is driven by a single gateway thread. Each call to
//! [`GatewaySessions::poll`] advances pending logons, applies ownership
//! commands from workers, polls every gateway-owned session and flushes
//! outbound frames. Nothing here blocks.
//!
//! # Example
//!
//! ```rust,ignore
//! use fixgate_engine::{EngineBuilder, GatewaySessions, MemoryChannel};
//!
//! let mut gateway = GatewaySessions::new(EngineBuilder::new().build()?);
//! gateway.authenticate(connection_id, &logon_bytes, Box::new(MemoryChannel::new()))?;
//! gateway.poll(now_ms);
//! for event in gateway.drain_events() {
//!     println!("{event:?}");
//! }
//! ```

use crate::authentication::{LogonOutcome, PendingAcceptorLogon};
use crate::builder::EngineConfig;
use crate::channel::TransportChannel;
use crate::contexts::{SessionContext, SessionContexts};
use crate::framer::{Framer, outbound_frames};
use crate::handle::{SessionFactory, SessionHandle};
use crate::library::{GatewayCommand, LibraryCommand, SessionOwner};
use crate::strategy::ProtocolVariant;
use bytes::Bytes;
use crossbeam_channel::{Receiver, SendError, Sender, unbounded};
use fixgate_codec::Decoder;
use fixgate_core::{ConnectionId, DisconnectReason, FixError, MsgType, SessionError, SessionId};
use fixgate_session::{CompositeKey, CounterReader, LogonMessage, SessionSnapshot, SessionState};
use fixgate_store::Publication;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something the host may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    /// A logon was accepted and its session is live.
    LogonAccepted {
        connection_id: ConnectionId,
        session_id: SessionId,
        key: CompositeKey,
        variant: ProtocolVariant,
    },
    /// A connection was turned away before becoming a session.
    LogonRejected {
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
    /// A live session ended.
    SessionDisconnected {
        connection_id: ConnectionId,
        session_id: SessionId,
        reason: DisconnectReason,
    },
    /// A worker took over a session.
    SessionHandedOver {
        connection_id: ConnectionId,
        session_id: SessionId,
        library_id: u64,
    },
    /// A worker gave a session back.
    SessionReturned {
        connection_id: ConnectionId,
        session_id: SessionId,
        library_id: u64,
    },
}

/// Who currently polls a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionOwnerKind {
    /// The gateway thread.
    Gateway,
    /// A worker, by library id.
    Library(u64),
}

/// Admin view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Connection the session runs on.
    pub connection_id: ConnectionId,
    /// Durable session id.
    pub session_id: SessionId,
    /// Composite key.
    pub key: Option<CompositeKey>,
    /// Current owner.
    pub owner: SessionOwnerKind,
    /// Known only while the gateway owns the session.
    pub state: Option<SessionState>,
    /// Last sent MsgSeqNum.
    pub last_sent_msg_seq_num: u64,
    /// Last received MsgSeqNum.
    pub last_received_msg_seq_num: u64,
}

/// Gateway record of a session a worker owns.
#[derive(Debug)]
struct LibrarySession {
    library_id: u64,
    session_id: SessionId,
    key: Option<CompositeKey>,
    sent: CounterReader,
    received: CounterReader,
}

/// Pool of pending logons and live sessions on the gateway thread.
pub struct GatewaySessions {
    config: Arc<EngineConfig>,
    contexts: SessionContexts,
    factory: SessionFactory,
    framer: Framer,
    pending: Vec<PendingAcceptorLogon>,
    sessions: Vec<SessionHandle>,
    library_sessions: HashMap<ConnectionId, LibrarySession>,
    libraries: HashMap<u64, Sender<LibraryCommand>>,
    commands: Receiver<GatewayCommand>,
    command_sender: Sender<GatewayCommand>,
    next_library_id: u64,
    events: Vec<GatewayEvent>,
}

impl GatewaySessions {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let (frames, framer) = outbound_frames(Arc::clone(&config.outbound));
        let factory = SessionFactory::new(&config, Arc::new(frames) as Arc<dyn Publication>);
        let (command_sender, commands) = unbounded();
        Self {
            config: Arc::new(config),
            contexts: SessionContexts::new(),
            factory,
            framer,
            pending: Vec::new(),
            sessions: Vec::new(),
            library_sessions: HashMap::new(),
            libraries: HashMap::new(),
            commands,
            command_sender,
            next_library_id: 1,
            events: Vec::new(),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session context registry.
    #[must_use]
    pub const fn contexts(&self) -> &SessionContexts {
        &self.contexts
    }

    /// Context registered for `key`, if it ever logged on.
    #[must_use]
    pub fn session_context(&self, key: &CompositeKey) -> Option<SessionContext> {
        self.contexts.lookup(key)
    }

    /// Resets the sequence numbers of the offline session for `key`.
    ///
    /// Its next logon starts from sequence number 1 in both directions
    /// instead of resuming from the indexes.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` while the session is logged on.
    pub fn reset_sequence_numbers(
        &mut self,
        key: &CompositeKey,
    ) -> Result<SessionContext, SessionError> {
        let context = self
            .contexts
            .sequence_reset(key, self.config.clock.timestamp())
            .ok_or_else(|| SessionError::InvalidState {
                expected: "DISCONNECTED".to_string(),
                current: "ACTIVE".to_string(),
            })?;
        info!(session_id = %context.session_id, %key, "sequence numbers will reset on next logon");
        Ok(context)
    }

    /// Starts authenticating the first message read from a new connection.
    ///
    /// A message that is framed but is not an acceptable logon closes the
    /// connection and queues [`GatewayEvent::LogonRejected`].
    ///
    /// # Errors
    /// Returns `FixError::Decode` if `logon_bytes` is not a framed message;
    /// the connection is closed as well.
    pub fn authenticate(
        &mut self,
        connection_id: ConnectionId,
        logon_bytes: &[u8],
        mut channel: Box<dyn TransportChannel>,
    ) -> Result<(), FixError> {
        let session_config = &self.config.session;
        let raw = match Decoder::new(logon_bytes)
            .with_checksum_validation(session_config.validate_checksum)
            .decode()
        {
            Ok(raw) => raw,
            Err(error) => {
                channel.close();
                self.reject_connection(connection_id, DisconnectReason::InvalidMessage);
                return Err(error.into());
            }
        };

        let rejection = if raw.begin_string() != session_config.begin_string {
            Some(DisconnectReason::InvalidBeginString)
        } else if raw.msg_type() != &MsgType::Logon {
            Some(DisconnectReason::FirstMessageNotLogon)
        } else {
            None
        };
        let logon = match rejection {
            Some(reason) => Err(reason),
            None => LogonMessage::decode(&raw).map_err(|error| {
                warn!(%connection_id, %error, "malformed logon");
                DisconnectReason::InvalidMessage
            }),
        };
        let logon = match logon {
            Ok(logon) => logon,
            Err(reason) => {
                channel.close();
                self.reject_connection(connection_id, reason);
                return Ok(());
            }
        };

        debug!(%connection_id, "logon received");
        let pending = PendingAcceptorLogon::new(
            connection_id,
            logon,
            Bytes::copy_from_slice(logon_bytes),
            channel,
            Arc::clone(&self.config),
            self.contexts.clone(),
            self.config.clock.time_ms(),
        );
        self.pending.push(pending);
        Ok(())
    }

    /// Delivers bytes read from `connection_id`.
    ///
    /// # Errors
    /// Returns `FixError::Decode` for bytes that are not a framed message,
    /// `SessionError::UnknownSession` for a connection without a session,
    /// `SessionError::InvalidState` while its logon is still pending and
    /// `SessionError::ChannelClosed` if the owning worker is gone.
    pub fn on_message(&mut self, connection_id: ConnectionId, bytes: &[u8]) -> Result<(), FixError> {
        if let Some(handle) = self.session_mut(connection_id) {
            handle.on_bytes(bytes)?;
            return Ok(());
        }

        if let Some(binding) = self.library_sessions.get(&connection_id) {
            let library_id = binding.library_id;
            let command = LibraryCommand::Inbound {
                connection_id,
                bytes: Bytes::copy_from_slice(bytes),
            };
            if !self.send_to_library(library_id, command) {
                self.close_library(library_id);
                return Err(SessionError::ChannelClosed.into());
            }
            return Ok(());
        }

        if let Some(pending) = self.pending.iter().find(|p| p.connection_id() == connection_id) {
            return Err(SessionError::InvalidState {
                expected: "ACCEPTED".to_string(),
                current: pending.state().to_string(),
            }
            .into());
        }
        Err(SessionError::UnknownSession { connection_id }.into())
    }

    /// The transport of `connection_id` closed.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` if nothing is bound to the
    /// connection.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) -> Result<(), SessionError> {
        if let Some(pending) = self
            .pending
            .iter_mut()
            .find(|p| p.connection_id() == connection_id)
        {
            pending.abandon();
            return Ok(());
        }
        if let Some(handle) = self.session_mut(connection_id) {
            handle.session_mut().on_disconnect();
            self.framer.close(connection_id);
            return Ok(());
        }
        if self.library_sessions.contains_key(&connection_id) {
            self.framer.close(connection_id);
            self.on_library_session_closed(connection_id, DisconnectReason::RemoteDisconnect, true);
            return Ok(());
        }
        Err(SessionError::UnknownSession { connection_id })
    }

    /// Disconnects a gateway-owned session or a pending logon.
    ///
    /// A logged on session is sent a Logout first.
    ///
    /// # Errors
    /// Returns `SessionError::NotOwned` for a session a worker owns and
    /// `SessionError::UnknownSession` if nothing is bound to the connection.
    pub fn force_disconnect(
        &mut self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<(), SessionError> {
        if let Some(handle) = self.session_mut(connection_id) {
            let session = handle.session_mut();
            if session.state().is_logged_on() {
                session.logout_and_disconnect(reason);
            } else {
                session.request_disconnect(reason);
            }
            return Ok(());
        }
        if self.library_sessions.contains_key(&connection_id) {
            return Err(SessionError::NotOwned { connection_id });
        }
        if let Some(pending) = self
            .pending
            .iter_mut()
            .find(|p| p.connection_id() == connection_id)
        {
            pending.abandon();
            return Ok(());
        }
        Err(SessionError::UnknownSession { connection_id })
    }

    /// Advances pending logons, worker commands, sessions and the framer.
    ///
    /// # Returns
    /// The amount of work done, for idle strategies.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        let mut work = self.poll_pending(now_ms);
        work += self.poll_commands();
        work += self.poll_sessions(now_ms);
        work += self.framer.poll();
        for (connection_id, reason) in self.framer.take_closed() {
            self.on_connection_closed(connection_id, reason);
        }
        work
    }

    /// Polls every gateway-owned session once, dropping those that
    /// disconnect.
    pub fn poll_sessions(&mut self, now_ms: u64) -> usize {
        let mut work = 0;
        let mut index = 0;
        while index < self.sessions.len() {
            work += self.sessions[index].poll(now_ms);
            if self.sessions[index].session().state().is_terminal() {
                let handle = self.sessions.swap_remove(index);
                self.on_session_closed(&handle);
                work += 1;
            } else {
                index += 1;
            }
        }
        work
    }

    /// Creates a worker that can take sessions over.
    pub fn new_library(&mut self) -> SessionOwner {
        let library_id = self.next_library_id;
        self.next_library_id += 1;
        let (sender, receiver) = unbounded();
        self.libraries.insert(library_id, sender);
        info!(library_id, "library connected");
        SessionOwner::new(library_id, receiver, self.command_sender.clone())
    }

    /// Every live session.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let gateway = self.sessions.iter().map(|handle| {
            let session = handle.session();
            SessionInfo {
                connection_id: session.connection_id(),
                session_id: session.id(),
                key: session.composite_key().cloned(),
                owner: SessionOwnerKind::Gateway,
                state: Some(session.state()),
                last_sent_msg_seq_num: session.last_sent_msg_seq_num(),
                last_received_msg_seq_num: session.last_received_msg_seq_num(),
            }
        });
        let libraries = self
            .library_sessions
            .iter()
            .map(|(connection_id, binding)| SessionInfo {
                connection_id: *connection_id,
                session_id: binding.session_id,
                key: binding.key.clone(),
                owner: SessionOwnerKind::Library(binding.library_id),
                state: None,
                last_sent_msg_seq_num: binding.sent.get(),
                last_received_msg_seq_num: binding.received.get(),
            });
        gateway.chain(libraries).collect()
    }

    /// Number of logons still being authenticated.
    #[must_use]
    pub fn pending_logons(&self) -> usize {
        self.pending.len()
    }

    /// Events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.events)
    }

    fn poll_pending(&mut self, now_ms: u64) -> usize {
        let mut work = 0;
        let mut index = 0;
        while index < self.pending.len() {
            work += self.pending[index].poll(now_ms);
            if self.pending[index].is_terminal() {
                let pending = self.pending.swap_remove(index);
                match pending.into_outcome() {
                    LogonOutcome::Accepted(accepted) => self.acquire_logon(accepted),
                    LogonOutcome::Rejected {
                        connection_id,
                        reason,
                    } => self.events.push(GatewayEvent::LogonRejected {
                        connection_id,
                        reason,
                    }),
                }
                work += 1;
            } else {
                index += 1;
            }
        }
        work
    }

    fn acquire_logon(&mut self, accepted: crate::authentication::AcceptedLogon) {
        let connection_id = accepted.connection_id;
        let session_id = accepted.session_id;
        let reset =
            self.contexts.take_pending_reset(session_id) || accepted.reset_sequence_numbers;
        let (last_sent, last_received) = if reset {
            (0, 0)
        } else {
            (
                self.config
                    .sent_index
                    .last_known_sequence_number(session_id)
                    .unwrap_or(0),
                self.config
                    .received_index
                    .last_known_sequence_number(session_id)
                    .unwrap_or(0),
            )
        };

        self.framer.register(connection_id, accepted.channel);
        let mut handle = self.factory.acceptor(connection_id, last_sent, last_received);
        handle.replay_logon(
            &accepted.logon,
            &accepted.logon_bytes,
            session_id,
            accepted.key.clone(),
        );

        let session = handle.session();
        if !session.is_connected() {
            let reason = session
                .disconnect_reason()
                .unwrap_or(DisconnectReason::FailedAuthentication);
            info!(%connection_id, %session_id, %reason, "logon refused by session");
            self.contexts.on_disconnect(session_id);
            self.events.push(GatewayEvent::LogonRejected {
                connection_id,
                reason,
            });
            return;
        }

        info!(
            %connection_id,
            %session_id,
            key = %accepted.key,
            last_sent,
            last_received,
            "session acquired"
        );
        self.events.push(GatewayEvent::LogonAccepted {
            connection_id,
            session_id,
            key: accepted.key,
            variant: accepted.variant,
        });
        self.sessions.push(handle);
    }

    fn poll_commands(&mut self) -> usize {
        let mut work = 0;
        while let Ok(command) = self.commands.try_recv() {
            work += 1;
            match command {
                GatewayCommand::RequestSession {
                    library_id,
                    connection_id,
                } => self.hand_over(library_id, connection_id),
                GatewayCommand::Release {
                    library_id,
                    snapshot,
                } => self.take_back(library_id, &snapshot),
                GatewayCommand::Disconnected {
                    library_id,
                    connection_id,
                    reason,
                } => {
                    if self
                        .library_sessions
                        .get(&connection_id)
                        .is_some_and(|binding| binding.library_id == library_id)
                    {
                        self.on_library_session_closed(connection_id, reason, false);
                    }
                }
                GatewayCommand::LibraryClosed { library_id } => self.close_library(library_id),
                GatewayCommand::Inbound {
                    library_id,
                    connection_id,
                    bytes,
                } => self.on_returned_inbound(library_id, connection_id, &bytes),
            }
        }
        work
    }

    fn hand_over(&mut self, library_id: u64, connection_id: ConnectionId) {
        let Some(index) = self
            .sessions
            .iter()
            .position(|handle| handle.connection_id() == connection_id)
        else {
            let error = if self.library_sessions.contains_key(&connection_id) {
                SessionError::NotOwned { connection_id }
            } else {
                SessionError::UnknownSession { connection_id }
            };
            self.send_to_library(
                library_id,
                LibraryCommand::RequestFailed {
                    connection_id,
                    error,
                },
            );
            return;
        };

        let Some(sender) = self.libraries.get(&library_id) else {
            warn!(library_id, %connection_id, "request from unknown library");
            return;
        };
        let snapshot = self.sessions.swap_remove(index).release();
        let handle = self.factory.acquire(&snapshot);
        let binding = LibrarySession {
            library_id,
            session_id: snapshot.session_id,
            key: snapshot.key.clone(),
            sent: handle.session().sent_reader(),
            received: handle.session().received_reader(),
        };
        if let Err(SendError(command)) = sender.send(LibraryCommand::Handover(handle)) {
            // Nobody to hand it to; keep it.
            if let LibraryCommand::Handover(handle) = command {
                self.sessions.push(handle);
            }
            self.close_library(library_id);
            return;
        }

        info!(library_id, %connection_id, session_id = %snapshot.session_id, "session handed over");
        self.library_sessions.insert(connection_id, binding);
        self.events.push(GatewayEvent::SessionHandedOver {
            connection_id,
            session_id: snapshot.session_id,
            library_id,
        });
    }

    fn take_back(&mut self, library_id: u64, snapshot: &SessionSnapshot) {
        let connection_id = snapshot.connection_id;
        match self.library_sessions.get(&connection_id) {
            Some(binding) if binding.library_id == library_id => {}
            _ => {
                warn!(library_id, %connection_id, "release of a session the library does not own");
                return;
            }
        }
        self.library_sessions.remove(&connection_id);
        let handle = self.factory.acquire(snapshot);
        info!(library_id, %connection_id, session_id = %snapshot.session_id, "session returned");
        self.events.push(GatewayEvent::SessionReturned {
            connection_id,
            session_id: snapshot.session_id,
            library_id,
        });
        self.sessions.push(handle);
    }

    fn on_returned_inbound(&mut self, library_id: u64, connection_id: ConnectionId, bytes: &[u8]) {
        if let Some(handle) = self.session_mut(connection_id) {
            if let Err(error) = handle.on_bytes(bytes) {
                warn!(%connection_id, %error, "dropping malformed message");
            }
            return;
        }
        match self.library_sessions.get(&connection_id) {
            Some(binding) if binding.library_id != library_id => {
                let owner = binding.library_id;
                let command = LibraryCommand::Inbound {
                    connection_id,
                    bytes: Bytes::copy_from_slice(bytes),
                };
                if !self.send_to_library(owner, command) {
                    self.close_library(owner);
                }
            }
            _ => debug!(library_id, %connection_id, "message for a closed session dropped"),
        }
    }

    fn close_library(&mut self, library_id: u64) {
        if self.libraries.remove(&library_id).is_none() {
            return;
        }
        info!(library_id, "library closed");
        let owned: Vec<ConnectionId> = self
            .library_sessions
            .iter()
            .filter(|(_, binding)| binding.library_id == library_id)
            .map(|(connection_id, _)| *connection_id)
            .collect();
        for connection_id in owned {
            self.framer.close(connection_id);
            self.on_library_session_closed(
                connection_id,
                DisconnectReason::ApplicationDisconnect,
                false,
            );
        }
    }

    fn on_connection_closed(&mut self, connection_id: ConnectionId, reason: DisconnectReason) {
        if let Some(handle) = self.session_mut(connection_id) {
            handle.session_mut().on_disconnect();
        } else if self.library_sessions.contains_key(&connection_id) {
            self.on_library_session_closed(connection_id, reason, true);
        }
    }

    fn on_library_session_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
        notify_library: bool,
    ) {
        let Some(binding) = self.library_sessions.remove(&connection_id) else {
            return;
        };
        if notify_library {
            self.send_to_library(
                binding.library_id,
                LibraryCommand::Disconnected {
                    connection_id,
                    reason,
                },
            );
        }
        self.contexts.on_disconnect(binding.session_id);
        info!(
            library_id = binding.library_id,
            %connection_id,
            session_id = %binding.session_id,
            %reason,
            "library session disconnected"
        );
        self.events.push(GatewayEvent::SessionDisconnected {
            connection_id,
            session_id: binding.session_id,
            reason,
        });
    }

    fn on_session_closed(&mut self, handle: &SessionHandle) {
        let session = handle.session();
        let connection_id = session.connection_id();
        let session_id = session.id();
        let reason = session
            .disconnect_reason()
            .unwrap_or(DisconnectReason::RemoteDisconnect);
        self.contexts.on_disconnect(session_id);
        info!(%connection_id, %session_id, %reason, "session disconnected");
        self.events.push(GatewayEvent::SessionDisconnected {
            connection_id,
            session_id,
            reason,
        });
    }

    fn reject_connection(&mut self, connection_id: ConnectionId, reason: DisconnectReason) {
        info!(%connection_id, %reason, "connection rejected");
        self.events.push(GatewayEvent::LogonRejected {
            connection_id,
            reason,
        });
    }

    fn send_to_library(&self, library_id: u64, command: LibraryCommand) -> bool {
        self.libraries
            .get(&library_id)
            .is_some_and(|sender| sender.send(command).is_ok())
    }

    fn session_mut(&mut self, connection_id: ConnectionId) -> Option<&mut SessionHandle> {
        self.sessions
            .iter_mut()
            .find(|handle| handle.connection_id() == connection_id)
    }
}

impl std::fmt::Debug for GatewaySessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySessions")
            .field("pending", &self.pending.len())
            .field("sessions", &self.sessions.len())
            .field("library_sessions", &self.library_sessions.len())
            .field("libraries", &self.libraries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use crate::channel::MemoryChannel;
    use crate::strategy::{FixedPersistence, PersistenceLevel};
    use fixgate_core::{ManualClock, Timestamp, tags};
    use fixgate_session::{OutboundHeader, OutboundMessage};
    use fixgate_store::{MemoryPublication, MemorySequenceIndex, MessageHeader, SequenceNumberIndex};

    const START_MS: u64 = 1_700_000_000_000;

    fn client_header(sender: &str) -> OutboundHeader {
        OutboundHeader {
            sender_comp_id: sender.to_string(),
            target_comp_id: "GATEWAY".to_string(),
            ..Default::default()
        }
    }

    fn logon_bytes(sender: &str, seq: u64, heart_bt_int: i64) -> Vec<u8> {
        OutboundMessage::new(MsgType::Logon)
            .with_field(tags::ENCRYPT_METHOD, 0)
            .with_field(tags::HEART_BT_INT, heart_bt_int)
            .encode(
                "FIX.4.4",
                &client_header(sender),
                seq,
                Timestamp::from_millis(START_MS),
                None,
            )
            .unwrap()
            .to_vec()
    }

    fn order_bytes(seq: u64) -> Vec<u8> {
        OutboundMessage::new(MsgType::Application("D".to_string()))
            .with_field(tags::TEXT, "order")
            .encode(
                "FIX.4.4",
                &client_header("CLIENT"),
                seq,
                Timestamp::from_millis(START_MS),
                None,
            )
            .unwrap()
            .to_vec()
    }

    fn order() -> OutboundMessage {
        OutboundMessage::new(MsgType::Application("8".to_string())).with_field(tags::TEXT, "fill")
    }

    fn gateway() -> GatewaySessions {
        GatewaySessions::new(
            EngineBuilder::new()
                .with_clock(Arc::new(ManualClock::new(START_MS)))
                .build()
                .unwrap(),
        )
    }

    /// Logs `CLIENT` on over connection 1 and returns its channel.
    fn logged_on(gateway: &mut GatewaySessions) -> MemoryChannel {
        let channel = MemoryChannel::new();
        gateway
            .authenticate(
                ConnectionId::new(1),
                &logon_bytes("CLIENT", 1, 30),
                Box::new(channel.clone()),
            )
            .unwrap();
        gateway.poll(START_MS);
        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::LogonAccepted { .. }]
        ));
        channel
    }

    #[test]
    fn test_logon_is_accepted_and_answered() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);

        let written = channel.written();
        let reply = Decoder::new(&written).decode().unwrap();
        assert_eq!(reply.msg_type(), &MsgType::Logon);
        assert_eq!(reply.get_uint(tags::MSG_SEQ_NUM).unwrap(), Some(1));
        assert_eq!(reply.get_str(tags::TARGET_COMP_ID).unwrap(), Some("CLIENT"));

        let sessions = gateway.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, SessionId::new(1));
        assert_eq!(sessions[0].state, Some(SessionState::Active));
        assert_eq!(sessions[0].owner, SessionOwnerKind::Gateway);
        assert_eq!(sessions[0].last_sent_msg_seq_num, 1);
        assert_eq!(sessions[0].last_received_msg_seq_num, 1);
        assert_eq!(gateway.pending_logons(), 0);
    }

    #[test]
    fn test_duplicate_logons_yield_one_session() {
        let mut gateway = gateway();
        let first = MemoryChannel::new();
        let second = MemoryChannel::new();
        gateway
            .authenticate(ConnectionId::new(1), &logon_bytes("CLIENT", 1, 30), Box::new(first))
            .unwrap();
        gateway
            .authenticate(
                ConnectionId::new(2),
                &logon_bytes("CLIENT", 1, 30),
                Box::new(second.clone()),
            )
            .unwrap();
        gateway.poll(START_MS);

        let events = gateway.drain_events();
        let accepted = events
            .iter()
            .filter(|event| matches!(event, GatewayEvent::LogonAccepted { .. }))
            .count();
        let duplicates = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    GatewayEvent::LogonRejected {
                        reason: DisconnectReason::DuplicateSession,
                        ..
                    }
                )
            })
            .count();
        assert_eq!((accepted, duplicates), (1, 1));
        assert_eq!(gateway.sessions().len(), 1);
    }

    #[test]
    fn test_negative_heartbeat_creates_no_session() {
        let mut gateway = gateway();
        let channel = MemoryChannel::new();
        gateway
            .authenticate(
                ConnectionId::new(1),
                &logon_bytes("CLIENT", 1, -1),
                Box::new(channel.clone()),
            )
            .unwrap();
        gateway.poll(START_MS);

        assert_eq!(
            gateway.drain_events(),
            vec![GatewayEvent::LogonRejected {
                connection_id: ConnectionId::new(1),
                reason: DisconnectReason::NegativeHeartbeatInterval,
            }]
        );
        assert!(gateway.sessions().is_empty());
        assert!(!gateway.contexts().is_active(SessionId::new(1)));
        assert!(channel.is_closed());

        let logout = channel.written();
        let logout = Decoder::new(&logout).decode().unwrap();
        assert_eq!(logout.msg_type(), &MsgType::Logout);
    }

    #[test]
    fn test_first_message_must_be_logon() {
        let mut gateway = gateway();
        let channel = MemoryChannel::new();
        gateway
            .authenticate(ConnectionId::new(1), &order_bytes(1), Box::new(channel.clone()))
            .unwrap();
        assert_eq!(
            gateway.drain_events(),
            vec![GatewayEvent::LogonRejected {
                connection_id: ConnectionId::new(1),
                reason: DisconnectReason::FirstMessageNotLogon,
            }]
        );
        assert!(channel.is_closed());
        assert_eq!(gateway.pending_logons(), 0);
    }

    #[test]
    fn test_unframed_logon_is_an_error() {
        let mut gateway = gateway();
        let channel = MemoryChannel::new();
        let result = gateway.authenticate(ConnectionId::new(1), b"8=FIX", Box::new(channel.clone()));
        assert!(matches!(result, Err(FixError::Decode(_))));
        assert!(channel.is_closed());
    }

    #[test]
    fn test_messages_are_routed_and_archived() {
        let inbound = Arc::new(MemoryPublication::new());
        let mut gateway = GatewaySessions::new(
            EngineBuilder::new()
                .with_clock(Arc::new(ManualClock::new(START_MS)))
                .with_publications(
                    Arc::new(MemoryPublication::new()),
                    Arc::clone(&inbound) as Arc<dyn Publication>,
                )
                .build()
                .unwrap(),
        );
        logged_on(&mut gateway);

        gateway
            .on_message(ConnectionId::new(1), &order_bytes(2))
            .unwrap();
        assert_eq!(gateway.sessions()[0].last_received_msg_seq_num, 2);
        let archived: Vec<u64> = inbound
            .messages()
            .iter()
            .map(|(header, _)| header.msg_seq_num)
            .collect();
        assert_eq!(archived, vec![1, 2]);

        let unknown = gateway.on_message(ConnectionId::new(9), &order_bytes(3));
        assert!(matches!(
            unknown,
            Err(FixError::Session(SessionError::UnknownSession { .. }))
        ));
    }

    #[test]
    fn test_force_disconnect_frees_the_key() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);

        gateway
            .force_disconnect(ConnectionId::new(1), DisconnectReason::ApplicationDisconnect)
            .unwrap();
        gateway.poll(START_MS);

        assert_eq!(
            gateway.drain_events(),
            vec![GatewayEvent::SessionDisconnected {
                connection_id: ConnectionId::new(1),
                session_id: SessionId::new(1),
                reason: DisconnectReason::ApplicationDisconnect,
            }]
        );
        assert!(channel.is_closed());
        assert!(gateway.sessions().is_empty());
        assert!(!gateway.contexts().is_active(SessionId::new(1)));

        gateway
            .authenticate(
                ConnectionId::new(2),
                &logon_bytes("CLIENT", 1, 30),
                Box::new(MemoryChannel::new()),
            )
            .unwrap();
        gateway.poll(START_MS);
        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::LogonAccepted {
                session_id,
                ..
            }] if *session_id == SessionId::new(1)
        ));
    }

    #[test]
    fn test_remote_disconnect_ends_session() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);

        gateway.on_disconnect(ConnectionId::new(1)).unwrap();
        gateway.poll(START_MS);
        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::SessionDisconnected {
                reason: DisconnectReason::RemoteDisconnect,
                ..
            }]
        ));
        assert!(channel.is_closed());
        assert_eq!(
            gateway.on_disconnect(ConnectionId::new(1)).unwrap_err(),
            SessionError::UnknownSession {
                connection_id: ConnectionId::new(1)
            }
        );
    }

    #[test]
    fn test_hand_over_and_return() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);
        let mut library = gateway.new_library();
        let connection_id = ConnectionId::new(1);

        library.request_session(connection_id).unwrap();
        gateway.poll(START_MS);
        library.poll(START_MS);
        assert_eq!(
            library.session(connection_id).map(|session| session.state()),
            Some(SessionState::Active)
        );
        assert_eq!(
            gateway.sessions()[0].owner,
            SessionOwnerKind::Library(library.library_id())
        );
        assert_eq!(
            gateway.force_disconnect(connection_id, DisconnectReason::ApplicationDisconnect),
            Err(SessionError::NotOwned { connection_id })
        );

        // Inbound bytes follow the session to its owner.
        gateway.on_message(connection_id, &order_bytes(2)).unwrap();
        library.poll(START_MS);
        channel.take_written();
        library.send(connection_id, &order()).unwrap();
        gateway.poll(START_MS);
        let written = channel.written();
        let sent = Decoder::new(&written).decode().unwrap();
        assert_eq!(sent.get_uint(tags::MSG_SEQ_NUM).unwrap(), Some(2));
        assert_eq!(gateway.sessions()[0].last_sent_msg_seq_num, 2);
        assert_eq!(gateway.sessions()[0].last_received_msg_seq_num, 2);

        library.release_to_gateway(connection_id).unwrap();
        assert!(library.is_empty());
        gateway.poll(START_MS);

        let events = gateway.drain_events();
        assert!(matches!(
            events.as_slice(),
            [
                GatewayEvent::SessionHandedOver { .. },
                GatewayEvent::SessionReturned { .. }
            ]
        ));
        let sessions = gateway.sessions();
        assert_eq!(sessions[0].owner, SessionOwnerKind::Gateway);
        assert_eq!(sessions[0].state, Some(SessionState::Active));
        assert_eq!(sessions[0].last_sent_msg_seq_num, 2);
        assert_eq!(sessions[0].last_received_msg_seq_num, 2);
    }

    #[test]
    fn test_request_for_unknown_session_fails() {
        let mut gateway = gateway();
        let mut library = gateway.new_library();
        library.request_session(ConnectionId::new(5)).unwrap();
        gateway.poll(START_MS);
        library.poll(START_MS);
        assert_eq!(
            library.take_failures(),
            vec![(
                ConnectionId::new(5),
                SessionError::UnknownSession {
                    connection_id: ConnectionId::new(5)
                }
            )]
        );
    }

    #[test]
    fn test_library_logout_frees_the_key() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);
        let mut library = gateway.new_library();
        let connection_id = ConnectionId::new(1);
        library.request_session(connection_id).unwrap();
        gateway.poll(START_MS);
        library.poll(START_MS);
        gateway.drain_events();

        if let Some(session) = library.session_mut(connection_id) {
            session.logout_and_disconnect(DisconnectReason::ApplicationDisconnect);
        }
        library.poll(START_MS);
        assert!(library.is_empty());
        gateway.poll(START_MS);

        assert_eq!(
            gateway.drain_events(),
            vec![GatewayEvent::SessionDisconnected {
                connection_id,
                session_id: SessionId::new(1),
                reason: DisconnectReason::ApplicationDisconnect,
            }]
        );
        assert!(channel.is_closed());
        assert!(!gateway.contexts().is_active(SessionId::new(1)));
    }

    #[test]
    fn test_dropped_library_closes_its_sessions() {
        let mut gateway = gateway();
        let channel = logged_on(&mut gateway);
        let mut library = gateway.new_library();
        library.request_session(ConnectionId::new(1)).unwrap();
        gateway.poll(START_MS);
        library.poll(START_MS);
        gateway.drain_events();

        drop(library);
        gateway.poll(START_MS);
        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::SessionDisconnected {
                reason: DisconnectReason::ApplicationDisconnect,
                ..
            }]
        ));
        assert!(channel.is_closed());
        assert!(gateway.sessions().is_empty());
    }

    /// Gateway whose indexes know `CLIENT` sent up to 7 and was sent up to 5.
    fn indexed_gateway() -> GatewaySessions {
        let outbound = Arc::new(MemoryPublication::new());
        let inbound = Arc::new(MemoryPublication::new());
        let sent_index = Arc::new(MemorySequenceIndex::new());
        let received_index = Arc::new(MemorySequenceIndex::new());
        for (publication, seq) in [(&outbound, 5), (&inbound, 7)] {
            publication
                .save_message(
                    b"8=FIX.4.4",
                    &MessageHeader {
                        connection_id: ConnectionId::new(9),
                        session_id: SessionId::new(1),
                        msg_type: MsgType::Heartbeat,
                        msg_seq_num: seq,
                    },
                )
                .unwrap();
        }
        sent_index.catch_up(&outbound);
        received_index.catch_up(&inbound);

        GatewaySessions::new(
            EngineBuilder::new()
                .with_clock(Arc::new(ManualClock::new(START_MS)))
                .with_persistence(Arc::new(FixedPersistence(PersistenceLevel::IndexedPersistent)))
                .with_publications(
                    Arc::clone(&outbound) as Arc<dyn Publication>,
                    Arc::clone(&inbound) as Arc<dyn Publication>,
                )
                .with_indexes(
                    Arc::clone(&sent_index) as Arc<dyn SequenceNumberIndex>,
                    Arc::clone(&received_index) as Arc<dyn SequenceNumberIndex>,
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_resumed_logon_restores_sequence_numbers() {
        let mut gateway = indexed_gateway();
        gateway
            .authenticate(
                ConnectionId::new(1),
                &logon_bytes("CLIENT", 8, 30),
                Box::new(MemoryChannel::new()),
            )
            .unwrap();
        gateway.poll(START_MS);

        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::LogonAccepted { .. }]
        ));
        let sessions = gateway.sessions();
        assert_eq!(sessions[0].last_sent_msg_seq_num, 6);
        assert_eq!(sessions[0].last_received_msg_seq_num, 8);
    }

    #[test]
    fn test_offline_sequence_reset_applies_to_next_logon() {
        let mut gateway = indexed_gateway();
        gateway
            .authenticate(
                ConnectionId::new(1),
                &logon_bytes("CLIENT", 8, 30),
                Box::new(MemoryChannel::new()),
            )
            .unwrap();
        gateway.poll(START_MS);
        gateway.drain_events();
        let key = gateway.sessions()[0].key.clone().unwrap();

        assert!(matches!(
            gateway.reset_sequence_numbers(&key),
            Err(SessionError::InvalidState { .. })
        ));
        let context = gateway.session_context(&key).unwrap();
        assert_eq!(context.session_id, SessionId::new(1));
        assert_eq!(context.last_sequence_reset_time, None);

        gateway.on_disconnect(ConnectionId::new(1)).unwrap();
        gateway.poll(START_MS);
        gateway.drain_events();
        let context = gateway.reset_sequence_numbers(&key).unwrap();
        assert_eq!(
            context.last_sequence_reset_time,
            Some(Timestamp::from_millis(START_MS))
        );
        assert_eq!(gateway.session_context(&key), Some(context));

        // Without the reset the indexes would expect MsgSeqNum 8.
        gateway
            .authenticate(
                ConnectionId::new(2),
                &logon_bytes("CLIENT", 1, 30),
                Box::new(MemoryChannel::new()),
            )
            .unwrap();
        gateway.poll(START_MS);
        assert!(matches!(
            gateway.drain_events().as_slice(),
            [GatewayEvent::LogonAccepted { .. }]
        ));
        let sessions = gateway.sessions();
        assert_eq!(sessions[0].last_sent_msg_seq_num, 1);
        assert_eq!(sessions[0].last_received_msg_seq_num, 1);
    }

    #[test]
    fn test_inbound_during_release_reaches_the_gateway() {
        let mut gateway = gateway();
        let _channel = logged_on(&mut gateway);
        let mut library = gateway.new_library();
        let connection_id = ConnectionId::new(1);
        library.request_session(connection_id).unwrap();
        gateway.poll(START_MS);
        library.poll(START_MS);

        // The gateway still routes to the worker until it sees the release.
        library.release_to_gateway(connection_id).unwrap();
        gateway.on_message(connection_id, &order_bytes(2)).unwrap();
        library.poll(START_MS);
        gateway.poll(START_MS);

        let sessions = gateway.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].owner, SessionOwnerKind::Gateway);
        assert_eq!(sessions[0].state, Some(SessionState::Active));
        assert_eq!(sessions[0].last_received_msg_seq_num, 2);
    }

    #[test]
    fn test_disconnect_keeps_polling_remaining_sessions() {
        let mut gateway = gateway();
        let channels: Vec<MemoryChannel> = ["A", "B", "C"]
            .into_iter()
            .zip(1..)
            .map(|(sender, connection)| {
                let channel = MemoryChannel::new();
                gateway
                    .authenticate(
                        ConnectionId::new(connection),
                        &logon_bytes(sender, 1, 30),
                        Box::new(channel.clone()),
                    )
                    .unwrap();
                channel
            })
            .collect();
        gateway.poll(START_MS);
        assert_eq!(gateway.drain_events().len(), 3);
        assert_eq!(gateway.sessions().len(), 3);
        for channel in &channels {
            channel.take_written();
        }

        // The first slot empties, so the last session moves into it.
        gateway.on_disconnect(ConnectionId::new(1)).unwrap();
        gateway.poll(START_MS + 24_000);

        let events = gateway.drain_events();
        assert_eq!(
            events,
            vec![GatewayEvent::SessionDisconnected {
                connection_id: ConnectionId::new(1),
                session_id: SessionId::new(1),
                reason: DisconnectReason::RemoteDisconnect,
            }]
        );
        assert!(channels[0].take_written().is_empty());
        for channel in &channels[1..] {
            let written = channel.take_written();
            let heartbeat = Decoder::new(&written).decode().unwrap();
            assert_eq!(heartbeat.msg_type(), &MsgType::Heartbeat);
            assert_eq!(heartbeat.get_uint(tags::MSG_SEQ_NUM).unwrap(), Some(2));
        }
        let mut remaining: Vec<ConnectionId> = gateway
            .sessions()
            .iter()
            .map(|info| info.connection_id)
            .collect();
        remaining.sort_by_key(|id| id.value());
        assert_eq!(remaining, vec![ConnectionId::new(2), ConnectionId::new(3)]);
    }
}

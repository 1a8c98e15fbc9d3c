/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Worker-side session ownership.
//!
//! A [`SessionOwner`] takes sessions over from the gateway, polls them on
//! its own thread and hands them back. Sessions move as owned
//! [`SessionHandle`]s (gateway to worker) or [`SessionSnapshot`]s (worker
//! to gateway) over `crossbeam-channel`; a session is never reachable from
//! both sides at once.

use crate::handle::SessionHandle;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use fixgate_core::{ConnectionId, DisconnectReason, SessionError};
use fixgate_session::{OutboundMessage, Session, SessionSnapshot};
use tracing::{debug, info, warn};

/// Gateway to worker.
#[derive(Debug)]
pub(crate) enum LibraryCommand {
    /// A session now owned by the worker.
    Handover(SessionHandle),
    /// Bytes received for a worker-owned session.
    Inbound {
        connection_id: ConnectionId,
        bytes: Bytes,
    },
    /// The transport of a worker-owned session closed.
    Disconnected {
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
    /// A `request_session` could not be served.
    RequestFailed {
        connection_id: ConnectionId,
        error: SessionError,
    },
}

/// Worker to gateway.
#[derive(Debug)]
pub(crate) enum GatewayCommand {
    RequestSession {
        library_id: u64,
        connection_id: ConnectionId,
    },
    Release {
        library_id: u64,
        snapshot: SessionSnapshot,
    },
    Disconnected {
        library_id: u64,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
    LibraryClosed {
        library_id: u64,
    },
    /// Bytes that reached the worker after it released the session.
    Inbound {
        library_id: u64,
        connection_id: ConnectionId,
        bytes: Bytes,
    },
}

/// Owns and polls sessions handed over by the gateway.
pub struct SessionOwner {
    library_id: u64,
    commands: Receiver<LibraryCommand>,
    gateway: Sender<GatewayCommand>,
    sessions: Vec<SessionHandle>,
    failures: Vec<(ConnectionId, SessionError)>,
}

impl SessionOwner {
    pub(crate) fn new(
        library_id: u64,
        commands: Receiver<LibraryCommand>,
        gateway: Sender<GatewayCommand>,
    ) -> Self {
        Self {
            library_id,
            commands,
            gateway,
            sessions: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Id assigned by the gateway.
    #[must_use]
    pub const fn library_id(&self) -> u64 {
        self.library_id
    }

    /// Asks the gateway for the session on `connection_id`.
    ///
    /// The session arrives on a later [`poll`](Self::poll); a refusal shows
    /// up in [`take_failures`](Self::take_failures).
    ///
    /// # Errors
    /// Returns `SessionError::ChannelClosed` if the gateway is gone.
    pub fn request_session(&self, connection_id: ConnectionId) -> Result<(), SessionError> {
        self.notify(GatewayCommand::RequestSession {
            library_id: self.library_id,
            connection_id,
        })
    }

    /// Hands the session on `connection_id` back to the gateway.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` if this worker does not own
    /// the session and `SessionError::ChannelClosed` if the gateway is gone.
    pub fn release_to_gateway(&mut self, connection_id: ConnectionId) -> Result<(), SessionError> {
        let index = self
            .position(connection_id)
            .ok_or(SessionError::UnknownSession { connection_id })?;
        let snapshot = self.sessions.swap_remove(index).release();
        info!(
            library_id = self.library_id,
            %connection_id,
            session_id = %snapshot.session_id,
            "session released to gateway"
        );
        self.notify(GatewayCommand::Release {
            library_id: self.library_id,
            snapshot,
        })
    }

    /// Applies gateway commands, then polls every owned session.
    ///
    /// Sessions that disconnect are dropped and reported to the gateway.
    ///
    /// # Returns
    /// The amount of work done.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        let mut work = 0;
        while let Ok(command) = self.commands.try_recv() {
            work += 1;
            self.on_command(command);
        }

        let mut index = 0;
        while index < self.sessions.len() {
            work += self.sessions[index].poll(now_ms);
            if self.sessions[index].session().state().is_terminal() {
                let handle = self.sessions.swap_remove(index);
                self.on_session_closed(&handle);
            } else {
                index += 1;
            }
        }
        work
    }

    /// Sends an application message on `connection_id`.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` if this worker does not own the
    /// session, otherwise see [`Session::send`].
    pub fn send(
        &mut self,
        connection_id: ConnectionId,
        message: &OutboundMessage,
    ) -> Result<u64, SessionError> {
        self.sessions
            .iter_mut()
            .find(|handle| handle.connection_id() == connection_id)
            .ok_or(SessionError::UnknownSession { connection_id })?
            .send(message)
    }

    /// The owned session on `connection_id`.
    #[must_use]
    pub fn session(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|handle| handle.connection_id() == connection_id)
            .map(SessionHandle::session)
    }

    /// The owned session on `connection_id`, mutably.
    pub fn session_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|handle| handle.connection_id() == connection_id)
            .map(SessionHandle::session_mut)
    }

    /// Connections of every owned session.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(SessionHandle::connection_id).collect()
    }

    /// Number of owned sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Requests the gateway refused since the last call.
    pub fn take_failures(&mut self) -> Vec<(ConnectionId, SessionError)> {
        std::mem::take(&mut self.failures)
    }

    fn on_command(&mut self, command: LibraryCommand) {
        match command {
            LibraryCommand::Handover(handle) => {
                info!(
                    library_id = self.library_id,
                    connection_id = %handle.connection_id(),
                    session_id = %handle.session().id(),
                    "session acquired"
                );
                self.sessions.push(handle);
            }
            LibraryCommand::Inbound {
                connection_id,
                bytes,
            } => match self.position(connection_id) {
                Some(index) => {
                    if let Err(error) = self.sessions[index].on_bytes(&bytes) {
                        warn!(%connection_id, %error, "dropping malformed message");
                    }
                }
                None => {
                    // Released sessions already sit behind a Release on the
                    // gateway queue, so the bytes land after it.
                    debug!(%connection_id, "returning message for a session no longer owned");
                    if self
                        .notify(GatewayCommand::Inbound {
                            library_id: self.library_id,
                            connection_id,
                            bytes,
                        })
                        .is_err()
                    {
                        warn!(%connection_id, "gateway gone, message dropped");
                    }
                }
            },
            LibraryCommand::Disconnected {
                connection_id,
                reason,
            } => {
                if let Some(index) = self.position(connection_id) {
                    debug!(%connection_id, %reason, "transport closed");
                    self.sessions[index].session_mut().on_disconnect();
                }
            }
            LibraryCommand::RequestFailed {
                connection_id,
                error,
            } => {
                warn!(library_id = self.library_id, %connection_id, %error, "session request refused");
                self.failures.push((connection_id, error));
            }
        }
    }

    fn on_session_closed(&self, handle: &SessionHandle) {
        let session = handle.session();
        let reason = session
            .disconnect_reason()
            .unwrap_or(DisconnectReason::RemoteDisconnect);
        info!(
            library_id = self.library_id,
            connection_id = %session.connection_id(),
            session_id = %session.id(),
            %reason,
            "session closed"
        );
        // The gateway also learns about it from the transport.
        let _ = self.notify(GatewayCommand::Disconnected {
            library_id: self.library_id,
            connection_id: session.connection_id(),
            reason,
        });
    }

    fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.sessions
            .iter()
            .position(|handle| handle.connection_id() == connection_id)
    }

    fn notify(&self, command: GatewayCommand) -> Result<(), SessionError> {
        self.gateway
            .send(command)
            .map_err(|_| SessionError::ChannelClosed)
    }
}

impl Drop for SessionOwner {
    fn drop(&mut self) {
        if self
            .gateway
            .send(GatewayCommand::LibraryClosed {
                library_id: self.library_id,
            })
            .is_err()
        {
            debug!(library_id = self.library_id, "gateway gone before library");
        }
    }
}

impl std::fmt::Debug for SessionOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOwner")
            .field("library_id", &self.library_id)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

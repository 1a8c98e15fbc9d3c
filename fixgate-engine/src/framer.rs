/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Outbound framing.
//!
//! Sessions publish through [`OutboundFrames`], which archives every record
//! and forwards frames and disconnect requests over a channel to the
//! [`Framer`]. The framer owns the transport channels of logged on sessions
//! and writes to them on the gateway thread, buffering whatever a
//! non-blocking channel could not take.

use crate::channel::TransportChannel;
use bytes::{Buf, Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender, unbounded};
use fixgate_core::{ConnectionId, DisconnectReason, SessionId, StoreError};
use fixgate_store::{MessageHeader, Publication};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug)]
enum FramerCommand {
    Frame {
        connection_id: ConnectionId,
        bytes: Bytes,
    },
    Disconnect {
        connection_id: ConnectionId,
        reason: DisconnectReason,
    },
}

/// Creates a connected publication and framer pair.
#[must_use]
pub fn outbound_frames(archive: Arc<dyn Publication>) -> (OutboundFrames, Framer) {
    let (sender, receiver) = unbounded();
    (
        OutboundFrames { archive, sender },
        Framer {
            commands: receiver,
            connections: HashMap::new(),
            closed: Vec::new(),
        },
    )
}

/// [`Publication`] that archives records and forwards them to a [`Framer`].
#[derive(Clone)]
pub struct OutboundFrames {
    archive: Arc<dyn Publication>,
    sender: Sender<FramerCommand>,
}

impl OutboundFrames {
    fn forward(&self, command: FramerCommand) -> Result<(), StoreError> {
        self.sender.send(command).map_err(|_| StoreError::Closed)
    }
}

impl std::fmt::Debug for OutboundFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundFrames")
            .field("position", &self.archive.position())
            .finish_non_exhaustive()
    }
}

impl Publication for OutboundFrames {
    fn save_message(&self, bytes: &[u8], header: &MessageHeader) -> Result<u64, StoreError> {
        let position = self.archive.save_message(bytes, header)?;
        self.forward(FramerCommand::Frame {
            connection_id: header.connection_id,
            bytes: Bytes::copy_from_slice(bytes),
        })?;
        Ok(position)
    }

    fn save_logon(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<u64, StoreError> {
        self.archive.save_logon(connection_id, session_id)
    }

    fn save_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<u64, StoreError> {
        let position = self.archive.save_disconnect(connection_id, reason)?;
        self.forward(FramerCommand::Disconnect {
            connection_id,
            reason,
        })?;
        Ok(position)
    }

    fn position(&self) -> u64 {
        self.archive.position()
    }
}

struct Connection {
    channel: Box<dyn TransportChannel>,
    pending: BytesMut,
    closing: Option<DisconnectReason>,
}

impl Connection {
    /// Writes as much pending data as the channel takes.
    fn flush(&mut self, connection_id: ConnectionId) -> usize {
        let mut written = 0;
        while !self.pending.is_empty() {
            match self.channel.write(&self.pending) {
                Ok(0) => break,
                Ok(length) => {
                    self.pending.advance(length);
                    written += length;
                }
                Err(error) => {
                    warn!(%connection_id, %error, "write failed, closing connection");
                    self.pending.clear();
                    self.closing
                        .get_or_insert(DisconnectReason::RemoteDisconnect);
                    break;
                }
            }
        }
        written
    }
}

/// Writes outbound frames to transport channels.
pub struct Framer {
    commands: Receiver<FramerCommand>,
    connections: HashMap<ConnectionId, Connection>,
    closed: Vec<(ConnectionId, DisconnectReason)>,
}

impl Framer {
    /// Starts writing frames for `connection_id` to `channel`.
    pub fn register(&mut self, connection_id: ConnectionId, channel: Box<dyn TransportChannel>) {
        debug!(%connection_id, "channel registered");
        self.connections.insert(
            connection_id,
            Connection {
                channel,
                pending: BytesMut::new(),
                closing: None,
            },
        );
    }

    /// Closes `connection_id` immediately, dropping unwritten frames.
    pub fn close(&mut self, connection_id: ConnectionId) {
        if let Some(mut connection) = self.connections.remove(&connection_id) {
            connection.channel.close();
        }
    }

    /// Returns true if `connection_id` has a registered channel.
    #[must_use]
    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Drains queued commands and writes pending frames.
    ///
    /// # Returns
    /// The number of commands processed plus the number of connections that
    /// made progress.
    pub fn poll(&mut self) -> usize {
        let mut work = 0;
        while let Ok(command) = self.commands.try_recv() {
            work += 1;
            match command {
                FramerCommand::Frame {
                    connection_id,
                    bytes,
                } => match self.connections.get_mut(&connection_id) {
                    Some(connection) if connection.closing.is_none() => {
                        connection.pending.extend_from_slice(&bytes);
                    }
                    _ => trace!(%connection_id, "frame for closed connection dropped"),
                },
                FramerCommand::Disconnect {
                    connection_id,
                    reason,
                } => {
                    if let Some(connection) = self.connections.get_mut(&connection_id) {
                        connection.closing.get_or_insert(reason);
                    }
                }
            }
        }

        let mut finished = Vec::new();
        for (connection_id, connection) in &mut self.connections {
            if connection.flush(*connection_id) > 0 {
                work += 1;
            }
            if let Some(reason) = connection.closing
                && connection.pending.is_empty()
            {
                finished.push((*connection_id, reason));
            }
        }
        for (connection_id, reason) in finished {
            self.close(connection_id);
            debug!(%connection_id, %reason, "connection closed");
            self.closed.push((connection_id, reason));
        }
        work
    }

    /// Connections closed since the last call, with the reason.
    pub fn take_closed(&mut self) -> Vec<(ConnectionId, DisconnectReason)> {
        std::mem::take(&mut self.closed)
    }
}

impl std::fmt::Debug for Framer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

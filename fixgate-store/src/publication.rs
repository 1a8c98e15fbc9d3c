/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Publication trait definition.
//!
//! A publication is the append-only stream the engine writes to for one
//! direction of traffic. Positions only ever grow, which lets an index
//! report how far it has caught up.

use bytes::Bytes;
use fixgate_core::{ConnectionId, DisconnectReason, MsgType, SessionId, StoreError};

/// Metadata stored alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Connection the message travelled on.
    pub connection_id: ConnectionId,
    /// Durable session id, or [`SessionId::UNKNOWN`] before logon.
    pub session_id: SessionId,
    /// MsgType (tag 35).
    pub msg_type: MsgType,
    /// MsgSeqNum (tag 34), zero when absent.
    pub msg_seq_num: u64,
}

/// One entry in a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// An encoded message.
    Message {
        /// Message metadata.
        header: MessageHeader,
        /// Complete framed bytes.
        bytes: Bytes,
    },
    /// A session completed logon on a connection.
    Logon {
        /// Connection that logged on.
        connection_id: ConnectionId,
        /// Session bound to it.
        session_id: SessionId,
    },
    /// A connection was torn down.
    Disconnect {
        /// Connection that went away.
        connection_id: ConnectionId,
        /// Why it went away.
        reason: DisconnectReason,
    },
}

/// Append-only stream of session traffic.
///
/// Every `save_*` call returns the position just past the new record.
pub trait Publication: Send + Sync {
    /// Appends an encoded message.
    ///
    /// # Errors
    /// Returns `StoreError` if the record cannot be appended.
    fn save_message(&self, bytes: &[u8], header: &MessageHeader) -> Result<u64, StoreError>;

    /// Records that a session logged on over a connection.
    ///
    /// # Errors
    /// Returns `StoreError` if the record cannot be appended.
    fn save_logon(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<u64, StoreError>;

    /// Records that a connection was torn down.
    ///
    /// # Errors
    /// Returns `StoreError` if the record cannot be appended.
    fn save_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<u64, StoreError>;

    /// Position just past the last appended record.
    fn position(&self) -> u64;
}

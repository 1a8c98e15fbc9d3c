/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Error types for the fixgate session engine.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across decoding, encoding, session and store
//! operations.

use crate::types::ConnectionId;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixgate operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in publication or index operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while decoding an inbound message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete.
    #[error("incomplete message")]
    Incomplete,

    /// The message does not start with BeginString (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength disagrees with the bytes on the wire.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Tag is not a positive integer.
    #[error("invalid tag format: {0}")]
    InvalidTag(String),

    /// A field required by the message type is absent.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// A field value could not be interpreted.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

impl DecodeError {
    /// Returns the tag the error refers to, if any.
    #[must_use]
    pub const fn tag(&self) -> Option<u32> {
        match self {
            Self::MissingRequiredField { tag } | Self::InvalidFieldValue { tag, .. } => Some(*tag),
            Self::MissingBodyLength | Self::InvalidBodyLength => Some(9),
            Self::MissingMsgType => Some(35),
            Self::InvalidBeginString => Some(8),
            Self::ChecksumMismatch { .. } => Some(10),
            Self::Incomplete | Self::InvalidTag(_) => None,
        }
    }
}

/// Errors that occur while encoding an outbound message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A header field could not be filled in.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// A value cannot be put on the wire (e.g. it embeds the SOH delimiter).
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Errors in session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// No live or pending session is bound to the connection.
    #[error("unknown session for connection {connection_id}")]
    UnknownSession {
        /// The connection that was looked up.
        connection_id: ConnectionId,
    },

    /// The session exists but is owned by someone else.
    #[error("session for connection {connection_id} is not owned by the caller")]
    NotOwned {
        /// The connection that was looked up.
        connection_id: ConnectionId,
    },

    /// A reject was requested with a negative linger timeout.
    #[error("linger timeout should not be negative ({linger_timeout_ms})")]
    NegativeLingerTimeout {
        /// The rejected linger value in milliseconds.
        linger_timeout_ms: i64,
    },

    /// The logon header does not identify both counterparties.
    #[error("logon is missing a comp id")]
    MissingCompId,

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The counterpart of a hand-off channel has gone away.
    #[error("ownership channel closed")]
    ChannelClosed,

    /// An outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// An outbound message could not be published.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by publications and sequence number indexes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The publication refused the record.
    #[error("failed to publish message: {reason}")]
    PublicationFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The publication has been closed.
    #[error("publication closed")]
    Closed,

    /// I/O error in a persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_decode_error_tag() {
        assert_eq!(DecodeError::MissingRequiredField { tag: 112 }.tag(), Some(112));
        assert_eq!(DecodeError::MissingMsgType.tag(), Some(35));
        assert_eq!(DecodeError::Incomplete.tag(), None);
    }

    #[test]
    fn test_fix_error_from_session() {
        let fix_err: FixError = SessionError::MissingCompId.into();
        assert!(matches!(fix_err, FixError::Session(SessionError::MissingCompId)));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::UnknownSession {
            connection_id: ConnectionId::new(42),
        };
        assert_eq!(err.to_string(), "unknown session for connection 42");

        let err = SessionError::NegativeLingerTimeout {
            linger_timeout_ms: -1,
        };
        assert_eq!(err.to_string(), "linger timeout should not be negative (-1)");
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Disconnect and reject reasons.
//!
//! Both sets are closed so hosts can match on them for structured logging
//! and alerting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a connection or pending logon was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The authenticator rejected the logon or faulted.
    FailedAuthentication,
    /// No authentication verdict arrived in time.
    AuthenticationTimeout,
    /// The logon header did not carry usable comp ids.
    MissingLogonCompId,
    /// Another live session already holds the composite key.
    DuplicateSession,
    /// Indexed persistence was requested while message logging is off.
    InvalidConfigurationNotLoggingMessages,
    /// The peer closed the transport.
    RemoteDisconnect,
    /// Orderly logout exchange completed.
    Logout,
    /// Inbound sequence number below the expected one without PossDup.
    MsgSeqNumTooLow,
    /// Inbound message without MsgSeqNum.
    MissingMsgSeqNum,
    /// Inbound MsgSeqNum space ran out.
    MsgSeqNumExhausted,
    /// BeginString did not match the session's protocol version.
    InvalidBeginString,
    /// Logon carried a negative HeartBtInt.
    NegativeHeartbeatInterval,
    /// Logon SendingTime outside the accepted window.
    InvalidSendingTime,
    /// First message on the connection was not a logon.
    FirstMessageNotLogon,
    /// Peer failed to answer a test request in time.
    HeartbeatTimeout,
    /// Disconnect requested by the host or the owning worker.
    ApplicationDisconnect,
    /// Comp ids on an inbound message did not match the session.
    CompIdProblem,
    /// The logon exchange did not complete in time.
    LogonTimeout,
    /// A session-level message could not be decoded.
    InvalidMessage,
}

impl DisconnectReason {
    /// Returns a stable, log-friendly name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailedAuthentication => "FAILED_AUTHENTICATION",
            Self::AuthenticationTimeout => "AUTHENTICATION_TIMEOUT",
            Self::MissingLogonCompId => "MISSING_LOGON_COMP_ID",
            Self::DuplicateSession => "DUPLICATE_SESSION",
            Self::InvalidConfigurationNotLoggingMessages => {
                "INVALID_CONFIGURATION_NOT_LOGGING_MESSAGES"
            }
            Self::RemoteDisconnect => "REMOTE_DISCONNECT",
            Self::Logout => "LOGOUT",
            Self::MsgSeqNumTooLow => "MSG_SEQ_NUM_TOO_LOW",
            Self::MissingMsgSeqNum => "MISSING_MSG_SEQ_NUM",
            Self::MsgSeqNumExhausted => "MSG_SEQ_NUM_EXHAUSTED",
            Self::InvalidBeginString => "INVALID_BEGIN_STRING",
            Self::NegativeHeartbeatInterval => "NEGATIVE_HEARTBEAT_INTERVAL",
            Self::InvalidSendingTime => "INVALID_SENDING_TIME",
            Self::FirstMessageNotLogon => "FIRST_MESSAGE_NOT_LOGON",
            Self::HeartbeatTimeout => "HEARTBEAT_TIMEOUT",
            Self::ApplicationDisconnect => "APPLICATION_DISCONNECT",
            Self::CompIdProblem => "COMP_ID_PROBLEM",
            Self::LogonTimeout => "LOGON_TIMEOUT",
            Self::InvalidMessage => "INVALID_MESSAGE",
        }
    }

    /// Returns true for reasons raised by the authentication handshake.
    #[must_use]
    pub const fn is_authentication_failure(self) -> bool {
        matches!(
            self,
            Self::FailedAuthentication
                | Self::AuthenticationTimeout
                | Self::MissingLogonCompId
                | Self::DuplicateSession
                | Self::InvalidConfigurationNotLoggingMessages
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SessionRejectReason (tag 373) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionRejectReason {
    /// 0 - Invalid tag number.
    InvalidTagNumber = 0,
    /// 1 - Required tag missing.
    RequiredTagMissing = 1,
    /// 2 - Tag not defined for this message type.
    TagNotDefinedForMessageType = 2,
    /// 3 - Undefined tag.
    UndefinedTag = 3,
    /// 4 - Tag specified without a value.
    TagSpecifiedWithoutValue = 4,
    /// 5 - Value is incorrect (out of range) for this tag.
    ValueIsIncorrect = 5,
    /// 6 - Incorrect data format for value.
    IncorrectDataFormat = 6,
    /// 7 - Decryption problem.
    DecryptionProblem = 7,
    /// 8 - Signature problem.
    SignatureProblem = 8,
    /// 9 - CompID problem.
    CompIdProblem = 9,
    /// 10 - SendingTime accuracy problem.
    SendingTimeAccuracyProblem = 10,
    /// 11 - Invalid MsgType.
    InvalidMsgType = 11,
}

impl SessionRejectReason {
    /// Returns the numeric wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SessionRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

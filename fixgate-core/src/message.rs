/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Message types and tag numbers used by the session layer.
//!
//! The session engine only interprets administrative messages; every other
//! message type is carried as [`MsgType::Application`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag numbers of the header, trailer and administrative fields.
pub mod tags {
    /// BeginSeqNo.
    pub const BEGIN_SEQ_NO: u32 = 7;
    /// BeginString.
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength.
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum.
    pub const CHECK_SUM: u32 = 10;
    /// EndSeqNo.
    pub const END_SEQ_NO: u32 = 16;
    /// MsgSeqNum.
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType.
    pub const MSG_TYPE: u32 = 35;
    /// NewSeqNo.
    pub const NEW_SEQ_NO: u32 = 36;
    /// PossDupFlag.
    pub const POSS_DUP_FLAG: u32 = 43;
    /// RefSeqNum.
    pub const REF_SEQ_NUM: u32 = 45;
    /// SenderCompID.
    pub const SENDER_COMP_ID: u32 = 49;
    /// SenderSubID.
    pub const SENDER_SUB_ID: u32 = 50;
    /// SendingTime.
    pub const SENDING_TIME: u32 = 52;
    /// TargetCompID.
    pub const TARGET_COMP_ID: u32 = 56;
    /// TargetSubID.
    pub const TARGET_SUB_ID: u32 = 57;
    /// Text.
    pub const TEXT: u32 = 58;
    /// PossResend.
    pub const POSS_RESEND: u32 = 97;
    /// EncryptMethod.
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt.
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID.
    pub const TEST_REQ_ID: u32 = 112;
    /// OrigSendingTime.
    pub const ORIG_SENDING_TIME: u32 = 122;
    /// GapFillFlag.
    pub const GAP_FILL_FLAG: u32 = 123;
    /// ResetSeqNumFlag.
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    /// RefTagID.
    pub const REF_TAG_ID: u32 = 371;
    /// RefMsgType.
    pub const REF_MSG_TYPE: u32 = 372;
    /// SessionRejectReason.
    pub const SESSION_REJECT_REASON: u32 = 373;
    /// Username.
    pub const USERNAME: u32 = 553;
    /// Password.
    pub const PASSWORD: u32 = 554;
}

/// Message type (tag 35) as seen by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0).
    #[default]
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any business message, carried by its raw type value.
    Application(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            other => Self::Application(other.to_string()),
        })
    }
}

impl MsgType {
    /// Returns the wire representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::Application(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative message.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

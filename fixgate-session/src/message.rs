/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session-level message model.
//!
//! Inbound messages are decoded into the closed [`SessionMessage`] enum so
//! dispatch is an exhaustive `match`. Outbound application messages are
//! described by [`OutboundMessage`]; the session fills in the header.

use bytes::BytesMut;
use fixgate_codec::{Encoder, RawMessage};
use fixgate_core::{DecodeError, EncodeError, MsgType, Timestamp, tags};

/// Standard header fields the session layer interprets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionHeader {
    /// BeginString (tag 8).
    pub begin_string: String,
    /// MsgType (tag 35).
    pub msg_type: MsgType,
    /// MsgSeqNum (tag 34).
    pub msg_seq_num: Option<u64>,
    /// SenderCompID (tag 49).
    pub sender_comp_id: Option<String>,
    /// SenderSubID (tag 50).
    pub sender_sub_id: Option<String>,
    /// TargetCompID (tag 56).
    pub target_comp_id: Option<String>,
    /// TargetSubID (tag 57).
    pub target_sub_id: Option<String>,
    /// SendingTime (tag 52).
    pub sending_time: Option<Timestamp>,
    /// OrigSendingTime (tag 122).
    pub orig_sending_time: Option<Timestamp>,
    /// PossDupFlag (tag 43).
    pub poss_dup: bool,
    /// PossResend (tag 97).
    pub poss_resend: bool,
}

impl SessionHeader {
    /// Creates a header with only a type and sequence number.
    #[must_use]
    pub fn new(msg_type: MsgType, msg_seq_num: Option<u64>) -> Self {
        Self {
            msg_type,
            msg_seq_num,
            ..Self::default()
        }
    }

    /// Sets SenderCompID and TargetCompID.
    #[must_use]
    pub fn with_comp_ids(mut self, sender: impl Into<String>, target: impl Into<String>) -> Self {
        self.sender_comp_id = Some(sender.into());
        self.target_comp_id = Some(target.into());
        self
    }

    /// Sets SendingTime.
    #[must_use]
    pub const fn with_sending_time(mut self, sending_time: Timestamp) -> Self {
        self.sending_time = Some(sending_time);
        self
    }

    /// Marks the message as a possible duplicate.
    #[must_use]
    pub const fn with_poss_dup(mut self, orig_sending_time: Option<Timestamp>) -> Self {
        self.poss_dup = true;
        self.orig_sending_time = orig_sending_time;
        self
    }

    /// Decodes the header fields of `raw`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if a present header field
    /// has the wrong format.
    pub fn decode(raw: &RawMessage<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            begin_string: raw.begin_string().to_string(),
            msg_type: raw.msg_type().clone(),
            msg_seq_num: raw.get_uint(tags::MSG_SEQ_NUM)?,
            sender_comp_id: raw.get_str(tags::SENDER_COMP_ID)?.map(str::to_string),
            sender_sub_id: raw.get_str(tags::SENDER_SUB_ID)?.map(str::to_string),
            target_comp_id: raw.get_str(tags::TARGET_COMP_ID)?.map(str::to_string),
            target_sub_id: raw.get_str(tags::TARGET_SUB_ID)?.map(str::to_string),
            sending_time: raw.get_timestamp(tags::SENDING_TIME)?,
            orig_sending_time: raw.get_timestamp(tags::ORIG_SENDING_TIME)?,
            poss_dup: raw.get_bool(tags::POSS_DUP_FLAG)?.unwrap_or(false),
            poss_resend: raw.get_bool(tags::POSS_RESEND)?.unwrap_or(false),
        })
    }

    /// Returns true if PossDupFlag or PossResend is set.
    #[inline]
    #[must_use]
    pub const fn is_poss_dup_or_resend(&self) -> bool {
        self.poss_dup || self.poss_resend
    }
}

/// A decoded Logon (35=A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonMessage {
    /// Header fields.
    pub header: SessionHeader,
    /// HeartBtInt (tag 108) in seconds; negative values are kept so they can
    /// be rejected.
    pub heart_bt_int: i64,
    /// ResetSeqNumFlag (tag 141).
    pub reset_seq_num_flag: bool,
    /// Username (tag 553).
    pub username: Option<String>,
    /// Password (tag 554).
    pub password: Option<String>,
}

impl LogonMessage {
    /// Decodes a logon from a framed message.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the message is not a logon
    /// and `DecodeError::MissingRequiredField` without HeartBtInt.
    pub fn decode(raw: &RawMessage<'_>) -> Result<Self, DecodeError> {
        if raw.msg_type() != &MsgType::Logon {
            return Err(DecodeError::InvalidFieldValue {
                tag: tags::MSG_TYPE,
                reason: format!("expected logon, got {}", raw.msg_type()),
            });
        }
        let header = SessionHeader::decode(raw)?;
        Self::from_body(header, raw)
    }

    fn from_body(header: SessionHeader, raw: &RawMessage<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            header,
            heart_bt_int: require(raw.get_int(tags::HEART_BT_INT)?, tags::HEART_BT_INT)?,
            reset_seq_num_flag: raw.get_bool(tags::RESET_SEQ_NUM_FLAG)?.unwrap_or(false),
            username: raw.get_str(tags::USERNAME)?.map(str::to_string),
            password: raw.get_str(tags::PASSWORD)?.map(str::to_string),
        })
    }
}

/// Every message kind the session layer handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// Logon (A).
    Logon(LogonMessage),
    /// Logout (5).
    Logout {
        /// Header fields.
        header: SessionHeader,
        /// Text (tag 58).
        text: Option<String>,
    },
    /// Heartbeat (0).
    Heartbeat {
        /// Header fields.
        header: SessionHeader,
        /// TestReqID (tag 112) echoed from a test request.
        test_req_id: Option<String>,
    },
    /// Test Request (1).
    TestRequest {
        /// Header fields.
        header: SessionHeader,
        /// TestReqID (tag 112).
        test_req_id: String,
    },
    /// Resend Request (2).
    ResendRequest {
        /// Header fields.
        header: SessionHeader,
        /// BeginSeqNo (tag 7).
        begin_seq_no: u64,
        /// EndSeqNo (tag 16), zero meaning "through the latest".
        end_seq_no: u64,
    },
    /// Reject (3).
    Reject {
        /// Header fields.
        header: SessionHeader,
        /// RefSeqNum (tag 45).
        ref_seq_num: Option<u64>,
        /// Text (tag 58).
        text: Option<String>,
    },
    /// Sequence Reset (4).
    SequenceReset {
        /// Header fields.
        header: SessionHeader,
        /// NewSeqNo (tag 36).
        new_seq_no: u64,
        /// GapFillFlag (tag 123).
        gap_fill: bool,
    },
    /// Any business message.
    Application {
        /// Header fields.
        header: SessionHeader,
    },
}

impl SessionMessage {
    /// Decodes the body of `raw` given its already decoded header.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` when a required body field
    /// is absent and `DecodeError::InvalidFieldValue` when one is malformed.
    pub fn decode(header: SessionHeader, raw: &RawMessage<'_>) -> Result<Self, DecodeError> {
        let message = match header.msg_type {
            MsgType::Logon => Self::Logon(LogonMessage::from_body(header, raw)?),
            MsgType::Logout => Self::Logout {
                header,
                text: raw.get_str(tags::TEXT)?.map(str::to_string),
            },
            MsgType::Heartbeat => Self::Heartbeat {
                header,
                test_req_id: raw.get_str(tags::TEST_REQ_ID)?.map(str::to_string),
            },
            MsgType::TestRequest => Self::TestRequest {
                test_req_id: require(raw.get_str(tags::TEST_REQ_ID)?, tags::TEST_REQ_ID)?
                    .to_string(),
                header,
            },
            MsgType::ResendRequest => Self::ResendRequest {
                begin_seq_no: require(raw.get_uint(tags::BEGIN_SEQ_NO)?, tags::BEGIN_SEQ_NO)?,
                end_seq_no: require(raw.get_uint(tags::END_SEQ_NO)?, tags::END_SEQ_NO)?,
                header,
            },
            MsgType::Reject => Self::Reject {
                ref_seq_num: raw.get_uint(tags::REF_SEQ_NUM)?,
                text: raw.get_str(tags::TEXT)?.map(str::to_string),
                header,
            },
            MsgType::SequenceReset => Self::SequenceReset {
                new_seq_no: require(raw.get_uint(tags::NEW_SEQ_NO)?, tags::NEW_SEQ_NO)?,
                gap_fill: raw.get_bool(tags::GAP_FILL_FLAG)?.unwrap_or(false),
                header,
            },
            MsgType::Application(_) => Self::Application { header },
        };
        Ok(message)
    }

    /// Header fields of the message.
    #[must_use]
    pub const fn header(&self) -> &SessionHeader {
        match self {
            Self::Logon(logon) => &logon.header,
            Self::Logout { header, .. }
            | Self::Heartbeat { header, .. }
            | Self::TestRequest { header, .. }
            | Self::ResendRequest { header, .. }
            | Self::Reject { header, .. }
            | Self::SequenceReset { header, .. }
            | Self::Application { header } => header,
        }
    }
}

fn require<T>(value: Option<T>, tag: u32) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingRequiredField { tag })
}

/// Routing fields stamped on every outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundHeader {
    /// SenderCompID (tag 49).
    pub sender_comp_id: String,
    /// SenderSubID (tag 50).
    pub sender_sub_id: Option<String>,
    /// TargetCompID (tag 56).
    pub target_comp_id: String,
    /// TargetSubID (tag 57).
    pub target_sub_id: Option<String>,
}

/// Tags the session owns; an outbound body may not set them.
const RESERVED_TAGS: [u32; 12] = [
    tags::BEGIN_STRING,
    tags::BODY_LENGTH,
    tags::CHECK_SUM,
    tags::MSG_SEQ_NUM,
    tags::MSG_TYPE,
    tags::POSS_DUP_FLAG,
    tags::SENDER_COMP_ID,
    tags::SENDER_SUB_ID,
    tags::SENDING_TIME,
    tags::TARGET_COMP_ID,
    tags::TARGET_SUB_ID,
    tags::ORIG_SENDING_TIME,
];

/// An outbound message body; the header is filled in when it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    msg_type: MsgType,
    fields: Vec<(u32, String)>,
}

impl OutboundMessage {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            fields: Vec::new(),
        }
    }

    /// Appends a body field.
    #[must_use]
    pub fn with_field(mut self, tag: u32, value: impl ToString) -> Self {
        self.fields.push((tag, value.to_string()));
        self
    }

    /// Appends a body field in place.
    pub fn push_field(&mut self, tag: u32, value: impl ToString) {
        self.fields.push((tag, value.to_string()));
    }

    /// MsgType of the message.
    #[must_use]
    pub const fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Body fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(u32, String)] {
        &self.fields
    }

    /// Frames the message with a complete header.
    ///
    /// A retransmission passes its `orig_sending_time`, which also sets
    /// PossDupFlag.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidFieldValue` if a value contains SOH or a
    /// body field uses a header tag, and `EncodeError::MissingRequiredField`
    /// if the header has no comp ids.
    pub fn encode(
        &self,
        begin_string: &str,
        header: &OutboundHeader,
        msg_seq_num: u64,
        sending_time: Timestamp,
        orig_sending_time: Option<Timestamp>,
    ) -> Result<BytesMut, EncodeError> {
        if header.sender_comp_id.is_empty() {
            return Err(EncodeError::MissingRequiredField {
                tag: tags::SENDER_COMP_ID,
            });
        }
        if header.target_comp_id.is_empty() {
            return Err(EncodeError::MissingRequiredField {
                tag: tags::TARGET_COMP_ID,
            });
        }
        check_value(tags::MSG_TYPE, self.msg_type.as_str())?;
        for (tag, value) in &self.fields {
            if RESERVED_TAGS.contains(tag) {
                return Err(EncodeError::InvalidFieldValue {
                    tag: *tag,
                    reason: "header tag in message body".to_string(),
                });
            }
            check_value(*tag, value)?;
        }

        let mut encoder = Encoder::new(begin_string);
        encoder.put_str(tags::MSG_TYPE, self.msg_type.as_str());
        put_checked(&mut encoder, tags::SENDER_COMP_ID, &header.sender_comp_id)?;
        if let Some(sub_id) = &header.sender_sub_id {
            put_checked(&mut encoder, tags::SENDER_SUB_ID, sub_id)?;
        }
        put_checked(&mut encoder, tags::TARGET_COMP_ID, &header.target_comp_id)?;
        if let Some(sub_id) = &header.target_sub_id {
            put_checked(&mut encoder, tags::TARGET_SUB_ID, sub_id)?;
        }
        encoder.put_uint(tags::MSG_SEQ_NUM, msg_seq_num);
        if orig_sending_time.is_some() {
            encoder.put_bool(tags::POSS_DUP_FLAG, true);
        }
        encoder.put_timestamp(tags::SENDING_TIME, sending_time);
        if let Some(orig) = orig_sending_time {
            encoder.put_timestamp(tags::ORIG_SENDING_TIME, orig);
        }
        for (tag, value) in &self.fields {
            encoder.put_str(*tag, value);
        }
        Ok(encoder.finish())
    }
}

fn check_value(tag: u32, value: &str) -> Result<(), EncodeError> {
    if value.is_empty() || value.contains('\x01') {
        return Err(EncodeError::InvalidFieldValue {
            tag,
            reason: "empty value or embedded SOH".to_string(),
        });
    }
    Ok(())
}

fn put_checked(encoder: &mut Encoder, tag: u32, value: &str) -> Result<(), EncodeError> {
    check_value(tag, value)?;
    encoder.put_str(tag, value);
    Ok(())
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Inbound message parsing and dispatch.
//!
//! [`SessionParser`] frames raw bytes, decodes the session-level view of the
//! message and drives the [`Session`] state machine with it. Malformed but
//! framed messages are answered with a Reject; only framing errors surface
//! to the caller.

use crate::config::SessionConfig;
use crate::identity::SessionIdStrategy;
use crate::message::{SessionHeader, SessionMessage};
use crate::session::Session;
use fixgate_codec::{Decoder, RawMessage};
use fixgate_core::{DecodeError, DisconnectReason, MsgType, SessionRejectReason, tags};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the parser saw, for archiving and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSummary {
    /// MsgType of the message.
    pub msg_type: MsgType,
    /// MsgSeqNum, if present and well formed.
    pub msg_seq_num: Option<u64>,
}

/// Decodes inbound messages and feeds them to a session.
pub struct SessionParser {
    validate_checksum: bool,
    validate_comp_ids: bool,
    strategy: Arc<dyn SessionIdStrategy>,
}

impl SessionParser {
    /// Creates a parser using the validation flags of `config`.
    #[must_use]
    pub fn new(config: &SessionConfig, strategy: Arc<dyn SessionIdStrategy>) -> Self {
        Self {
            validate_checksum: config.validate_checksum,
            validate_comp_ids: config.validate_comp_ids,
            strategy,
        }
    }

    /// Parses one framed message and dispatches it to `session`.
    ///
    /// # Errors
    /// Returns `DecodeError` if `bytes` is not a well framed message.
    pub fn parse(&self, session: &mut Session, bytes: &[u8]) -> Result<InboundSummary, DecodeError> {
        let raw = Decoder::new(bytes)
            .with_checksum_validation(self.validate_checksum)
            .decode()?;
        let mut summary = InboundSummary {
            msg_type: raw.msg_type().clone(),
            msg_seq_num: raw.get_uint(tags::MSG_SEQ_NUM).ok().flatten(),
        };

        if !session.on_begin_string(raw.begin_string()) {
            return Ok(summary);
        }

        let header = match SessionHeader::decode(&raw) {
            Ok(header) => header,
            Err(error) => {
                session.on_invalid_message(
                    summary.msg_seq_num.unwrap_or(0),
                    error.tag(),
                    &summary.msg_type,
                    SessionRejectReason::IncorrectDataFormat,
                );
                return Ok(summary);
            }
        };
        summary.msg_seq_num = header.msg_seq_num;

        if self.validate_comp_ids
            && header.msg_type != MsgType::Logon
            && let Some(key) = session.composite_key()
            && !self.strategy.validate(key, &header)
        {
            warn!(
                connection_id = %session.connection_id(),
                sender = ?header.sender_comp_id,
                target = ?header.target_comp_id,
                "comp id mismatch"
            );
            session.on_comp_id_problem(&header);
            return Ok(summary);
        }

        self.dispatch(session, header, &raw);
        Ok(summary)
    }

    fn dispatch(&self, session: &mut Session, header: SessionHeader, raw: &RawMessage<'_>) {
        let msg_seq_num = header.msg_seq_num.unwrap_or(0);
        let msg_type = header.msg_type.clone();
        let message = match SessionMessage::decode(header, raw) {
            Ok(message) => message,
            Err(error) => {
                let reason = match error {
                    DecodeError::MissingRequiredField { .. } => {
                        SessionRejectReason::RequiredTagMissing
                    }
                    _ => SessionRejectReason::IncorrectDataFormat,
                };
                session.on_invalid_message(msg_seq_num, error.tag(), &msg_type, reason);
                return;
            }
        };

        match message {
            SessionMessage::Logon(logon) => {
                let key = match session.composite_key() {
                    Some(key) => key.clone(),
                    None => match self.strategy.on_accept_logon(&logon.header) {
                        Ok(key) => key,
                        Err(error) => {
                            warn!(connection_id = %session.connection_id(), %error, "logon without comp ids");
                            session.request_disconnect(DisconnectReason::MissingLogonCompId);
                            return;
                        }
                    },
                };
                let session_id = session.id();
                session.on_logon(&logon, session_id, key);
            }
            SessionMessage::Logout { header, text } => {
                debug!(connection_id = %session.connection_id(), ?text, "logout received");
                session.on_logout(&header);
            }
            SessionMessage::Heartbeat {
                header,
                test_req_id,
            } => session.on_heartbeat(&header, test_req_id.as_deref()),
            SessionMessage::TestRequest {
                header,
                test_req_id,
            } => session.on_test_request(&header, &test_req_id),
            SessionMessage::ResendRequest {
                header,
                begin_seq_no,
                end_seq_no,
            } => session.on_resend_request(&header, begin_seq_no, end_seq_no),
            SessionMessage::Reject {
                header,
                ref_seq_num,
                text,
            } => {
                warn!(
                    connection_id = %session.connection_id(),
                    ?ref_seq_num,
                    ?text,
                    "reject received"
                );
                session.on_reject(&header);
            }
            SessionMessage::SequenceReset {
                header,
                new_seq_no,
                gap_fill,
            } => session.on_sequence_reset(&header, new_seq_no, gap_fill),
            SessionMessage::Application { header } => session.on_header(&header),
        }
    }
}

impl std::fmt::Debug for SessionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParser")
            .field("validate_checksum", &self.validate_checksum)
            .field("validate_comp_ids", &self.validate_comp_ids)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SenderTargetIdStrategy;
    use crate::message::{OutboundHeader, OutboundMessage};
    use crate::session::tests::{START_MS, Sent, config, fixture};
    use crate::state::SessionState;
    use fixgate_core::{SessionId, Timestamp};

    fn parser() -> SessionParser {
        SessionParser::new(&config(), Arc::new(SenderTargetIdStrategy))
    }

    fn wire(begin_string: &str, sender: &str, message: &OutboundMessage, seq: u64) -> Vec<u8> {
        let header = OutboundHeader {
            sender_comp_id: sender.to_string(),
            target_comp_id: "ACCEPTOR".to_string(),
            ..OutboundHeader::default()
        };
        message
            .encode(begin_string, &header, seq, Timestamp::from_millis(START_MS), None)
            .unwrap()
            .to_vec()
    }

    fn logon_bytes() -> Vec<u8> {
        let logon = OutboundMessage::new(MsgType::Logon)
            .with_field(tags::ENCRYPT_METHOD, 0)
            .with_field(tags::HEART_BT_INT, 10);
        wire("FIX.4.4", "INITIATOR", &logon, 1)
    }

    fn order(seq: u64) -> Vec<u8> {
        let order = OutboundMessage::new(MsgType::Application("D".to_string()))
            .with_field(11, "ORDER-1");
        wire("FIX.4.4", "INITIATOR", &order, seq)
    }

    #[test]
    fn test_logon_then_application_message() {
        let mut f = fixture(SessionState::Connected);
        let parser = parser();

        let summary = parser.parse(&mut f.session, &logon_bytes()).unwrap();
        assert_eq!(summary.msg_type, MsgType::Logon);
        assert_eq!(summary.msg_seq_num, Some(1));
        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(
            f.session.composite_key().map(ToString::to_string).as_deref(),
            Some("ACCEPTOR->INITIATOR")
        );
        assert_eq!(f.session.id(), SessionId::UNKNOWN);

        let summary = parser.parse(&mut f.session, &order(2)).unwrap();
        assert_eq!(summary.msg_type, MsgType::Application("D".to_string()));
        assert_eq!(f.session.last_received_msg_seq_num(), 2);
    }

    #[test]
    fn test_framing_error_is_returned() {
        let mut f = fixture(SessionState::Connected);
        assert!(parser().parse(&mut f.session, b"garbage").is_err());
        assert_eq!(f.session.state(), SessionState::Connected);
    }

    #[test]
    fn test_wrong_begin_string_disconnects() {
        let mut f = fixture(SessionState::Connected);
        let logon = OutboundMessage::new(MsgType::Logon).with_field(tags::HEART_BT_INT, 10);
        parser()
            .parse(&mut f.session, &wire("FIX.4.2", "INITIATOR", &logon, 1))
            .unwrap();
        assert_eq!(
            f.session.disconnect_reason(),
            Some(DisconnectReason::InvalidBeginString)
        );
    }

    #[test]
    fn test_comp_id_mismatch_rejects_and_disconnects() {
        let mut f = fixture(SessionState::Connected);
        let parser = parser();
        parser.parse(&mut f.session, &logon_bytes()).unwrap();
        f.proxy.take();

        let intruder = OutboundMessage::new(MsgType::Heartbeat);
        parser
            .parse(&mut f.session, &wire("FIX.4.4", "INTRUDER", &intruder, 2))
            .unwrap();
        let sent = f.proxy.take();
        assert!(matches!(
            sent[0],
            Sent::Reject {
                reason: SessionRejectReason::CompIdProblem,
                ..
            }
        ));
        assert!(matches!(sent[1], Sent::Logout { .. }));
        assert_eq!(
            f.session.disconnect_reason(),
            Some(DisconnectReason::CompIdProblem)
        );
    }

    #[test]
    fn test_missing_body_field_is_rejected() {
        let mut f = fixture(SessionState::Connected);
        let parser = parser();
        parser.parse(&mut f.session, &logon_bytes()).unwrap();
        f.proxy.take();

        let test_request = OutboundMessage::new(MsgType::TestRequest);
        parser
            .parse(&mut f.session, &wire("FIX.4.4", "INITIATOR", &test_request, 2))
            .unwrap();
        assert_eq!(
            f.proxy.take(),
            vec![Sent::Reject {
                seq: 2,
                ref_seq_num: 2,
                ref_tag_id: Some(tags::TEST_REQ_ID),
                reason: SessionRejectReason::RequiredTagMissing
            }]
        );
        assert_eq!(f.session.last_received_msg_seq_num(), 2);
        assert_eq!(f.session.state(), SessionState::Active);
    }

    #[test]
    fn test_gap_fill_over_the_wire() {
        let mut f = fixture(SessionState::Connected);
        let parser = parser();
        parser.parse(&mut f.session, &logon_bytes()).unwrap();
        parser.parse(&mut f.session, &order(5)).unwrap();
        assert_eq!(f.session.state(), SessionState::AwaitingResend);

        let gap_fill = OutboundMessage::new(MsgType::SequenceReset)
            .with_field(tags::GAP_FILL_FLAG, "Y")
            .with_field(tags::NEW_SEQ_NO, 5);
        let header = OutboundHeader {
            sender_comp_id: "INITIATOR".to_string(),
            target_comp_id: "ACCEPTOR".to_string(),
            ..OutboundHeader::default()
        };
        let bytes = gap_fill
            .encode(
                "FIX.4.4",
                &header,
                2,
                Timestamp::from_millis(START_MS),
                Some(Timestamp::from_millis(START_MS)),
            )
            .unwrap();
        parser.parse(&mut f.session, &bytes).unwrap();
        assert_eq!(f.session.last_received_msg_seq_num(), 4);
        assert_eq!(f.session.state(), SessionState::Active);
    }
}

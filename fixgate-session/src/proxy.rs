/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Outbound side of a session.
//!
//! The state machine decides *what* to send and with which sequence number;
//! a [`SessionProxy`] turns that into bytes. [`DirectSessionProxy`] encodes
//! and appends to the outbound [`Publication`], from which the engine writes
//! to the transport.

use crate::identity::{CompositeKey, SessionIdStrategy};
use crate::message::{OutboundHeader, OutboundMessage};
use fixgate_core::{
    Clock, ConnectionId, DisconnectReason, MsgType, SessionError, SessionId, SessionRejectReason,
    tags,
};
use fixgate_store::{MessageHeader, Publication};
use std::sync::Arc;
use tracing::{debug, warn};

/// Encodes and emits the messages a session sends.
///
/// Admin messages are fire-and-forget: an implementation reports its own
/// failures. Only [`send`](Self::send) surfaces an error to the caller.
pub trait SessionProxy: Send {
    /// Binds the proxy to a session identity.
    fn setup_session(&mut self, session_id: SessionId, key: &CompositeKey);

    /// Logon (A).
    fn logon(
        &mut self,
        msg_seq_no: u64,
        heartbeat_interval_secs: u64,
        reset_seq_num: bool,
        credentials: Option<(&str, &str)>,
    );

    /// Heartbeat (0), echoing `test_req_id` when answering a test request.
    fn heartbeat(&mut self, msg_seq_no: u64, test_req_id: Option<&str>);

    /// Test Request (1).
    fn test_request(&mut self, msg_seq_no: u64, test_req_id: &str);

    /// Logout (5).
    fn logout(&mut self, msg_seq_no: u64, text: Option<&str>);

    /// Logout explaining that MsgSeqNum was lower than expected.
    fn low_sequence_number_logout(&mut self, msg_seq_no: u64, expected: u64, received: u64) {
        let text = format!("MsgSeqNum too low, expecting {expected} but received {received}");
        self.logout(msg_seq_no, Some(&text));
    }

    /// Logout explaining that HeartBtInt was negative.
    fn negative_heartbeat_logout(&mut self, msg_seq_no: u64) {
        self.logout(msg_seq_no, Some("HeartBtInt should not be negative"));
    }

    /// Logout explaining that MsgSeqNum was missing.
    fn received_message_without_sequence_number(&mut self, msg_seq_no: u64) {
        self.logout(msg_seq_no, Some("Received message without MsgSeqNum"));
    }

    /// Reject (3) referring to an inbound message.
    fn reject(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        ref_tag_id: Option<u32>,
        ref_msg_type: &MsgType,
        reason: SessionRejectReason,
    );

    /// Reject (3) of a logon that could not be accepted.
    fn reject_whilst_not_logged_on(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        reason: SessionRejectReason,
    ) {
        self.reject(msg_seq_no, ref_seq_num, None, &MsgType::Logon, reason);
    }

    /// Resend Request (2) for `[begin, end]`, `end == 0` meaning open-ended.
    fn resend_request(&mut self, msg_seq_no: u64, begin: u64, end: u64);

    /// Sequence Reset (4) in gap fill mode, sent as a possible duplicate.
    fn sequence_reset(&mut self, msg_seq_no: u64, new_seq_no: u64);

    /// Asks the engine to close the connection.
    fn request_disconnect(&mut self, connection_id: ConnectionId, reason: DisconnectReason);

    /// Sends an application message.
    ///
    /// # Errors
    /// Returns `SessionError` if the message cannot be encoded or published.
    fn send(&mut self, msg_seq_no: u64, message: &OutboundMessage) -> Result<u64, SessionError>;
}

/// Proxy that encodes straight into a [`Publication`].
pub struct DirectSessionProxy {
    connection_id: ConnectionId,
    session_id: SessionId,
    begin_string: String,
    header: OutboundHeader,
    strategy: Arc<dyn SessionIdStrategy>,
    clock: Arc<dyn Clock>,
    publication: Arc<dyn Publication>,
}

impl DirectSessionProxy {
    /// Creates an unbound proxy for `connection_id`.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        begin_string: impl Into<String>,
        strategy: Arc<dyn SessionIdStrategy>,
        clock: Arc<dyn Clock>,
        publication: Arc<dyn Publication>,
    ) -> Self {
        Self {
            connection_id,
            session_id: SessionId::UNKNOWN,
            begin_string: begin_string.into(),
            header: OutboundHeader::default(),
            strategy,
            clock,
            publication,
        }
    }

    fn publish(
        &self,
        msg_seq_no: u64,
        message: &OutboundMessage,
        poss_dup: bool,
    ) -> Result<u64, SessionError> {
        let now = self.clock.timestamp();
        let bytes = message.encode(
            &self.begin_string,
            &self.header,
            msg_seq_no,
            now,
            poss_dup.then_some(now),
        )?;
        let header = MessageHeader {
            connection_id: self.connection_id,
            session_id: self.session_id,
            msg_type: message.msg_type().clone(),
            msg_seq_num: msg_seq_no,
        };
        let position = self.publication.save_message(&bytes, &header)?;
        debug!(
            connection_id = %self.connection_id,
            msg_type = %message.msg_type(),
            msg_seq_num = msg_seq_no,
            "sent"
        );
        Ok(position)
    }

    fn publish_admin(&self, msg_seq_no: u64, message: &OutboundMessage, poss_dup: bool) {
        if let Err(error) = self.publish(msg_seq_no, message, poss_dup) {
            warn!(
                connection_id = %self.connection_id,
                msg_type = %message.msg_type(),
                msg_seq_num = msg_seq_no,
                %error,
                "failed to send session message"
            );
        }
    }
}

impl std::fmt::Debug for DirectSessionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSessionProxy")
            .field("connection_id", &self.connection_id)
            .field("session_id", &self.session_id)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl SessionProxy for DirectSessionProxy {
    fn setup_session(&mut self, session_id: SessionId, key: &CompositeKey) {
        self.session_id = session_id;
        self.strategy.setup_header(key, &mut self.header);
    }

    fn logon(
        &mut self,
        msg_seq_no: u64,
        heartbeat_interval_secs: u64,
        reset_seq_num: bool,
        credentials: Option<(&str, &str)>,
    ) {
        let mut message = OutboundMessage::new(MsgType::Logon)
            .with_field(tags::ENCRYPT_METHOD, 0)
            .with_field(tags::HEART_BT_INT, heartbeat_interval_secs);
        if reset_seq_num {
            message.push_field(tags::RESET_SEQ_NUM_FLAG, "Y");
        }
        if let Some((username, password)) = credentials {
            message.push_field(tags::USERNAME, username);
            message.push_field(tags::PASSWORD, password);
        }
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn heartbeat(&mut self, msg_seq_no: u64, test_req_id: Option<&str>) {
        let mut message = OutboundMessage::new(MsgType::Heartbeat);
        if let Some(id) = test_req_id {
            message.push_field(tags::TEST_REQ_ID, id);
        }
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn test_request(&mut self, msg_seq_no: u64, test_req_id: &str) {
        let message =
            OutboundMessage::new(MsgType::TestRequest).with_field(tags::TEST_REQ_ID, test_req_id);
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn logout(&mut self, msg_seq_no: u64, text: Option<&str>) {
        let mut message = OutboundMessage::new(MsgType::Logout);
        if let Some(text) = text {
            message.push_field(tags::TEXT, text);
        }
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn reject(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        ref_tag_id: Option<u32>,
        ref_msg_type: &MsgType,
        reason: SessionRejectReason,
    ) {
        let mut message = OutboundMessage::new(MsgType::Reject)
            .with_field(tags::REF_SEQ_NUM, ref_seq_num)
            .with_field(tags::REF_MSG_TYPE, ref_msg_type.as_str());
        if let Some(tag) = ref_tag_id {
            message.push_field(tags::REF_TAG_ID, tag);
        }
        message.push_field(tags::SESSION_REJECT_REASON, reason.code());
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn resend_request(&mut self, msg_seq_no: u64, begin: u64, end: u64) {
        let message = OutboundMessage::new(MsgType::ResendRequest)
            .with_field(tags::BEGIN_SEQ_NO, begin)
            .with_field(tags::END_SEQ_NO, end);
        self.publish_admin(msg_seq_no, &message, false);
    }

    fn sequence_reset(&mut self, msg_seq_no: u64, new_seq_no: u64) {
        let message = OutboundMessage::new(MsgType::SequenceReset)
            .with_field(tags::GAP_FILL_FLAG, "Y")
            .with_field(tags::NEW_SEQ_NO, new_seq_no);
        self.publish_admin(msg_seq_no, &message, true);
    }

    fn request_disconnect(&mut self, connection_id: ConnectionId, reason: DisconnectReason) {
        if let Err(error) = self.publication.save_disconnect(connection_id, reason) {
            warn!(%connection_id, %reason, %error, "failed to request disconnect");
        }
    }

    fn send(&mut self, msg_seq_no: u64, message: &OutboundMessage) -> Result<u64, SessionError> {
        self.publish(msg_seq_no, message, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SenderTargetIdStrategy;
    use fixgate_codec::Decoder;
    use fixgate_core::{CompId, ManualClock};
    use fixgate_store::{MemoryPublication, Record};

    fn proxy(publication: &Arc<MemoryPublication>) -> DirectSessionProxy {
        let mut proxy = DirectSessionProxy::new(
            ConnectionId::new(7),
            "FIX.4.4",
            Arc::new(SenderTargetIdStrategy),
            Arc::new(ManualClock::new(1_000)),
            Arc::clone(publication) as Arc<dyn Publication>,
        );
        let key = CompositeKey::new(
            CompId::new("ACCEPTOR").unwrap(),
            CompId::new("INITIATOR").unwrap(),
        );
        proxy.setup_session(SessionId::new(3), &key);
        proxy
    }

    #[test]
    fn test_resend_request_is_published() {
        let publication = Arc::new(MemoryPublication::new());
        let mut proxy = proxy(&publication);
        proxy.resend_request(4, 5, 7);

        let messages = publication.messages();
        assert_eq!(messages.len(), 1);
        let (header, bytes) = &messages[0];
        assert_eq!(header.session_id, SessionId::new(3));
        assert_eq!(header.msg_seq_num, 4);
        assert_eq!(header.msg_type, MsgType::ResendRequest);

        let raw = Decoder::new(bytes).decode().unwrap();
        assert_eq!(raw.get_uint(tags::BEGIN_SEQ_NO).unwrap(), Some(5));
        assert_eq!(raw.get_uint(tags::END_SEQ_NO).unwrap(), Some(7));
        assert_eq!(raw.get_str(tags::SENDER_COMP_ID).unwrap(), Some("ACCEPTOR"));
    }

    #[test]
    fn test_gap_fill_is_poss_dup() {
        let publication = Arc::new(MemoryPublication::new());
        let mut proxy = proxy(&publication);
        proxy.sequence_reset(2, 10);

        let (_, bytes) = &publication.messages()[0];
        let raw = Decoder::new(bytes).decode().unwrap();
        assert_eq!(raw.get_bool(tags::POSS_DUP_FLAG).unwrap(), Some(true));
        assert_eq!(raw.get_bool(tags::GAP_FILL_FLAG).unwrap(), Some(true));
        assert_eq!(raw.get_uint(tags::NEW_SEQ_NO).unwrap(), Some(10));
        assert!(raw.contains(tags::ORIG_SENDING_TIME));
    }

    #[test]
    fn test_reject_carries_reason() {
        let publication = Arc::new(MemoryPublication::new());
        let mut proxy = proxy(&publication);
        proxy.reject(
            9,
            5,
            Some(tags::NEW_SEQ_NO),
            &MsgType::SequenceReset,
            SessionRejectReason::ValueIsIncorrect,
        );

        let (_, bytes) = &publication.messages()[0];
        let raw = Decoder::new(bytes).decode().unwrap();
        assert_eq!(raw.get_uint(tags::REF_SEQ_NUM).unwrap(), Some(5));
        assert_eq!(raw.get_uint(tags::REF_TAG_ID).unwrap(), Some(36));
        assert_eq!(raw.get_str(tags::REF_MSG_TYPE).unwrap(), Some("4"));
        assert_eq!(raw.get_uint(tags::SESSION_REJECT_REASON).unwrap(), Some(5));
    }

    #[test]
    fn test_request_disconnect_records_reason() {
        let publication = Arc::new(MemoryPublication::new());
        let mut proxy = proxy(&publication);
        proxy.request_disconnect(ConnectionId::new(7), DisconnectReason::Logout);
        assert_eq!(
            publication.records(),
            vec![Record::Disconnect {
                connection_id: ConnectionId::new(7),
                reason: DisconnectReason::Logout
            }]
        );
    }

    #[test]
    fn test_unbound_proxy_cannot_send() {
        let publication = Arc::new(MemoryPublication::new());
        let mut proxy = DirectSessionProxy::new(
            ConnectionId::new(1),
            "FIX.4.4",
            Arc::new(SenderTargetIdStrategy),
            Arc::new(ManualClock::new(0)),
            Arc::clone(&publication) as Arc<dyn Publication>,
        );
        let message = OutboundMessage::new(MsgType::Application("D".to_string())).with_field(11, "A");
        assert!(proxy.send(1, &message).is_err());
        proxy.heartbeat(1, None);
        assert!(publication.is_empty());
    }
}

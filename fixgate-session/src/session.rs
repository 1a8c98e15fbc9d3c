/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Per-connection session state machine.
//!
//! A [`Session`] is owned by exactly one thread at a time. It never blocks
//! and never schedules callbacks: the owner calls [`Session::poll`] with the
//! current time and feeds inbound messages in arrival order.

use crate::config::{SessionConfig, duration_ms};
use crate::heartbeat::{HeartbeatTimers, TEST_REQ_ID};
use crate::identity::CompositeKey;
use crate::message::{LogonMessage, OutboundMessage, SessionHeader};
use crate::proxy::SessionProxy;
use crate::recovery::{self, ResetAction, SequenceCheck};
use crate::sequence::{CounterReader, SequenceCounter};
use crate::state::SessionState;
use fixgate_core::{
    Clock, ConnectionId, DisconnectReason, MsgType, SessionError, SessionId, SessionRejectReason,
    Timestamp, tags,
};
use fixgate_store::Publication;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators a session is built from.
pub struct SessionParts {
    /// Connection the session runs on.
    pub connection_id: ConnectionId,
    /// Encoder for outbound messages.
    pub proxy: Box<dyn SessionProxy>,
    /// Outbound publication, used to record logons.
    pub publication: Arc<dyn Publication>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Last sent MsgSeqNum.
    pub sent: SequenceCounter,
    /// Last received MsgSeqNum.
    pub received: SequenceCounter,
}

/// Everything needed to rebuild a session under a new owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Connection the session runs on.
    pub connection_id: ConnectionId,
    /// Durable session id.
    pub session_id: SessionId,
    /// Composite key, once logged on.
    pub key: Option<CompositeKey>,
    /// Protocol state at the time of the snapshot.
    pub state: SessionState,
    /// Last sent MsgSeqNum.
    pub last_sent_msg_seq_num: u64,
    /// Last received MsgSeqNum.
    pub last_received_msg_seq_num: u64,
    /// Negotiated heartbeat interval.
    pub heartbeat_interval_secs: u64,
    /// Username from the logon.
    pub username: Option<String>,
    /// Password from the logon.
    pub password: Option<String>,
}

/// FIX session protocol state machine.
pub struct Session {
    connection_id: ConnectionId,
    id: SessionId,
    key: Option<CompositeKey>,
    state: SessionState,
    begin_string: String,
    sending_time_window_ms: u64,
    reset_seq_num_on_logon: bool,
    credentials: Option<(String, String)>,
    username: Option<String>,
    password: Option<String>,
    last_sent: SequenceCounter,
    last_received: SequenceCounter,
    timers: HeartbeatTimers,
    resend_target: Option<u64>,
    disconnect_reason: Option<DisconnectReason>,
    proxy: Box<dyn SessionProxy>,
    publication: Arc<dyn Publication>,
    clock: Arc<dyn Clock>,
}

impl Session {
    /// Creates a session in `state`.
    ///
    /// Sessions that have not logged on yet get a logon deadline of
    /// `config.logon_timeout`.
    #[must_use]
    pub fn new(parts: SessionParts, config: &SessionConfig, state: SessionState) -> Self {
        let now = parts.clock.time_ms();
        let mut timers = HeartbeatTimers::new(
            config.heartbeat_interval,
            config.reasonable_transmission_time,
            now,
        );
        if matches!(state, SessionState::Connecting | SessionState::Connected) {
            timers.set_next_inbound_ms(now.saturating_add(duration_ms(config.logon_timeout)));
        }
        let credentials = config
            .username
            .clone()
            .zip(config.password.clone());
        Self {
            connection_id: parts.connection_id,
            id: SessionId::UNKNOWN,
            key: None,
            state,
            begin_string: config.begin_string.clone(),
            sending_time_window_ms: config.sending_time_window_ms(),
            reset_seq_num_on_logon: config.reset_seq_num_on_logon,
            credentials,
            username: None,
            password: None,
            last_sent: parts.sent,
            last_received: parts.received,
            timers,
            resend_target: None,
            disconnect_reason: None,
            proxy: parts.proxy,
            publication: parts.publication,
            clock: parts.clock,
        }
    }

    /// Rebuilds a session from a snapshot without consuming any sequence
    /// number.
    #[must_use]
    pub fn from_snapshot(
        parts: SessionParts,
        config: &SessionConfig,
        snapshot: &SessionSnapshot,
    ) -> Self {
        let mut session = Self::new(parts, config, snapshot.state);
        session.id = snapshot.session_id;
        if let Some(key) = &snapshot.key {
            session.proxy.setup_session(snapshot.session_id, key);
        }
        session.key = snapshot.key.clone();
        session.username = snapshot.username.clone();
        session.password = snapshot.password.clone();
        session.last_sent.set(snapshot.last_sent_msg_seq_num);
        session.last_received.set(snapshot.last_received_msg_seq_num);
        let now = session.time();
        session
            .timers
            .set_interval_secs(snapshot.heartbeat_interval_secs, now);
        session
    }

    // ---------- Accessors ----------

    /// Connection the session runs on.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Durable session id, [`SessionId::UNKNOWN`] before logon.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Composite key, once logged on.
    #[must_use]
    pub const fn composite_key(&self) -> Option<&CompositeKey> {
        self.key.as_ref()
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while the session is usable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Last sent MsgSeqNum.
    #[must_use]
    pub const fn last_sent_msg_seq_num(&self) -> u64 {
        self.last_sent.get()
    }

    /// Last received MsgSeqNum.
    #[must_use]
    pub const fn last_received_msg_seq_num(&self) -> u64 {
        self.last_received.get()
    }

    /// Next MsgSeqNum expected from the peer.
    #[must_use]
    pub const fn expected_received_seq_num(&self) -> u64 {
        self.last_received.get().saturating_add(1)
    }

    /// Negotiated heartbeat interval in seconds.
    #[must_use]
    pub const fn heartbeat_interval_secs(&self) -> u64 {
        self.timers.interval_secs()
    }

    /// Heartbeat and inbound deadlines.
    #[must_use]
    pub const fn timers(&self) -> &HeartbeatTimers {
        &self.timers
    }

    /// Why the session disconnected, if it did.
    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    /// Lock-free reader of the last sent MsgSeqNum.
    #[must_use]
    pub fn sent_reader(&self) -> CounterReader {
        self.last_sent.reader()
    }

    /// Lock-free reader of the last received MsgSeqNum.
    #[must_use]
    pub fn received_reader(&self) -> CounterReader {
        self.last_received.reader()
    }

    /// Captures the state needed to rebuild this session elsewhere.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection_id: self.connection_id,
            session_id: self.id,
            key: self.key.clone(),
            state: self.state,
            last_sent_msg_seq_num: self.last_sent.get(),
            last_received_msg_seq_num: self.last_received.get(),
            heartbeat_interval_secs: self.timers.interval_secs(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    // ---------- Public API ----------

    /// Fires whichever timers are due at `now_ms`.
    ///
    /// # Returns
    /// The number of actions taken, for idle strategies.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        if self.state.is_terminal() {
            return 0;
        }
        let mut actions = 0;

        if self.state.is_logged_on() && self.timers.heartbeat_due(now_ms) {
            let seq = self.new_sent_seq_num_at(now_ms);
            self.proxy.heartbeat(seq, None);
            actions += 1;
        }

        if self.timers.inbound_due(now_ms) {
            match self.state {
                SessionState::Connecting | SessionState::Connected => {
                    self.request_disconnect(DisconnectReason::LogonTimeout);
                }
                SessionState::AwaitingLogout | SessionState::AwaitingResend => {
                    self.request_disconnect(DisconnectReason::HeartbeatTimeout);
                }
                _ => {
                    let seq = self.new_sent_seq_num_at(now_ms);
                    self.proxy.test_request(seq, TEST_REQ_ID);
                    self.set_state(SessionState::AwaitingResend);
                    self.timers.on_received(now_ms);
                }
            }
            actions += 1;
        }

        actions
    }

    /// Sends our logon as an initiator.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless the session is
    /// `CONNECTING`.
    pub fn initiate(&mut self, session_id: SessionId, key: CompositeKey) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(self.invalid_state(SessionState::Connecting));
        }
        if self.reset_seq_num_on_logon {
            self.last_sent.set(0);
            self.last_received.set(0);
        }
        self.id = session_id;
        self.proxy.setup_session(session_id, &key);
        info!(connection_id = %self.connection_id, key = %key, "initiating logon");
        self.key = Some(key);

        let seq = self.new_sent_seq_num();
        let interval = self.timers.interval_secs();
        let credentials = self
            .credentials
            .as_ref()
            .map(|(user, pass)| (user.as_str(), pass.as_str()));
        self.proxy
            .logon(seq, interval, self.reset_seq_num_on_logon, credentials);
        Ok(())
    }

    /// Sends our logout and waits for the peer's.
    pub fn start_logout(&mut self) {
        self.send_logout(None);
        self.set_state(SessionState::AwaitingLogout);
    }

    /// Sends a logout and disconnects without waiting.
    pub fn logout_and_disconnect(&mut self, reason: DisconnectReason) {
        self.send_logout(None);
        self.request_disconnect(reason);
    }

    /// Asks the engine to close the connection.
    pub fn request_disconnect(&mut self, reason: DisconnectReason) {
        if self.state.is_terminal() {
            return;
        }
        self.proxy.request_disconnect(self.connection_id, reason);
        self.disconnect_reason = Some(reason);
        info!(
            connection_id = %self.connection_id,
            session_id = %self.id,
            %reason,
            "disconnect requested"
        );
        self.set_state(SessionState::Disconnected);
    }

    /// Sends an application message.
    ///
    /// # Returns
    /// The publication position of the message.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless the session is `ACTIVE`,
    /// or the proxy's error if the message cannot be encoded or published.
    /// Sequence numbers are unchanged on error.
    pub fn send(&mut self, message: &OutboundMessage) -> Result<u64, SessionError> {
        if self.state != SessionState::Active {
            return Err(self.invalid_state(SessionState::Active));
        }
        let seq = self.last_sent.get() + 1;
        let position = self.proxy.send(seq, message)?;
        self.new_sent_seq_num();
        Ok(position)
    }

    /// Transport closed underneath the session.
    pub fn on_disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.disconnect_reason
            .get_or_insert(DisconnectReason::RemoteDisconnect);
        self.set_state(SessionState::Disconnected);
    }

    /// Ownership of the session was released.
    pub fn disable(&mut self) {
        if !self.state.is_terminal() {
            self.set_state(SessionState::Disabled);
        }
    }

    // ---------- Event Handlers ----------

    /// Sequence checks common to every inbound message.
    pub fn on_message(
        &mut self,
        msg_seq_no: Option<u64>,
        msg_type: &MsgType,
        sending_time: Option<Timestamp>,
        orig_sending_time: Option<Timestamp>,
        is_poss_dup_or_resend: bool,
    ) {
        match self.state {
            SessionState::Connected => {
                self.request_disconnect(DisconnectReason::FirstMessageNotLogon);
            }
            state if state.is_terminal() => {
                debug!(connection_id = %self.connection_id, %state, "message after disconnect ignored");
            }
            _ => self.check_sequence(
                msg_seq_no,
                msg_type,
                sending_time,
                orig_sending_time,
                is_poss_dup_or_resend,
            ),
        }
    }

    /// [`on_message`](Self::on_message) driven by a decoded header.
    pub fn on_header(&mut self, header: &SessionHeader) {
        self.on_message(
            header.msg_seq_num,
            &header.msg_type,
            header.sending_time,
            header.orig_sending_time,
            header.is_poss_dup_or_resend(),
        );
    }

    /// Logon received.
    ///
    /// Before logon this validates HeartBtInt and SendingTime, binds the
    /// identity, answers with our own logon when accepting, and records the
    /// logon in the publication. On an established session the logon is
    /// sequence-checked like any other message.
    pub fn on_logon(&mut self, logon: &LogonMessage, session_id: SessionId, key: CompositeKey) {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Connecting
        ) {
            self.on_header(&logon.header);
            return;
        }

        // Rejections below are addressed through the proxy header.
        self.proxy.setup_session(session_id, &key);
        if !self.validate_heartbeat(logon.heart_bt_int) || !self.validate_sending_time(&logon.header)
        {
            return;
        }

        self.id = session_id;
        self.key = Some(key);
        self.username = logon.username.clone();
        self.password = logon.password.clone();
        let interval = logon.heart_bt_int.unsigned_abs();
        let now = self.time();
        self.timers.set_interval_secs(interval, now);

        if self.state == SessionState::Connected {
            let seq = self.new_sent_seq_num();
            self.proxy
                .logon(seq, interval, logon.reset_seq_num_flag, None);
        }
        self.set_state(SessionState::Active);

        let header = &logon.header;
        self.check_sequence(
            header.msg_seq_num,
            &MsgType::Logon,
            header.sending_time,
            header.orig_sending_time,
            header.is_poss_dup_or_resend(),
        );

        if self.state.is_connected() {
            if let Err(error) = self.publication.save_logon(self.connection_id, session_id) {
                error!(connection_id = %self.connection_id, %error, "failed to record logon");
            }
            info!(
                connection_id = %self.connection_id,
                session_id = %session_id,
                heartbeat_interval_secs = interval,
                "logged on"
            );
        }
    }

    /// Logout received.
    pub fn on_logout(&mut self, header: &SessionHeader) {
        self.on_header(header);
        match self.state {
            SessionState::AwaitingLogout => self.request_disconnect(DisconnectReason::Logout),
            state if state.is_terminal() => {}
            _ => self.logout_and_disconnect(DisconnectReason::Logout),
        }
    }

    /// Test request received: answer with a heartbeat echoing its id.
    pub fn on_test_request(&mut self, header: &SessionHeader, test_req_id: &str) {
        if header.msg_seq_num.is_some() && self.state.is_logged_on() {
            let seq = self.new_sent_seq_num();
            self.proxy.heartbeat(seq, Some(test_req_id));
        }
        self.on_header(header);
    }

    /// Heartbeat received; answers our own test request when it echoes it.
    pub fn on_heartbeat(&mut self, header: &SessionHeader, test_req_id: Option<&str>) {
        if self.state == SessionState::AwaitingResend && test_req_id == Some(TEST_REQ_ID) {
            self.set_state(SessionState::Active);
        }
        self.on_header(header);
    }

    /// Reject received.
    pub fn on_reject(&mut self, header: &SessionHeader) {
        self.on_header(header);
    }

    /// Resend request received.
    ///
    /// Messages are not replayed; the requested range is gap filled up to
    /// the next sequence number we will use.
    pub fn on_resend_request(&mut self, header: &SessionHeader, begin_seq_no: u64, end_seq_no: u64) {
        self.on_header(header);
        if !self.state.is_logged_on() {
            return;
        }
        let last_sent = self.last_sent.get();
        if begin_seq_no == 0 || begin_seq_no > last_sent {
            warn!(
                connection_id = %self.connection_id,
                begin_seq_no,
                last_sent,
                "resend request beyond last sent message ignored"
            );
            return;
        }
        let new_seq_no = if end_seq_no == 0 || end_seq_no >= last_sent {
            last_sent + 1
        } else {
            end_seq_no + 1
        };
        info!(
            connection_id = %self.connection_id,
            begin_seq_no,
            new_seq_no,
            "gap filling resend request"
        );
        self.proxy.sequence_reset(begin_seq_no, new_seq_no);
        let now = self.time();
        self.timers.on_sent(now);
    }

    /// Sequence reset received, either a hard reset or a gap fill.
    pub fn on_sequence_reset(&mut self, header: &SessionHeader, new_seq_no: u64, gap_fill: bool) {
        match self.state {
            SessionState::Connected => {
                self.request_disconnect(DisconnectReason::FirstMessageNotLogon);
                return;
            }
            state if state.is_terminal() => return,
            _ => {}
        }
        let Some(msg_seq_no) = header.msg_seq_num else {
            self.missing_sequence_number();
            return;
        };

        let action = recovery::on_sequence_reset(
            self.last_received.get(),
            msg_seq_no,
            new_seq_no,
            gap_fill,
            header.is_poss_dup_or_resend(),
        );
        debug!(connection_id = %self.connection_id, ?action, "sequence reset");
        match action {
            ResetAction::Advance { last_received } => {
                let now = self.time();
                self.timers.on_received(now);
                self.advance_last_received(last_received);
            }
            ResetAction::RejectDecrease => {
                let seq = self.new_sent_seq_num();
                self.proxy.reject(
                    seq,
                    msg_seq_no,
                    Some(tags::NEW_SEQ_NO),
                    &MsgType::SequenceReset,
                    SessionRejectReason::ValueIsIncorrect,
                );
            }
            ResetAction::Ignore => {}
            ResetAction::NestedGap {
                resend_from,
                last_received,
            } => {
                let seq = self.new_sent_seq_num();
                self.proxy.resend_request(seq, resend_from, 0);
                self.last_received.set(last_received);
            }
            ResetAction::TooLow { expected, received } => {
                self.low_sequence_number(expected, received);
            }
            ResetAction::Exhausted => self.sequence_exhausted(msg_seq_no),
        }
    }

    /// Checks the BeginString of an inbound message.
    ///
    /// # Returns
    /// `false` (after requesting a disconnect) on a mismatch.
    pub fn on_begin_string(&mut self, value: &str) -> bool {
        let valid = value == self.begin_string;
        if !valid {
            warn!(
                connection_id = %self.connection_id,
                expected = %self.begin_string,
                received = value,
                "invalid begin string"
            );
            self.request_disconnect(DisconnectReason::InvalidBeginString);
        }
        valid
    }

    /// An inbound message could not be interpreted: count it and reject it.
    pub fn on_invalid_message(
        &mut self,
        ref_seq_num: u64,
        ref_tag_id: Option<u32>,
        ref_msg_type: &MsgType,
        reason: SessionRejectReason,
    ) {
        self.last_received.increment();
        let seq = self.new_sent_seq_num();
        warn!(
            connection_id = %self.connection_id,
            ref_seq_num,
            ?ref_tag_id,
            %reason,
            "rejecting invalid message"
        );
        self.proxy
            .reject(seq, ref_seq_num, ref_tag_id, ref_msg_type, reason);
    }

    /// An inbound message carried comp ids that do not match the session.
    pub fn on_comp_id_problem(&mut self, header: &SessionHeader) {
        let seq = self.new_sent_seq_num();
        self.proxy.reject(
            seq,
            header.msg_seq_num.unwrap_or(0),
            Some(tags::SENDER_COMP_ID),
            &header.msg_type,
            SessionRejectReason::CompIdProblem,
        );
        self.logout_and_disconnect(DisconnectReason::CompIdProblem);
    }

    // ---------- Internals ----------

    fn check_sequence(
        &mut self,
        msg_seq_no: Option<u64>,
        msg_type: &MsgType,
        sending_time: Option<Timestamp>,
        orig_sending_time: Option<Timestamp>,
        is_poss_dup_or_resend: bool,
    ) {
        let Some(msg_seq_no) = msg_seq_no else {
            self.missing_sequence_number();
            return;
        };

        if is_poss_dup_or_resend {
            let reason = match (orig_sending_time, sending_time) {
                (None, _) => Some(SessionRejectReason::RequiredTagMissing),
                (Some(orig), Some(sent)) if orig > sent => {
                    Some(SessionRejectReason::SendingTimeAccuracyProblem)
                }
                _ => None,
            };
            if let Some(reason) = reason {
                let seq = self.new_sent_seq_num();
                self.proxy.reject(
                    seq,
                    msg_seq_no,
                    Some(tags::ORIG_SENDING_TIME),
                    msg_type,
                    reason,
                );
            }
        }

        match recovery::check(self.last_received.get(), msg_seq_no, is_poss_dup_or_resend) {
            SequenceCheck::Expected => {
                let now = self.time();
                self.timers.on_received(now);
                self.advance_last_received(msg_seq_no);
            }
            SequenceCheck::Gap { expected, received } => {
                warn!(
                    connection_id = %self.connection_id,
                    expected,
                    received,
                    "sequence gap detected"
                );
                self.set_state(SessionState::AwaitingResend);
                let end = received - 1;
                self.resend_target = Some(self.resend_target.map_or(end, |t| t.max(end)));
                let seq = self.new_sent_seq_num();
                self.proxy.resend_request(seq, expected, end);
            }
            SequenceCheck::PossDup => {}
            SequenceCheck::TooLow { expected, received } => {
                self.low_sequence_number(expected, received);
            }
            SequenceCheck::Exhausted => self.sequence_exhausted(msg_seq_no),
        }
    }

    /// Moves `last_received` forward and leaves `AWAITING_RESEND` once the
    /// requested range is covered.
    fn advance_last_received(&mut self, value: u64) {
        self.last_received.set(value);
        if let Some(target) = self.resend_target
            && value >= target
        {
            self.resend_target = None;
            if self.state == SessionState::AwaitingResend {
                info!(connection_id = %self.connection_id, last_received = value, "gap recovered");
                self.set_state(SessionState::Active);
            }
        }
    }

    fn validate_heartbeat(&mut self, heart_bt_int: i64) -> bool {
        if heart_bt_int < 0 {
            let seq = self.new_sent_seq_num();
            self.proxy.negative_heartbeat_logout(seq);
            self.request_disconnect(DisconnectReason::NegativeHeartbeatInterval);
            false
        } else {
            true
        }
    }

    fn validate_sending_time(&mut self, header: &SessionHeader) -> bool {
        let now = self.time();
        let window = self.sending_time_window_ms;
        let valid = header.sending_time.is_some_and(|sent| {
            let sent = sent.as_millis();
            sent < now.saturating_add(window) && sent.saturating_add(window) > now
        });
        if !valid {
            let seq = self.new_sent_seq_num();
            self.proxy.reject_whilst_not_logged_on(
                seq,
                header.msg_seq_num.unwrap_or(0),
                SessionRejectReason::SendingTimeAccuracyProblem,
            );
            self.request_disconnect(DisconnectReason::InvalidSendingTime);
        }
        valid
    }

    fn missing_sequence_number(&mut self) {
        let seq = self.new_sent_seq_num();
        self.proxy.received_message_without_sequence_number(seq);
        self.request_disconnect(DisconnectReason::MissingMsgSeqNum);
    }

    fn low_sequence_number(&mut self, expected: u64, received: u64) {
        warn!(
            connection_id = %self.connection_id,
            expected,
            received,
            "MsgSeqNum too low"
        );
        let seq = self.new_sent_seq_num();
        self.proxy
            .low_sequence_number_logout(seq, expected, received);
        self.request_disconnect(DisconnectReason::MsgSeqNumTooLow);
    }

    fn sequence_exhausted(&mut self, received: u64) {
        warn!(
            connection_id = %self.connection_id,
            received,
            "inbound MsgSeqNum space exhausted"
        );
        let seq = self.new_sent_seq_num();
        self.proxy
            .logout(seq, Some("MsgSeqNum exceeds the maximum value"));
        self.request_disconnect(DisconnectReason::MsgSeqNumExhausted);
    }

    fn send_logout(&mut self, text: Option<&str>) {
        let seq = self.new_sent_seq_num();
        self.proxy.logout(seq, text);
    }

    fn new_sent_seq_num(&mut self) -> u64 {
        let now = self.time();
        self.new_sent_seq_num_at(now)
    }

    fn new_sent_seq_num_at(&mut self, now_ms: u64) -> u64 {
        let seq = self.last_sent.increment();
        self.timers.on_sent(now_ms);
        seq
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(
                connection_id = %self.connection_id,
                from = %self.state,
                to = %state,
                "session state change"
            );
            self.state = state;
        }
    }

    fn invalid_state(&self, expected: SessionState) -> SessionError {
        SessionError::InvalidState {
            expected: expected.to_string(),
            current: self.state.to_string(),
        }
    }

    fn time(&self) -> u64 {
        self.clock.time_ms()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("last_sent", &self.last_sent.get())
            .field("last_received", &self.last_received.get())
            .finish_non_exhaustive()
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! In-memory publication and index.
//!
//! Suitable for tests and for deployments that don't need traffic to
//! survive a restart. Nothing is persisted.

use crate::index::SequenceNumberIndex;
use crate::publication::{MessageHeader, Publication, Record};
use bytes::Bytes;
use fixgate_core::{ConnectionId, DisconnectReason, SessionId, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::trace;

/// Fixed framing overhead charged per record when advancing the position.
pub const RECORD_HEADER_LENGTH: u64 = 32;

#[derive(Debug, Default)]
struct PublicationLog {
    records: Vec<(u64, Record)>,
    position: u64,
    closed: bool,
}

/// In-memory [`Publication`].
#[derive(Debug, Default)]
pub struct MemoryPublication {
    log: Mutex<PublicationLog>,
}

impl MemoryPublication {
    /// Creates an empty publication.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the publication; later appends fail with `StoreError::Closed`.
    pub fn close(&self) {
        self.log.lock().closed = true;
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.log
            .lock()
            .records
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Records ending after `position`, paired with their end positions.
    #[must_use]
    pub fn records_after(&self, position: u64) -> Vec<(u64, Record)> {
        self.log
            .lock()
            .records
            .iter()
            .filter(|(end, _)| *end > position)
            .cloned()
            .collect()
    }

    /// Message records only, in append order.
    #[must_use]
    pub fn messages(&self) -> Vec<(MessageHeader, Bytes)> {
        self.log
            .lock()
            .records
            .iter()
            .filter_map(|(_, r)| match r {
                Record::Message { header, bytes } => Some((header.clone(), bytes.clone())),
                _ => None,
            })
            .collect()
    }

    fn append(&self, record: Record, length: u64) -> Result<u64, StoreError> {
        let mut log = self.log.lock();
        if log.closed {
            return Err(StoreError::Closed);
        }
        log.position += RECORD_HEADER_LENGTH + length;
        let end = log.position;
        log.records.push((end, record));
        Ok(end)
    }
}

impl Publication for MemoryPublication {
    fn save_message(&self, bytes: &[u8], header: &MessageHeader) -> Result<u64, StoreError> {
        self.append(
            Record::Message {
                header: header.clone(),
                bytes: Bytes::copy_from_slice(bytes),
            },
            bytes.len() as u64,
        )
    }

    fn save_logon(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<u64, StoreError> {
        self.append(
            Record::Logon {
                connection_id,
                session_id,
            },
            0,
        )
    }

    fn save_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: DisconnectReason,
    ) -> Result<u64, StoreError> {
        self.append(
            Record::Disconnect {
                connection_id,
                reason,
            },
            0,
        )
    }

    fn position(&self) -> u64 {
        self.log.lock().position
    }
}

#[derive(Debug, Default)]
struct IndexState {
    position: u64,
    last_sequence_numbers: HashMap<SessionId, u64>,
}

/// In-memory [`SequenceNumberIndex`] fed from a [`MemoryPublication`].
#[derive(Debug, Default)]
pub struct MemorySequenceIndex {
    state: RwLock<IndexState>,
}

impl MemorySequenceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every record appended to `publication` since the last call.
    ///
    /// # Returns
    /// The number of records consumed.
    pub fn catch_up(&self, publication: &MemoryPublication) -> usize {
        let mut state = self.state.write();
        let records = publication.records_after(state.position);
        for (end, record) in &records {
            if let Record::Message { header, .. } = record
                && header.session_id.is_known()
                && header.msg_seq_num > 0
            {
                state
                    .last_sequence_numbers
                    .insert(header.session_id, header.msg_seq_num);
            }
            state.position = *end;
        }
        trace!(
            position = state.position,
            records = records.len(),
            "sequence index caught up"
        );
        records.len()
    }
}

impl SequenceNumberIndex for MemorySequenceIndex {
    fn indexed_position(&self) -> u64 {
        self.state.read().position
    }

    fn last_known_sequence_number(&self, session_id: SessionId) -> Option<u64> {
        self.state
            .read()
            .last_sequence_numbers
            .get(&session_id)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::MsgType;

    fn header(session: u64, seq: u64) -> MessageHeader {
        MessageHeader {
            connection_id: ConnectionId::new(1),
            session_id: SessionId::new(session),
            msg_type: MsgType::Heartbeat,
            msg_seq_num: seq,
        }
    }

    #[test]
    fn test_publication_positions_grow() {
        let publication = MemoryPublication::new();
        assert_eq!(publication.position(), 0);

        let first = publication.save_message(b"abcd", &header(1, 1)).unwrap();
        assert_eq!(first, RECORD_HEADER_LENGTH + 4);

        let second = publication
            .save_logon(ConnectionId::new(1), SessionId::new(1))
            .unwrap();
        assert!(second > first);
        assert_eq!(publication.position(), second);
        assert_eq!(publication.len(), 2);
        assert_eq!(publication.messages().len(), 1);
    }

    #[test]
    fn test_closed_publication_rejects_appends() {
        let publication = MemoryPublication::new();
        publication.close();
        let err = publication
            .save_disconnect(ConnectionId::new(1), DisconnectReason::Logout)
            .unwrap_err();
        assert_eq!(err, StoreError::Closed);
    }

    #[test]
    fn test_index_catch_up_tracks_last_sequence_number() {
        let publication = MemoryPublication::new();
        let index = MemorySequenceIndex::new();

        publication.save_message(b"m", &header(1, 1)).unwrap();
        publication.save_message(b"m", &header(2, 1)).unwrap();
        publication.save_message(b"m", &header(1, 2)).unwrap();
        publication.save_message(b"m", &header(0, 9)).unwrap();

        assert_eq!(index.indexed_position(), 0);
        assert_eq!(index.catch_up(&publication), 4);
        assert_eq!(index.indexed_position(), publication.position());
        assert_eq!(index.last_known_sequence_number(SessionId::new(1)), Some(2));
        assert_eq!(index.last_known_sequence_number(SessionId::new(2)), Some(1));
        assert_eq!(index.last_known_sequence_number(SessionId::UNKNOWN), None);

        assert_eq!(index.catch_up(&publication), 0);
    }
}

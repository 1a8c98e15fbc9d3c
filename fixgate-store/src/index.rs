/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Sequence number index trait definition.

use fixgate_core::SessionId;

/// Durable record of the last sequence number seen per session.
///
/// An index follows exactly one [`Publication`](crate::Publication) and can
/// lag behind it; [`indexed_position`](Self::indexed_position) tells how far
/// it has got.
pub trait SequenceNumberIndex: Send + Sync {
    /// Publication position up to which every record has been indexed.
    fn indexed_position(&self) -> u64;

    /// Last indexed sequence number of a session, if it was ever seen.
    fn last_known_sequence_number(&self, session_id: SessionId) -> Option<u64>;
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Registry of durable session contexts.
//!
//! Binds each composite key to a durable [`SessionId`] and tracks which
//! sessions are currently logged on, so that a second logon for the same
//! key can be refused.

use fixgate_core::{SessionId, Timestamp};
use fixgate_session::CompositeKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Durable state of a logical session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Durable id, reused across reconnects.
    pub session_id: SessionId,
    /// Composite key the id is bound to.
    pub key: CompositeKey,
    /// Time of the last accepted logon.
    pub last_logon_time: Option<Timestamp>,
    /// Time sequence numbers were last reset.
    pub last_sequence_reset_time: Option<Timestamp>,
}

#[derive(Debug)]
struct Registry {
    next_id: u64,
    by_key: HashMap<CompositeKey, SessionContext>,
    active: HashSet<SessionId>,
    reset_pending: HashSet<SessionId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_key: HashMap::new(),
            active: HashSet::new(),
            reset_pending: HashSet::new(),
        }
    }
}

impl Registry {
    fn lookup_or_create(&mut self, key: &CompositeKey) -> &mut SessionContext {
        let next_id = &mut self.next_id;
        self.by_key.entry(key.clone()).or_insert_with(|| {
            let session_id = SessionId::new(*next_id);
            *next_id += 1;
            debug!(%session_id, %key, "allocated session id");
            SessionContext {
                session_id,
                key: key.clone(),
                last_logon_time: None,
                last_sequence_reset_time: None,
            }
        })
    }
}

/// Shared handle to the session context registry.
#[derive(Debug, Clone, Default)]
pub struct SessionContexts {
    registry: Arc<Mutex<Registry>>,
}

impl SessionContexts {
    /// Creates an empty registry; ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the session for `key` as logged on.
    ///
    /// # Returns
    /// The context, or `None` if a session with the same key is already
    /// logged on.
    pub fn on_logon(
        &self,
        key: &CompositeKey,
        now: Timestamp,
        reset_sequence_numbers: bool,
    ) -> Option<SessionContext> {
        let mut registry = self.registry.lock();
        let context = registry.lookup_or_create(key);
        let session_id = context.session_id;
        if registry.active.contains(&session_id) {
            info!(%session_id, %key, "duplicate logon refused");
            return None;
        }

        let context = registry.lookup_or_create(key);
        context.last_logon_time = Some(now);
        if reset_sequence_numbers {
            context.last_sequence_reset_time = Some(now);
        }
        let context = context.clone();
        registry.active.insert(session_id);
        Some(context)
    }

    /// Frees the key of `session_id` for a future logon.
    pub fn on_disconnect(&self, session_id: SessionId) {
        if self.registry.lock().active.remove(&session_id) {
            debug!(%session_id, "session context released");
        }
    }

    /// Records an administrative sequence reset of the session for `key`.
    ///
    /// The next logon of that session starts from sequence number 1
    /// instead of resuming from the indexes.
    ///
    /// # Returns
    /// The updated context, or `None` while the session is logged on.
    pub fn sequence_reset(&self, key: &CompositeKey, now: Timestamp) -> Option<SessionContext> {
        let mut registry = self.registry.lock();
        let context = registry.lookup_or_create(key);
        let session_id = context.session_id;
        if registry.active.contains(&session_id) {
            return None;
        }

        let context = registry.lookup_or_create(key);
        context.last_sequence_reset_time = Some(now);
        let context = context.clone();
        registry.reset_pending.insert(session_id);
        info!(%session_id, %key, "sequence numbers reset");
        Some(context)
    }

    /// Consumes a reset recorded by [`Self::sequence_reset`].
    ///
    /// # Returns
    /// True if the session's next logon must start from sequence number 1.
    pub fn take_pending_reset(&self, session_id: SessionId) -> bool {
        self.registry.lock().reset_pending.remove(&session_id)
    }

    /// Context bound to `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: &CompositeKey) -> Option<SessionContext> {
        self.registry.lock().by_key.get(key).cloned()
    }

    /// Returns true while `session_id` is logged on.
    #[must_use]
    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.registry.lock().active.contains(&session_id)
    }

    /// Number of known contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().by_key.len()
    }

    /// Returns true if no context exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::CompId;

    fn key(remote: &str) -> CompositeKey {
        CompositeKey::new(CompId::new("GATEWAY").unwrap(), CompId::new(remote).unwrap())
    }

    #[test]
    fn test_ids_start_at_one_and_are_reused() {
        let contexts = SessionContexts::new();
        let now = Timestamp::from_millis(1_000);

        let first = contexts.on_logon(&key("A"), now, false).unwrap();
        let second = contexts.on_logon(&key("B"), now, false).unwrap();
        assert_eq!(first.session_id, SessionId::new(1));
        assert_eq!(second.session_id, SessionId::new(2));

        contexts.on_disconnect(first.session_id);
        let again = contexts.on_logon(&key("A"), now, false).unwrap();
        assert_eq!(again.session_id, SessionId::new(1));
        assert_eq!(contexts.len(), 2);
    }

    #[test]
    fn test_duplicate_logon_refused_until_disconnect() {
        let contexts = SessionContexts::new();
        let now = Timestamp::from_millis(1_000);

        let context = contexts.on_logon(&key("A"), now, false).unwrap();
        assert!(contexts.is_active(context.session_id));
        assert!(contexts.on_logon(&key("A"), now, false).is_none());

        contexts.on_disconnect(context.session_id);
        assert!(!contexts.is_active(context.session_id));
        assert!(contexts.on_logon(&key("A"), now, false).is_some());
    }

    #[test]
    fn test_reset_times_are_tracked() {
        let contexts = SessionContexts::new();
        let context = contexts
            .on_logon(&key("A"), Timestamp::from_millis(1_000), true)
            .unwrap();
        assert_eq!(context.last_logon_time, Some(Timestamp::from_millis(1_000)));
        assert_eq!(
            context.last_sequence_reset_time,
            Some(Timestamp::from_millis(1_000))
        );

        assert!(
            contexts
                .sequence_reset(&key("A"), Timestamp::from_millis(2_000))
                .is_none()
        );
        assert!(!contexts.take_pending_reset(context.session_id));

        contexts.on_disconnect(context.session_id);
        let context = contexts
            .sequence_reset(&key("A"), Timestamp::from_millis(5_000))
            .unwrap();
        assert_eq!(
            context.last_sequence_reset_time,
            Some(Timestamp::from_millis(5_000))
        );
        assert_eq!(contexts.lookup(&key("A")), Some(context.clone()));
        assert!(contexts.take_pending_reset(context.session_id));
        assert!(!contexts.take_pending_reset(context.session_id));
    }
}

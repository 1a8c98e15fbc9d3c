/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Sequence number counters.
//!
//! Each counter has exactly one writer, the owning session, and any number of
//! readers (indexers, monitoring). Writes are ordered stores, so readers see
//! the latest value without locks or compare-and-swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Single-writer sequence number cell.
///
/// Not `Clone`: a counter has exactly one writer.
#[derive(Debug)]
pub struct SequenceCounter {
    value: u64,
    published: Arc<AtomicU64>,
}

impl SequenceCounter {
    /// Creates a counter holding `initial`.
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            value: initial,
            published: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Current value, as seen by the writer.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.value
    }

    /// Stores a new value.
    #[inline]
    pub fn set(&mut self, value: u64) {
        self.value = value;
        self.published.store(value, Ordering::Release);
    }

    /// Adds one and returns the new value.
    #[inline]
    pub fn increment(&mut self) -> u64 {
        let next = self.value.saturating_add(1);
        self.set(next);
        next
    }

    /// Returns a lock-free read handle.
    #[must_use]
    pub fn reader(&self) -> CounterReader {
        CounterReader {
            published: Arc::clone(&self.published),
        }
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Read-only view of a [`SequenceCounter`].
#[derive(Debug, Clone)]
pub struct CounterReader {
    published: Arc<AtomicU64>,
}

impl CounterReader {
    /// Latest published value.
    #[inline]
    #[must_use]
    pub fn get(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}

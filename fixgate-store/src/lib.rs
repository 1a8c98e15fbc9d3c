/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate Store
//!
//! Persistence contracts required by the fixgate session engine.
//!
//! This crate provides:
//! - **Publication trait**: Append-only stream of sent or received messages
//! - **SequenceNumberIndex trait**: Durable index of last sequence numbers
//! - **MemoryPublication / MemorySequenceIndex**: In-memory implementations
//!   for tests and single-process deployments

pub mod index;
pub mod memory;
pub mod publication;

pub use index::SequenceNumberIndex;
pub use memory::{MemoryPublication, MemorySequenceIndex};
pub use publication::{MessageHeader, Publication, Record};

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate Session
//!
//! FIX session layer protocol implementation for the fixgate engine.
//!
//! This crate provides:
//! - **State machine**: Per-connection [`Session`] driving logon, heartbeats,
//!   test requests, gap recovery, logout and disconnect
//! - **Sequence recovery**: Pure gap detection and sequence reset rules
//! - **Sequence counters**: Single-writer counters with lock-free readers
//! - **Heartbeat timers**: Absolute deadlines compared against a clock
//! - **Session identity**: Composite keys and pluggable id strategies
//! - **Parser**: Decodes inbound bytes and dispatches to the state machine
//! - **Configuration**: Session configuration options

pub mod config;
pub mod heartbeat;
pub mod identity;
pub mod message;
pub mod parser;
pub mod proxy;
pub mod recovery;
pub mod sequence;
pub mod session;
pub mod state;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use heartbeat::{HEARTBEAT_PAUSE_FACTOR, HeartbeatTimers, TEST_REQ_ID};
pub use identity::{
    CompositeKey, SenderTargetAndSubIdStrategy, SenderTargetIdStrategy, SessionIdStrategy,
};
pub use message::{LogonMessage, OutboundHeader, OutboundMessage, SessionHeader, SessionMessage};
pub use parser::{InboundSummary, SessionParser};
pub use proxy::{DirectSessionProxy, SessionProxy};
pub use recovery::{ResetAction, SequenceCheck};
pub use sequence::{CounterReader, SequenceCounter};
pub use session::{Session, SessionParts, SessionSnapshot};
pub use state::SessionState;

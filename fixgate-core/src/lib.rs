/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate Core
//!
//! Core types, reasons and error definitions shared by every fixgate crate.
//!
//! This crate provides:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Identifiers**: `ConnectionId`, `SessionId`, `CompId`
//! - **Message types**: `MsgType` and the session-level tag numbers
//! - **Reasons**: `DisconnectReason` and `SessionRejectReason`
//! - **Clocks**: The `Clock` contract plus system and manual implementations

pub mod clock;
pub mod error;
pub mod message;
pub mod reason;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DecodeError, EncodeError, FixError, Result, SessionError, StoreError};
pub use message::{MsgType, tags};
pub use reason::{DisconnectReason, SessionRejectReason};
pub use types::{CompId, ConnectionId, SessionId, Timestamp};

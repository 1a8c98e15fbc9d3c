/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate
//!
//! A FIX session engine for Rust.
//!
//! fixgate implements the session layer of the FIX protocol on the acceptor
//! side: logon authentication, sequence number tracking and gap recovery,
//! heartbeats, logout, and a pool of sessions that can be handed over to
//! worker threads and back.
//!
//! ## Features
//!
//! - **Poll driven**: Sessions and pending logons never block; timers are
//!   absolute deadlines compared against the time passed to `poll`
//! - **Asynchronous authentication**: Authenticators answer through a
//!   single-use proxy, now or on a later poll
//! - **Single-owner sessions**: Ownership moves between threads over
//!   channels, never through shared mutable state
//! - **Zero-copy parsing**: Field values reference the original buffer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixgate::prelude::*;
//!
//! let config = EngineBuilder::new()
//!     .with_authenticator(Arc::new(AcceptAllAuthenticator))
//!     .build()?;
//! let mut gateway = GatewaySessions::new(config);
//! gateway.authenticate(connection_id, &logon_bytes, Box::new(stream))?;
//! loop {
//!     gateway.poll(clock.time_ms());
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Identifiers, reasons, clocks and error definitions
//! - [`codec`]: Tag=value encoding and decoding
//! - [`store`]: Publication and sequence number index contracts
//! - [`session`]: Session state machine, recovery rules and parser
//! - [`engine`]: Logon handshake, session contexts and session pool

pub mod core {
    //! Identifiers, reasons, clocks and error definitions.
    pub use fixgate_core::*;
}

pub mod codec {
    //! Tag=value encoding and decoding.
    pub use fixgate_codec::*;
}

pub mod store {
    //! Publication and sequence number index contracts.
    pub use fixgate_store::*;
}

pub mod session {
    //! Session state machine, recovery rules and parser.
    pub use fixgate_session::*;
}

pub mod engine {
    //! Logon handshake, session contexts and session pool.
    pub use fixgate_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixgate_core::{
        Clock, CompId, ConnectionId, DecodeError, DisconnectReason, EncodeError, FixError,
        ManualClock, MsgType, SessionError, SessionId, SessionRejectReason, StoreError,
        SystemClock, Timestamp, tags,
    };

    // Codec
    pub use fixgate_codec::{Decoder, Encoder, RawMessage};

    // Store
    pub use fixgate_store::{
        MemoryPublication, MemorySequenceIndex, MessageHeader, Publication, SequenceNumberIndex,
    };

    // Session
    pub use fixgate_session::{
        CompositeKey, LogonMessage, OutboundMessage, SenderTargetIdStrategy, Session,
        SessionConfig, SessionHeader, SessionIdStrategy, SessionSnapshot, SessionState,
    };

    // Engine
    pub use fixgate_engine::{
        AcceptAllAuthenticator, AuthenticationProxy, Authenticator, EngineBuilder, EngineConfig,
        ErrorHandler, GatewayEvent, GatewaySessions, MemoryChannel, PersistenceLevel,
        ProtocolVariant, SessionInfo, SessionOwner, SessionPersistenceStrategy, TransportChannel,
    };
    pub use std::sync::Arc;
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate Engine
//!
//! Acceptor side of the fixgate session engine.
//!
//! This crate provides:
//! - **Authentication**: Non-blocking logon handshake with pluggable
//!   authenticator, persistence strategy and error handler
//! - **Session contexts**: Durable session ids bound to composite keys
//! - **Session pool**: Gateway-owned sessions, outbound framing and the
//!   admin surface
//! - **Ownership hand-off**: Moving sessions between the gateway and
//!   worker-side [`SessionOwner`]s over channels
//! - **Builder API**: Fluent configuration for engine setup

pub mod authentication;
pub mod builder;
pub mod channel;
pub mod contexts;
pub mod framer;
pub mod handle;
pub mod library;
pub mod sessions;
pub mod strategy;

pub use authentication::{AcceptedLogon, AuthenticationState, LogonOutcome, PendingAcceptorLogon};
pub use builder::{DEFAULT_AUTHENTICATION_TIMEOUT, EngineBuilder, EngineConfig};
pub use channel::{MemoryChannel, TransportChannel};
pub use contexts::{SessionContext, SessionContexts};
pub use framer::{Framer, OutboundFrames, outbound_frames};
pub use handle::{SessionFactory, SessionHandle};
pub use library::SessionOwner;
pub use sessions::{GatewayEvent, GatewaySessions, SessionInfo, SessionOwnerKind};
pub use strategy::{
    AcceptAllAuthenticator, AuthenticationProxy, AuthenticationVerdict, Authenticator,
    ErrorHandler, FixedPersistence, LoggingErrorHandler, PersistenceLevel, ProtocolVariant,
    SessionPersistenceStrategy,
};

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Pluggable collaborators of the acceptor handshake.
//!
//! - [`Authenticator`]: decides whether a logon is accepted, possibly later
//!   and from another thread, through an [`AuthenticationProxy`]
//! - [`SessionPersistenceStrategy`]: decides whether a logon resets or
//!   resumes sequence numbers
//! - [`ErrorHandler`]: sink for collaborator faults

use fixgate_core::{ConnectionId, SessionError};
use fixgate_session::{LogonMessage, OutboundMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Protocol variant negotiated by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Classic FIX 4.x session layer.
    #[default]
    Fix,
    /// FIXT.1.1 transport session layer.
    Fixt,
}

/// Outcome delivered by an [`AuthenticationProxy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationVerdict {
    /// Logon accepted.
    Accept(ProtocolVariant),
    /// Logon rejected; `message` is sent to the peer before the linger.
    Reject {
        /// Message sent to the peer, typically a Logout.
        message: OutboundMessage,
        /// Time to keep the connection open once the message is written.
        linger_timeout_ms: u64,
    },
}

/// Single-use handle through which an [`Authenticator`] reports its verdict.
///
/// Both `accept` and `reject` consume the proxy, so a verdict is delivered
/// at most once. Dropping the proxy without a verdict fails the logon.
#[derive(Debug)]
pub struct AuthenticationProxy {
    connection_id: ConnectionId,
    sender: oneshot::Sender<AuthenticationVerdict>,
}

impl AuthenticationProxy {
    pub(crate) fn channel(
        connection_id: ConnectionId,
    ) -> (Self, oneshot::Receiver<AuthenticationVerdict>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                connection_id,
                sender,
            },
            receiver,
        )
    }

    /// Connection the logon arrived on.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Accepts the logon with the default protocol variant.
    pub fn accept(self) {
        self.accept_with(ProtocolVariant::default());
    }

    /// Accepts the logon with `variant`.
    pub fn accept_with(self, variant: ProtocolVariant) {
        self.deliver(AuthenticationVerdict::Accept(variant));
    }

    /// Rejects the logon, sending `message` and then lingering for
    /// `linger_timeout_ms` before closing the connection.
    ///
    /// # Errors
    /// Returns `SessionError::NegativeLingerTimeout` for a negative linger.
    /// The proxy is consumed either way, so the logon then fails as if the
    /// authenticator had given up.
    pub fn reject(self, message: OutboundMessage, linger_timeout_ms: i64) -> Result<(), SessionError> {
        let linger_timeout_ms = u64::try_from(linger_timeout_ms)
            .map_err(|_| SessionError::NegativeLingerTimeout { linger_timeout_ms })?;
        self.deliver(AuthenticationVerdict::Reject {
            message,
            linger_timeout_ms,
        });
        Ok(())
    }

    fn deliver(self, verdict: AuthenticationVerdict) {
        if self.sender.send(verdict).is_err() {
            debug!(
                connection_id = %self.connection_id,
                "authentication verdict arrived after the logon was abandoned"
            );
        }
    }
}

/// Decides whether an inbound logon is accepted.
///
/// Implementations may answer synchronously inside `authenticate` or move
/// the proxy elsewhere (another thread, a tokio task) and answer later.
pub trait Authenticator: Send + Sync {
    /// Starts authenticating `logon`.
    ///
    /// # Errors
    /// Any error is a strategy fault: it is reported to the
    /// [`ErrorHandler`] and the logon is rejected unless a reject was
    /// already issued.
    fn authenticate(&self, logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()>;
}

/// Accepts every logon.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllAuthenticator;

impl Authenticator for AcceptAllAuthenticator {
    fn authenticate(&self, _logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()> {
        proxy.accept();
        Ok(())
    }
}

/// Whether a logon resets or resumes sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceLevel {
    /// Sequence numbers restart at 1 on every logon.
    ResetSequenceNumbers,
    /// Sequence numbers resume from the durable index.
    IndexedPersistent,
}

/// Resolves the [`PersistenceLevel`] of a logon.
pub trait SessionPersistenceStrategy: Send + Sync {
    /// Persistence level for `logon`.
    ///
    /// # Errors
    /// Any error is a strategy fault and falls back to
    /// [`PersistenceLevel::ResetSequenceNumbers`].
    fn persistence_level(&self, logon: &LogonMessage) -> anyhow::Result<PersistenceLevel>;
}

/// Same persistence level for every logon.
#[derive(Debug, Clone, Copy)]
pub struct FixedPersistence(pub PersistenceLevel);

impl SessionPersistenceStrategy for FixedPersistence {
    fn persistence_level(&self, _logon: &LogonMessage) -> anyhow::Result<PersistenceLevel> {
        Ok(self.0)
    }
}

/// Sink for faults raised by collaborators.
pub trait ErrorHandler: Send + Sync {
    /// Reports `error`.
    fn on_error(&self, error: &anyhow::Error);
}

/// Logs faults with `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, error: &anyhow::Error) {
        error!(error = %format!("{error:#}"), "collaborator fault");
    }
}

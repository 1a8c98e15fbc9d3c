/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session protocol states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol state of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Initiator: logon sent, awaiting the peer's logon.
    Connecting,
    /// Acceptor: transport up, logon not processed yet.
    Connected,
    /// Logged on, steady-state exchange.
    Active,
    /// A gap or test request is outstanding.
    AwaitingResend,
    /// Our logout was sent, awaiting the peer's logout.
    AwaitingLogout,
    /// Terminal: the connection is gone or going.
    Disconnected,
    /// Terminal for this owner: ownership was released.
    Disabled,
}

impl SessionState {
    /// Returns true while the transport is up and the session is usable.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Connecting | Self::Disconnected | Self::Disabled)
    }

    /// Returns true once logon has completed and until logout finishes.
    #[must_use]
    pub const fn is_logged_on(self) -> bool {
        matches!(self, Self::Active | Self::AwaitingResend | Self::AwaitingLogout)
    }

    /// Returns true for states a session never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Disabled)
    }

    /// Upper-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Active => "ACTIVE",
            Self::AwaitingResend => "AWAITING_RESEND",
            Self::AwaitingLogout => "AWAITING_LOGOUT",
            Self::Disconnected => "DISCONNECTED",
            Self::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session identity.
//!
//! A [`CompositeKey`] names a logical session across reconnections. How the
//! key is derived from message headers is pluggable through
//! [`SessionIdStrategy`]:
//! - [`SenderTargetIdStrategy`]: comp ids only
//! - [`SenderTargetAndSubIdStrategy`]: comp ids plus sub ids

use crate::message::{OutboundHeader, SessionHeader};
use fixgate_core::{CompId, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pair of counterparty identifiers, seen from our side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    local_comp_id: CompId,
    local_sub_id: Option<String>,
    remote_comp_id: CompId,
    remote_sub_id: Option<String>,
}

impl CompositeKey {
    /// Creates a key from comp ids only.
    #[must_use]
    pub const fn new(local_comp_id: CompId, remote_comp_id: CompId) -> Self {
        Self {
            local_comp_id,
            local_sub_id: None,
            remote_comp_id,
            remote_sub_id: None,
        }
    }

    /// Adds sub ids to the key.
    #[must_use]
    pub fn with_sub_ids(mut self, local: Option<String>, remote: Option<String>) -> Self {
        self.local_sub_id = local;
        self.remote_sub_id = remote;
        self
    }

    /// Our comp id.
    #[must_use]
    pub const fn local_comp_id(&self) -> &CompId {
        &self.local_comp_id
    }

    /// Our sub id, if part of the key.
    #[must_use]
    pub fn local_sub_id(&self) -> Option<&str> {
        self.local_sub_id.as_deref()
    }

    /// The counterparty's comp id.
    #[must_use]
    pub const fn remote_comp_id(&self) -> &CompId {
        &self.remote_comp_id
    }

    /// The counterparty's sub id, if part of the key.
    #[must_use]
    pub fn remote_sub_id(&self) -> Option<&str> {
        self.remote_sub_id.as_deref()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local_comp_id)?;
        if let Some(sub) = &self.local_sub_id {
            write!(f, "/{sub}")?;
        }
        write!(f, "->{}", self.remote_comp_id)?;
        if let Some(sub) = &self.remote_sub_id {
            write!(f, "/{sub}")?;
        }
        Ok(())
    }
}

/// Derives and checks composite keys.
pub trait SessionIdStrategy: Send + Sync {
    /// Key for an inbound logon: our side is the logon's target.
    ///
    /// # Errors
    /// Returns `SessionError::MissingCompId` if either comp id is absent or
    /// invalid.
    fn on_accept_logon(&self, header: &SessionHeader) -> Result<CompositeKey, SessionError>;

    /// Key for a logon we initiate.
    fn on_initiate_logon(
        &self,
        sender_comp_id: &CompId,
        sender_sub_id: Option<&str>,
        target_comp_id: &CompId,
        target_sub_id: Option<&str>,
    ) -> CompositeKey;

    /// Fills the routing fields of an outbound header.
    fn setup_header(&self, key: &CompositeKey, header: &mut OutboundHeader);

    /// Returns true if an inbound header belongs to the session `key`.
    fn validate(&self, key: &CompositeKey, header: &SessionHeader) -> bool;
}

fn comp_id(value: Option<&String>) -> Result<CompId, SessionError> {
    value
        .and_then(|v| CompId::new(v))
        .ok_or(SessionError::MissingCompId)
}

/// Keys on SenderCompID and TargetCompID.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderTargetIdStrategy;

impl SessionIdStrategy for SenderTargetIdStrategy {
    fn on_accept_logon(&self, header: &SessionHeader) -> Result<CompositeKey, SessionError> {
        Ok(CompositeKey::new(
            comp_id(header.target_comp_id.as_ref())?,
            comp_id(header.sender_comp_id.as_ref())?,
        ))
    }

    fn on_initiate_logon(
        &self,
        sender_comp_id: &CompId,
        _sender_sub_id: Option<&str>,
        target_comp_id: &CompId,
        _target_sub_id: Option<&str>,
    ) -> CompositeKey {
        CompositeKey::new(sender_comp_id.clone(), target_comp_id.clone())
    }

    fn setup_header(&self, key: &CompositeKey, header: &mut OutboundHeader) {
        header.sender_comp_id = key.local_comp_id.to_string();
        header.target_comp_id = key.remote_comp_id.to_string();
    }

    fn validate(&self, key: &CompositeKey, header: &SessionHeader) -> bool {
        header.sender_comp_id.as_deref() == Some(key.remote_comp_id.as_str())
            && header.target_comp_id.as_deref() == Some(key.local_comp_id.as_str())
    }
}

/// Keys on comp ids and sub ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderTargetAndSubIdStrategy;

impl SessionIdStrategy for SenderTargetAndSubIdStrategy {
    fn on_accept_logon(&self, header: &SessionHeader) -> Result<CompositeKey, SessionError> {
        SenderTargetIdStrategy
            .on_accept_logon(header)
            .map(|key| key.with_sub_ids(header.target_sub_id.clone(), header.sender_sub_id.clone()))
    }

    fn on_initiate_logon(
        &self,
        sender_comp_id: &CompId,
        sender_sub_id: Option<&str>,
        target_comp_id: &CompId,
        target_sub_id: Option<&str>,
    ) -> CompositeKey {
        CompositeKey::new(sender_comp_id.clone(), target_comp_id.clone()).with_sub_ids(
            sender_sub_id.map(str::to_string),
            target_sub_id.map(str::to_string),
        )
    }

    fn setup_header(&self, key: &CompositeKey, header: &mut OutboundHeader) {
        SenderTargetIdStrategy.setup_header(key, header);
        header.sender_sub_id = key.local_sub_id.clone();
        header.target_sub_id = key.remote_sub_id.clone();
    }

    fn validate(&self, key: &CompositeKey, header: &SessionHeader) -> bool {
        SenderTargetIdStrategy.validate(key, header)
            && header.sender_sub_id == key.remote_sub_id
            && header.target_sub_id == key.local_sub_id
    }
}

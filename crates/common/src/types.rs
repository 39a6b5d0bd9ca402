//! Identifiers and the per-relationship data model.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::crypto::chain::{ChainSecret, Psk};

/// Stable identifier for one configured peer pairing. Doubles as the TOML
/// table key and the path segment in peer protocol URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Application-entity identifier understood by the key-delivery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaeId(String);

impl SaeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SaeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SaeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Which side of a relationship this process plays. Fixed by configuration;
/// there is no election and the two ends must disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Immutable descriptor for one counterpart, built from configuration at
/// startup. One instance per configured peer, for the process lifetime.
#[derive(Debug, Clone)]
pub struct PeerRelationship {
    pub id: RelationshipId,
    pub role: Role,
    /// Base URL of the counterpart's peer protocol endpoint.
    pub peer_url: Url,
    /// Base URL of the local key-delivery endpoint.
    pub key_delivery_url: Url,
    /// Entity identifier this end presents to the key-delivery endpoint.
    pub local_sae_id: SaeId,
    /// Entity identifier of the counterpart's application endpoint.
    pub remote_sae_id: SaeId,
    /// Name of the sink slot the released secret is published under.
    pub alias: String,
    pub rotate_interval: Duration,
    /// How long a responder holds a speculative round open for confirmation.
    pub confirm_timeout: Duration,
}

/// Per-relationship mutable chain state. Single-writer: only the exchange
/// logic for the owning relationship touches it, and only on commit — it is
/// never rolled back.
#[derive(Debug)]
pub struct ChainState {
    pub(crate) secret: ChainSecret,
    pub generation: u64,
    /// None until the first round ever commits; drives NEW vs ROTATE.
    pub committed_at: Option<OffsetDateTime>,
}

impl ChainState {
    pub fn fresh(secret: ChainSecret) -> Self {
        Self {
            secret,
            generation: 0,
            committed_at: None,
        }
    }

    pub fn has_committed(&self) -> bool {
        self.committed_at.is_some()
    }
}

/// The externally usable output of one committed round. Handed to the sink,
/// which owns its copy; the exchange keeps no reference afterwards.
#[derive(Debug, Clone)]
pub struct DerivedSecret {
    pub alias: String,
    pub generation: u64,
    pub psk: Psk,
}

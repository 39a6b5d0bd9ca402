//! Peer protocol messages and the transport contract they travel over.
//!
//! Three request/response contracts, addressed by relationship identifier:
//! REQUEST_NEW and REQUEST_ROTATE return the key identifier chosen by the
//! responder; CONFIRM carries the committed generation and returns an ack.
//! No secret bytes appear in any message.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::key_source::KeyId;

pub const STATUS_OK: &str = "ok";

/// Which opening message a round starts with: NEW when no generation has
/// ever committed on the initiator, ROTATE afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    New,
    Rotate,
}

impl RequestKind {
    pub fn is_new(self) -> bool {
        matches!(self, RequestKind::New)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::New => f.write_str("new"),
            RequestKind::Rotate => f.write_str("rotate"),
        }
    }
}

/// Response to REQUEST_NEW / REQUEST_ROTATE. `key_ID` casing matches the
/// key-delivery wire format the identifier is quoted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyIdResponse {
    pub status: String,
    #[serde(rename = "key_ID")]
    pub key_id: String,
}

impl KeyIdResponse {
    pub fn ok(key_id: &KeyId) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            key_id: key_id.as_str().to_string(),
        }
    }
}

/// Body of a CONFIRM message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmBody {
    pub generation: u64,
}

/// Response to CONFIRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
        }
    }
}

/// Failures surfaced by a peer transport, split by how the exchange must
/// react: `Transport` aborts the round and is retried at the next scheduled
/// rotation; `Rejected` means the peer answered and refused — a protocol
/// error, not retryable within the round.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer unreachable: {0}")]
    Transport(String),
    #[error("peer rejected the request: {0}")]
    Rejected(String),
}

/// Carries exchange messages to the counterpart for one relationship.
/// Implementations are bound to a single relationship at construction.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send REQUEST_NEW or REQUEST_ROTATE; returns the key identifier the
    /// responder minted for this round.
    async fn request_key(&self, kind: RequestKind) -> Result<KeyId, PeerError>;

    /// Send CONFIRM for `generation`.
    async fn confirm(&self, generation: u64) -> Result<(), PeerError>;
}

//! Contract for the one-time key source.
//!
//! The source hands out key material that is consumable exactly once per
//! `(relationship, key id)`: `mint` draws a fresh key and `redeem` retrieves
//! the key the counterpart minted, by identifier. Both remove the key from
//! the source — there is no way to put material back.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use memory::MemoryKeySource;

use crate::types::SaeId;

/// Opaque identifier for one unit of key material, chosen by the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw key bytes from the source. Wiped on drop; never serialized or logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyBytes(Vec<u8>);

impl KeyBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyBytes({} bytes)", self.0.len())
    }
}

/// One unit of consumable key material. Folded into the chain and dropped;
/// never persisted or retransmitted.
#[derive(Debug)]
pub struct KeyMaterial {
    pub key_id: KeyId,
    pub secret: KeyBytes,
}

#[derive(Debug, thiserror::Error)]
pub enum KeySourceError {
    /// The source has no key material left to mint.
    #[error("key store exhausted")]
    Exhausted,
    /// The identifier is unknown or the key was already consumed.
    #[error("key {0} not found or already consumed")]
    NotFound(KeyId),
    #[error("key source unreachable: {0}")]
    Transport(String),
    #[error("malformed key source response: {0}")]
    Malformed(String),
}

/// A key-delivery endpoint, real or simulated.
///
/// Both operations consume: a minted key exists only in the returned
/// material plus one pending redemption by the counterpart.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Generate and remove a fresh key from the source's store.
    async fn mint(&self, requester: &SaeId, target: &SaeId)
        -> Result<KeyMaterial, KeySourceError>;

    /// Retrieve and remove the key matching `key_id`.
    async fn redeem(
        &self,
        requester: &SaeId,
        target: &SaeId,
        key_id: &KeyId,
    ) -> Result<KeyBytes, KeySourceError>;
}

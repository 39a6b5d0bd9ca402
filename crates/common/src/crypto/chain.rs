//! Chained key derivation
//!
//! Each completed exchange round folds one-time key material into a rolling
//! internal secret and releases a fresh pre-shared secret:
//!
//! `(S_{n+1}, D_n) = SHA3-512(domain ‖ S_n ‖ K_n ‖ id_n)`, split into two
//! disjoint 32-byte halves. The internal half never leaves the process; the
//! released half is what downstream tunnels consume. Both ends computing this
//! over identical inputs is the whole agreement mechanism — no secret bytes
//! ever cross the wire.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha3::{Digest, Sha3_256, Sha3_512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::key_source::KeyMaterial;

/// Size of the internal chain secret and of the released secret, in bytes.
pub const SECRET_SIZE: usize = 32;

/// Version label mixed into every initial chain secret. Bumping this is a
/// protocol break: two ends with different labels never converge.
pub const PROTOCOL_LABEL: &str = "qpskd v1";

// Domain-separation prefixes. Labels, genesis states, and round advances
// must never produce colliding inputs to the hash.
const LABEL_DOMAIN: &[u8] = b"qpskd v1 label";
const GENESIS_DOMAIN: &[u8] = b"qpskd v1 genesis";
const ADVANCE_DOMAIN: &[u8] = b"qpskd v1 advance";

/// The rolling internal secret for one relationship.
///
/// Never serialized, logged, or released outside the process. Comparison is
/// constant-time; the buffer is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainSecret([u8; SECRET_SIZE]);

impl ChainSecret {
    /// Initial secret `S_0` for a relationship: the protocol version label
    /// plus the operator-configured pre-shared seed (an empty seed is valid).
    ///
    /// Both ends of a relationship must be configured with the same seed.
    pub fn genesis(preshared: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(GENESIS_DOMAIN);
        hasher.update(PROTOCOL_LABEL.as_bytes());
        hasher.update(preshared.as_bytes());
        ChainSecret(hasher.finalize().into())
    }
}

impl PartialEq for ChainSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for ChainSecret {}

impl fmt::Debug for ChainSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChainSecret(..)")
    }
}

/// A released pre-shared secret, the external output of one committed round.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Psk([u8; SECRET_SIZE]);

impl Psk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoding used by the key file sink and the WireGuard hook.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl PartialEq for Psk {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Psk {}

impl fmt::Debug for Psk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Psk(..)")
    }
}

/// Derive a secret from a fixed label. Used for protocol-version bound
/// initial states; never from attacker-influenced input.
pub fn derive_label(label: &str) -> ChainSecret {
    let mut hasher = Sha3_256::new();
    hasher.update(LABEL_DOMAIN);
    hasher.update(label.as_bytes());
    ChainSecret(hasher.finalize().into())
}

/// Advance the chain by one generation.
///
/// Deterministic over `(current, material)`; performs no I/O and holds no
/// state. The key bytes are length-framed so `(S, K, id)` triples can never
/// alias each other at the hash input.
pub fn advance(current: &ChainSecret, material: &KeyMaterial) -> (ChainSecret, Psk) {
    let mut hasher = Sha3_512::new();
    hasher.update(ADVANCE_DOMAIN);
    hasher.update(current.0);
    hasher.update((material.secret.len() as u64).to_be_bytes());
    hasher.update(material.secret.as_slice());
    hasher.update(material.key_id.as_str().as_bytes());
    let digest = hasher.finalize();

    let mut next = [0u8; SECRET_SIZE];
    next.copy_from_slice(&digest[..SECRET_SIZE]);
    let mut psk = [0u8; SECRET_SIZE];
    psk.copy_from_slice(&digest[SECRET_SIZE..]);

    (ChainSecret(next), Psk(psk))
}

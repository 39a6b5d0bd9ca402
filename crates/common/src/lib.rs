/**
 * Chained key-derivation engine.
 *  Pure functions over secret byte values; the only
 *  place secret material is transformed.
 */
pub mod crypto;
/**
 * The exchange state machine: per-relationship round
 *  lifecycle, single-flight lease, and the initiator /
 *  responder protocol drivers.
 */
pub mod exchange;
/**
 * Contract for the one-time key source (mint / redeem)
 *  plus a single-use in-memory implementation backing
 *  tests and the simulated key-delivery API.
 */
pub mod key_source;
/**
 * Wire-facing message types for the peer protocol and
 *  the transport contract the exchange drives them over.
 */
pub mod protocol;
/**
 * Helpers for wiring two relationships together
 *  in-process, without a network.
 */
pub mod testkit;
/**
 * Identifiers and the per-relationship data model.
 */
pub mod types;

pub mod prelude {
    pub use crate::crypto::chain::{advance, derive_label, ChainSecret, Psk};
    pub use crate::exchange::{ExchangeError, ProtocolViolation, Relationship, RoundState};
    pub use crate::key_source::{
        KeyBytes, KeyId, KeyMaterial, KeySource, KeySourceError, MemoryKeySource,
    };
    pub use crate::protocol::{
        AckResponse, ConfirmBody, KeyIdResponse, PeerError, PeerTransport, RequestKind,
    };
    pub use crate::types::{
        ChainState, DerivedSecret, PeerRelationship, RelationshipId, Role, SaeId,
    };
}

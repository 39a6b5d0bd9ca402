//! The exchange state machine.
//!
//! One round advances one relationship's chain by one generation. The round
//! lives in a per-relationship slot that doubles as the single-flight lease:
//! while the slot is occupied, every further trigger or incoming request for
//! that relationship is refused.

mod relationship;
mod round;

pub use relationship::Relationship;
pub use round::{ExchangeRound, RoundState};

use crate::key_source::{KeyId, KeySourceError};
use crate::protocol::PeerError;
use crate::types::Role;

/// A violation of the exchange protocol. Aborts the current round; never
/// retried automatically within the round.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("a round is already in flight for this relationship")]
    RoundInFlight,
    #[error("no round in flight that this message applies to")]
    NoRound,
    #[error("confirm carried generation {got}, pending round is generation {expected}")]
    GenerationMismatch { expected: u64, got: u64 },
    #[error("confirmation arrived after the deadline; the round was forfeited")]
    ConfirmExpired,
    #[error("rotate requested before any generation committed")]
    RotateBeforeNew,
    #[error("this endpoint is not the initiator for the relationship")]
    NotInitiator,
    #[error("this endpoint is not the responder for the relationship")]
    NotResponder,
    #[error("one-time key {0} was not available for redemption")]
    KeyConsumed(KeyId),
    #[error("peer rejected the round: {0}")]
    PeerRejected(String),
    #[error("illegal {role} round transition: {from} -> {to}")]
    IllegalTransition {
        role: Role,
        from: RoundState,
        to: RoundState,
    },
}

/// Everything that can end a round without a commit, split the way the
/// scheduler reacts to it (see `is_retryable`).
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Peer or key source unreachable, timed out, or answered garbage.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The key source has no material left.
    #[error("key source exhausted")]
    Exhausted,
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl ExchangeError {
    /// Whether the next scheduled rotation should simply try again. Never
    /// retried immediately — hot-looping against a down peer helps nobody.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExchangeError::Protocol(_))
    }
}

impl From<KeySourceError> for ExchangeError {
    fn from(err: KeySourceError) -> Self {
        match err {
            KeySourceError::Exhausted => ExchangeError::Exhausted,
            KeySourceError::NotFound(key_id) => {
                ExchangeError::Protocol(ProtocolViolation::KeyConsumed(key_id))
            }
            KeySourceError::Transport(msg) | KeySourceError::Malformed(msg) => {
                ExchangeError::Transport(msg)
            }
        }
    }
}

impl From<PeerError> for ExchangeError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::Transport(msg) => ExchangeError::Transport(msg),
            PeerError::Rejected(msg) => {
                ExchangeError::Protocol(ProtocolViolation::PeerRejected(msg))
            }
        }
    }
}

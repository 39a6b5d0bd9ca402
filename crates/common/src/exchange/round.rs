//! One in-flight exchange round.

use std::fmt;
use std::time::Instant;

use crate::crypto::chain::{ChainSecret, Psk};
use crate::key_source::KeyId;
use crate::types::Role;

use super::ProtocolViolation;

/// Where a round currently stands. Idle is the absence of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Initiator: opening request sent, waiting for a key identifier.
    RequestingPeer,
    /// Responder: round created for an incoming request, not yet redeeming.
    AwaitingRequest,
    /// Consuming one-time material from the key source.
    RedeemingKey,
    /// Chain advance staged (responder) or committed (initiator); CONFIRM
    /// outstanding.
    AwaitingConfirmation,
    Committed,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::RequestingPeer => "requesting-peer",
            RoundState::AwaitingRequest => "awaiting-request",
            RoundState::RedeemingKey => "redeeming-key",
            RoundState::AwaitingConfirmation => "awaiting-confirmation",
            RoundState::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Responder-side staged chain advance, applied only when the initiator's
/// CONFIRM arrives in time. Discarding it forfeits the minted key.
#[derive(Debug)]
pub(crate) struct PendingCommit {
    pub(crate) next: ChainSecret,
    pub(crate) psk: Psk,
    pub(crate) generation: u64,
}

/// Transient record of one protocol round. Created when the scheduler fires
/// or a request arrives for an idle relationship; destroyed on completion or
/// expiry.
#[derive(Debug)]
pub struct ExchangeRound {
    pub role: Role,
    state: RoundState,
    pub key_id: Option<KeyId>,
    pub deadline: Instant,
    pub(crate) pending: Option<PendingCommit>,
}

impl ExchangeRound {
    pub fn initiator(deadline: Instant) -> Self {
        Self {
            role: Role::Initiator,
            state: RoundState::RequestingPeer,
            key_id: None,
            deadline,
            pending: None,
        }
    }

    pub fn responder(deadline: Instant) -> Self {
        Self {
            role: Role::Responder,
            state: RoundState::AwaitingRequest,
            key_id: None,
            deadline,
            pending: None,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Move the round forward, checked against the role's transition table.
    pub fn transition(&mut self, to: RoundState) -> Result<(), ProtocolViolation> {
        if Self::permitted(self.role, self.state, to) {
            self.state = to;
            Ok(())
        } else {
            Err(ProtocolViolation::IllegalTransition {
                role: self.role,
                from: self.state,
                to,
            })
        }
    }

    fn permitted(role: Role, from: RoundState, to: RoundState) -> bool {
        use RoundState::*;
        match role {
            Role::Initiator => matches!(
                (from, to),
                (RequestingPeer, RedeemingKey)
                    | (RedeemingKey, AwaitingConfirmation)
                    | (AwaitingConfirmation, Committed)
            ),
            Role::Responder => matches!(
                (from, to),
                (AwaitingRequest, RedeemingKey)
                    | (RedeemingKey, AwaitingConfirmation)
                    | (AwaitingConfirmation, Committed)
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[test]
    fn test_initiator_walks_its_table() {
        let mut round = ExchangeRound::initiator(later());
        assert_eq!(round.state(), RoundState::RequestingPeer);
        round.transition(RoundState::RedeemingKey).unwrap();
        round.transition(RoundState::AwaitingConfirmation).unwrap();
        round.transition(RoundState::Committed).unwrap();
    }

    #[test]
    fn test_responder_walks_its_table() {
        let mut round = ExchangeRound::responder(later());
        assert_eq!(round.state(), RoundState::AwaitingRequest);
        round.transition(RoundState::RedeemingKey).unwrap();
        round.transition(RoundState::AwaitingConfirmation).unwrap();
        round.transition(RoundState::Committed).unwrap();
    }

    #[test]
    fn test_roles_cannot_cross_tables() {
        // An initiator never passes through AwaitingRequest.
        let mut round = ExchangeRound::initiator(later());
        assert!(round.transition(RoundState::AwaitingRequest).is_err());

        // A responder never skips straight to Committed.
        let mut round = ExchangeRound::responder(later());
        round.transition(RoundState::RedeemingKey).unwrap();
        assert!(round.transition(RoundState::Committed).is_err());
    }

    #[test]
    fn test_no_transition_out_of_committed() {
        let mut round = ExchangeRound::initiator(later());
        round.transition(RoundState::RedeemingKey).unwrap();
        round.transition(RoundState::AwaitingConfirmation).unwrap();
        round.transition(RoundState::Committed).unwrap();
        assert!(round.transition(RoundState::RequestingPeer).is_err());
    }

    #[test]
    fn test_deadline_expiry() {
        let now = Instant::now();
        let round = ExchangeRound::responder(now + Duration::from_secs(30));
        assert!(!round.expired(now));
        assert!(round.expired(now + Duration::from_secs(30)));
    }
}

//! Per-relationship exchange driver.
//!
//! Owns the chain state and the round slot for one configured counterpart.
//! The slot is the single-flight lease: it is acquired when a round starts
//! (scheduler trigger or incoming request) and released on completion or
//! expiry, so chain state needs no further locking discipline — only the
//! round that holds the slot ever commits.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use time::OffsetDateTime;

use crate::crypto::chain::{self, ChainSecret};
use crate::key_source::{KeyId, KeyMaterial, KeySource};
use crate::protocol::{PeerTransport, RequestKind};
use crate::types::{ChainState, DerivedSecret, PeerRelationship, RelationshipId, Role};

use super::round::{ExchangeRound, PendingCommit};
use super::{ExchangeError, ProtocolViolation, RoundState};

pub struct Relationship {
    descriptor: PeerRelationship,
    genesis: ChainSecret,
    source: Arc<dyn KeySource>,
    peer: Arc<dyn PeerTransport>,
    state: Mutex<RelationshipState>,
}

struct RelationshipState {
    chain: ChainState,
    /// The single-flight lease. Some = a round is in flight.
    round: Option<ExchangeRound>,
}

/// Clears the round slot unless the round was deliberately parked
/// (responder waiting for CONFIRM). Keeps abort paths honest: any early
/// return or cancellation releases the lease.
struct RoundGuard<'a> {
    relationship: &'a Relationship,
    armed: bool,
}

impl RoundGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.relationship.lock().round = None;
        }
    }
}

impl Relationship {
    /// Build the entry for one configured counterpart. The chain starts at
    /// the genesis secret for the given pre-shared seed, generation 0,
    /// nothing committed.
    pub fn new(
        descriptor: PeerRelationship,
        preshared: &str,
        source: Arc<dyn KeySource>,
        peer: Arc<dyn PeerTransport>,
    ) -> Self {
        let genesis = ChainSecret::genesis(preshared);
        let chain = ChainState::fresh(genesis.clone());
        Self {
            descriptor,
            genesis,
            source,
            peer,
            state: Mutex::new(RelationshipState { chain, round: None }),
        }
    }

    pub fn descriptor(&self) -> &PeerRelationship {
        &self.descriptor
    }

    pub fn id(&self) -> &RelationshipId {
        &self.descriptor.id
    }

    pub fn generation(&self) -> u64 {
        self.lock().chain.generation
    }

    pub fn committed_at(&self) -> Option<OffsetDateTime> {
        self.lock().chain.committed_at
    }

    /// Whether the single-flight lease is currently held.
    pub fn round_in_flight(&self) -> bool {
        self.lock().round.is_some()
    }

    pub fn round_state(&self) -> Option<RoundState> {
        self.lock().round.as_ref().map(ExchangeRound::state)
    }

    fn lock(&self) -> MutexGuard<'_, RelationshipState> {
        self.state.lock().expect("relationship state lock poisoned")
    }

    /// Discard a responder round whose confirmation deadline has passed.
    /// The speculative chain state is dropped — the chain does not advance —
    /// and the key minted for the round is forfeited. Returns whether a
    /// round was discarded.
    pub fn expire_stale(&self, now: Instant) -> bool {
        let mut state = self.lock();
        let expired = matches!(
            state.round.as_ref(),
            Some(round)
                if round.role == Role::Responder
                    && round.state() == RoundState::AwaitingConfirmation
                    && round.expired(now)
        );
        if expired {
            state.round = None;
            tracing::warn!(
                relationship = %self.descriptor.id,
                "no confirmation before deadline; discarding staged chain state, minted key forfeited"
            );
        }
        expired
    }

    /// Drive one full round as the initiator.
    ///
    /// Opens with NEW until a first generation has committed, ROTATE after.
    /// The local chain commits as soon as the redeemed key is folded in;
    /// CONFIRM delivery failure is logged but does not roll that back, so a
    /// lost CONFIRM leaves the two ends diverged (known protocol weak point,
    /// no reconciliation exists).
    pub async fn run_initiator_round(
        &self,
        now: Instant,
    ) -> Result<DerivedSecret, ExchangeError> {
        if self.descriptor.role != Role::Initiator {
            return Err(ProtocolViolation::NotInitiator.into());
        }

        let kind = {
            let mut state = self.lock();
            if state.round.is_some() {
                return Err(ProtocolViolation::RoundInFlight.into());
            }
            let kind = if state.chain.has_committed() {
                RequestKind::Rotate
            } else {
                RequestKind::New
            };
            state.round = Some(ExchangeRound::initiator(
                now + self.descriptor.confirm_timeout,
            ));
            kind
        };
        let guard = RoundGuard {
            relationship: self,
            armed: true,
        };

        tracing::debug!(relationship = %self.descriptor.id, %kind, "starting exchange round");

        let key_id = self.peer.request_key(kind).await?;
        self.advance_round(RoundState::RedeemingKey, Some(&key_id))?;

        let secret = self
            .source
            .redeem(
                &self.descriptor.local_sae_id,
                &self.descriptor.remote_sae_id,
                &key_id,
            )
            .await?;
        let material = KeyMaterial { key_id, secret };

        let derived = {
            let mut state = self.lock();
            let base = if kind.is_new() {
                self.genesis.clone()
            } else {
                state.chain.secret.clone()
            };
            let (next, psk) = chain::advance(&base, &material);
            let generation = match kind {
                RequestKind::New => 1,
                RequestKind::Rotate => state.chain.generation + 1,
            };
            if let Some(round) = state.round.as_mut() {
                round.transition(RoundState::AwaitingConfirmation)?;
            }
            state.chain.secret = next;
            state.chain.generation = generation;
            state.chain.committed_at = Some(OffsetDateTime::now_utc());
            DerivedSecret {
                alias: self.descriptor.alias.clone(),
                generation,
                psk,
            }
        };
        // One-time material is folded in; drop it now, never retain it.
        drop(material);

        match self.peer.confirm(derived.generation).await {
            Ok(()) => {
                self.advance_round(RoundState::Committed, None)?;
                tracing::info!(
                    relationship = %self.descriptor.id,
                    generation = derived.generation,
                    "exchange round committed"
                );
            }
            Err(err) => {
                // Committed locally already; if the peer never saw the
                // CONFIRM the chains have diverged and will not reconverge.
                tracing::warn!(
                    relationship = %self.descriptor.id,
                    generation = derived.generation,
                    %err,
                    "confirm delivery failed after local commit; chains may have diverged"
                );
            }
        }

        drop(guard);
        Ok(derived)
    }

    /// Responder half of the opening message.
    ///
    /// Mints a fresh key, stages the chain advance speculatively, and parks
    /// the round until the initiator's CONFIRM (or the deadline). Duplicate
    /// requests while a round is parked are protocol errors — the message
    /// layer is not idempotent.
    pub async fn handle_request(
        &self,
        kind: RequestKind,
        now: Instant,
    ) -> Result<KeyId, ExchangeError> {
        if self.descriptor.role != Role::Responder {
            return Err(ProtocolViolation::NotResponder.into());
        }

        self.expire_stale(now);

        {
            let mut state = self.lock();
            if state.round.is_some() {
                return Err(ProtocolViolation::RoundInFlight.into());
            }
            if !kind.is_new() && !state.chain.has_committed() {
                return Err(ProtocolViolation::RotateBeforeNew.into());
            }
            let mut round = ExchangeRound::responder(now + self.descriptor.confirm_timeout);
            round.transition(RoundState::RedeemingKey)?;
            state.round = Some(round);
        }
        let guard = RoundGuard {
            relationship: self,
            armed: true,
        };

        tracing::debug!(relationship = %self.descriptor.id, %kind, "handling exchange request");

        let material = self
            .source
            .mint(
                &self.descriptor.local_sae_id,
                &self.descriptor.remote_sae_id,
            )
            .await?;
        let key_id = material.key_id.clone();

        {
            let mut state = self.lock();
            let base = if kind.is_new() {
                self.genesis.clone()
            } else {
                state.chain.secret.clone()
            };
            let (next, psk) = chain::advance(&base, &material);
            let generation = if kind.is_new() {
                1
            } else {
                state.chain.generation + 1
            };
            if let Some(round) = state.round.as_mut() {
                round.key_id = Some(key_id.clone());
                round.pending = Some(PendingCommit {
                    next,
                    psk,
                    generation,
                });
                round.transition(RoundState::AwaitingConfirmation)?;
            }
        }
        drop(material);

        // Park the round: the lease stays held until CONFIRM or expiry.
        guard.disarm();
        tracing::debug!(
            relationship = %self.descriptor.id,
            "chain advance staged, awaiting confirmation"
        );
        Ok(key_id)
    }

    /// Responder half of CONFIRM: finalize the parked round.
    ///
    /// Requires a round in AwaitingConfirmation whose deadline has not
    /// passed and whose staged generation matches. Any mismatch aborts the
    /// round without advancing the chain.
    pub fn handle_confirm(
        &self,
        generation: u64,
        now: Instant,
    ) -> Result<DerivedSecret, ExchangeError> {
        if self.descriptor.role != Role::Responder {
            return Err(ProtocolViolation::NotResponder.into());
        }

        let mut state = self.lock();
        let Some(round) = state.round.as_mut() else {
            return Err(ProtocolViolation::NoRound.into());
        };
        if round.state() != RoundState::AwaitingConfirmation {
            return Err(ProtocolViolation::NoRound.into());
        }
        if round.expired(now) {
            state.round = None;
            tracing::warn!(
                relationship = %self.descriptor.id,
                "confirmation after deadline; round already forfeited"
            );
            return Err(ProtocolViolation::ConfirmExpired.into());
        }

        let Some(pending) = round.pending.take() else {
            state.round = None;
            return Err(ProtocolViolation::NoRound.into());
        };
        if pending.generation != generation {
            let expected = pending.generation;
            state.round = None;
            return Err(ProtocolViolation::GenerationMismatch {
                expected,
                got: generation,
            }
            .into());
        }

        round.transition(RoundState::Committed)?;
        state.chain.secret = pending.next;
        state.chain.generation = pending.generation;
        state.chain.committed_at = Some(OffsetDateTime::now_utc());
        state.round = None;

        tracing::info!(
            relationship = %self.descriptor.id,
            generation,
            "exchange round committed"
        );

        Ok(DerivedSecret {
            alias: self.descriptor.alias.clone(),
            generation,
            psk: pending.psk,
        })
    }

    /// Record a state transition on the in-flight round.
    fn advance_round(
        &self,
        to: RoundState,
        key_id: Option<&KeyId>,
    ) -> Result<(), ProtocolViolation> {
        let mut state = self.lock();
        match state.round.as_mut() {
            Some(round) => {
                if let Some(key_id) = key_id {
                    round.key_id = Some(key_id.clone());
                }
                round.transition(to)
            }
            None => Err(ProtocolViolation::NoRound),
        }
    }
}

//! Rotation scheduler.
//!
//! One timer task per relationship, nothing shared between them. Initiator
//! timers drive full rounds; responder timers only sweep expired rounds so
//! a forfeited confirmation gets logged near its deadline rather than
//! whenever the next message happens to arrive.

use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use common::prelude::{ExchangeError, ProtocolViolation, Role};

use crate::state::{PeerHandle, State};

/// Spawn the per-relationship timer tasks. Each task runs until the
/// shutdown signal fires.
pub fn spawn(state: &State, shutdown_rx: watch::Receiver<()>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for handle in state.relationships() {
        let handle = handle.clone();
        let rx = shutdown_rx.clone();
        let task = match handle.relationship.descriptor().role {
            Role::Initiator => tokio::spawn(initiator_loop(handle, rx)),
            Role::Responder => tokio::spawn(responder_loop(handle, rx)),
        };
        handles.push(task);
    }
    handles
}

async fn initiator_loop(handle: PeerHandle, mut shutdown_rx: watch::Receiver<()>) {
    let descriptor = handle.relationship.descriptor().clone();
    let mut ticker = tokio::time::interval(descriptor.rotate_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        relationship = %descriptor.id,
        interval_secs = descriptor.rotate_interval.as_secs(),
        "rotation timer started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => rotate_once(&handle).await,
            _ = shutdown_rx.changed() => {
                tracing::debug!(relationship = %descriptor.id, "rotation timer stopping");
                break;
            }
        }
    }
}

/// Run one initiator round and publish the result. Also what the testkit
/// calls to rotate deterministically without waiting on timers.
pub async fn rotate_once(handle: &PeerHandle) {
    let relationship = &handle.relationship;
    match relationship.run_initiator_round(Instant::now()).await {
        Ok(derived) => {
            if let Err(err) = handle.sink.publish(&derived).await {
                tracing::error!(
                    relationship = %relationship.id(),
                    generation = derived.generation,
                    %err,
                    "failed to publish rotated secret"
                );
            }
        }
        Err(ExchangeError::Protocol(ProtocolViolation::RoundInFlight)) => {
            // No queueing: a slow round absorbs this firing entirely.
            tracing::warn!(
                relationship = %relationship.id(),
                "rotation fired while a round is in flight; skipping this rotation"
            );
        }
        Err(err) if err.is_retryable() => {
            tracing::warn!(
                relationship = %relationship.id(),
                %err,
                "round aborted; retrying at the next scheduled rotation"
            );
        }
        Err(err) => {
            tracing::error!(
                relationship = %relationship.id(),
                %err,
                "round aborted by protocol violation"
            );
        }
    }
}

async fn responder_loop(handle: PeerHandle, mut shutdown_rx: watch::Receiver<()>) {
    let descriptor = handle.relationship.descriptor().clone();
    let mut ticker = tokio::time::interval(descriptor.confirm_timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                handle.relationship.expire_stale(Instant::now());
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!(relationship = %descriptor.id, "expiry sweep stopping");
                break;
            }
        }
    }
}

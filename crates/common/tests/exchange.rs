//! End-to-end exercises of the exchange state machine over an in-process
//! pair: commit agreement, single-use consumption, single-flight, and the
//! forfeit-on-timeout responder path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use common::prelude::*;
use common::testkit::{linked_pair, test_descriptor, DirectTransport};

#[tokio::test]
async fn test_full_round_agrees_on_both_ends() {
    let pair = linked_pair("", None);

    let derived = pair
        .initiator
        .run_initiator_round(Instant::now())
        .await
        .unwrap();

    assert_eq!(derived.generation, 1);
    assert_eq!(pair.initiator.generation(), 1);
    assert_eq!(pair.responder.generation(), 1);
    assert!(pair.initiator.committed_at().is_some());
    assert!(pair.responder.committed_at().is_some());

    let commits = pair.responder_commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].generation, 1);
    // Both ends agree on the released secret without it ever crossing the
    // wire: only the key identifier did.
    assert_eq!(commits[0].psk, derived.psk);
}

#[tokio::test]
async fn test_rotation_produces_fresh_secrets() {
    let pair = linked_pair("", None);

    let first = pair
        .initiator
        .run_initiator_round(Instant::now())
        .await
        .unwrap();
    let second = pair
        .initiator
        .run_initiator_round(Instant::now())
        .await
        .unwrap();

    assert_eq!(first.generation, 1);
    assert_eq!(second.generation, 2);
    assert_ne!(first.psk, second.psk);

    let commits = pair.responder_commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].psk, second.psk);

    // Two rounds consumed exactly two one-time keys, none left dangling.
    assert_eq!(pair.source.minted(), 2);
    assert_eq!(pair.source.outstanding(), 0);
}

#[tokio::test]
async fn test_confirm_timeout_leaves_responder_chain_unchanged() {
    let pair = linked_pair("", None);
    let start = Instant::now();
    let confirm_timeout = pair.responder.descriptor().confirm_timeout;

    pair.responder
        .handle_request(RequestKind::New, start)
        .await
        .unwrap();
    assert!(pair.responder.round_in_flight());
    assert_eq!(pair.responder.generation(), 0);

    // Deadline passes with no CONFIRM: staged state is discarded, the chain
    // has not advanced, and the minted key is gone for good.
    assert!(pair.responder.expire_stale(start + confirm_timeout));
    assert!(!pair.responder.round_in_flight());
    assert_eq!(pair.responder.generation(), 0);
    assert!(pair.responder.committed_at().is_none());

    // The next round cannot reuse the forfeited key; it mints a fresh one.
    pair.responder
        .handle_request(RequestKind::New, Instant::now())
        .await
        .unwrap();
    assert_eq!(pair.source.minted(), 2);
}

#[tokio::test]
async fn test_confirm_after_deadline_is_rejected() {
    let pair = linked_pair("", None);
    let start = Instant::now();
    let confirm_timeout = pair.responder.descriptor().confirm_timeout;

    pair.responder
        .handle_request(RequestKind::New, start)
        .await
        .unwrap();

    let late = pair
        .responder
        .handle_confirm(1, start + confirm_timeout);
    assert!(matches!(
        late,
        Err(ExchangeError::Protocol(ProtocolViolation::ConfirmExpired))
    ));
    assert!(!pair.responder.round_in_flight());
    assert_eq!(pair.responder.generation(), 0);
}

#[tokio::test]
async fn test_duplicate_request_is_a_protocol_error() {
    let pair = linked_pair("", None);
    let now = Instant::now();

    pair.responder
        .handle_request(RequestKind::New, now)
        .await
        .unwrap();

    let duplicate = pair.responder.handle_request(RequestKind::New, now).await;
    assert!(matches!(
        duplicate,
        Err(ExchangeError::Protocol(ProtocolViolation::RoundInFlight))
    ));

    // The first round is unaffected and still confirmable.
    let derived = pair.responder.handle_confirm(1, now).unwrap();
    assert_eq!(derived.generation, 1);
    assert_eq!(pair.responder.generation(), 1);
}

#[tokio::test]
async fn test_rotate_before_any_commit_is_rejected() {
    let pair = linked_pair("", None);

    let result = pair
        .responder
        .handle_request(RequestKind::Rotate, Instant::now())
        .await;
    assert!(matches!(
        result,
        Err(ExchangeError::Protocol(ProtocolViolation::RotateBeforeNew))
    ));
    assert!(!pair.responder.round_in_flight());
}

#[tokio::test]
async fn test_confirm_without_round_is_a_protocol_error() {
    let pair = linked_pair("", None);

    let result = pair.responder.handle_confirm(1, Instant::now());
    assert!(matches!(
        result,
        Err(ExchangeError::Protocol(ProtocolViolation::NoRound))
    ));
}

#[tokio::test]
async fn test_confirm_generation_mismatch_aborts_round() {
    let pair = linked_pair("", None);
    let now = Instant::now();

    pair.responder
        .handle_request(RequestKind::New, now)
        .await
        .unwrap();

    let result = pair.responder.handle_confirm(7, now);
    assert!(matches!(
        result,
        Err(ExchangeError::Protocol(
            ProtocolViolation::GenerationMismatch { expected: 1, got: 7 }
        ))
    ));
    // Aborted, not advanced.
    assert!(!pair.responder.round_in_flight());
    assert_eq!(pair.responder.generation(), 0);
}

#[tokio::test]
async fn test_exhausted_source_aborts_round_and_returns_to_idle() {
    let pair = linked_pair("", Some(0));

    let result = pair.initiator.run_initiator_round(Instant::now()).await;
    let err = result.unwrap_err();
    assert!(err.is_retryable());

    // Both ends are idle again; the next scheduled firing retries on its own.
    assert!(!pair.initiator.round_in_flight());
    assert!(!pair.responder.round_in_flight());
    assert_eq!(pair.initiator.generation(), 0);
    assert_eq!(pair.responder.generation(), 0);
}

#[tokio::test]
async fn test_restarted_initiator_reconverges_via_new() {
    let pair = linked_pair("", None);

    let first = pair
        .initiator
        .run_initiator_round(Instant::now())
        .await
        .unwrap();
    assert_eq!(pair.responder.generation(), 1);

    // A replacement initiator with no chain history opens with NEW; the
    // responder resets to the genesis base and both ends land on a shared
    // generation 1 again.
    let link = Arc::new(DirectTransport::new());
    let restarted = Arc::new(Relationship::new(
        test_descriptor(Role::Initiator, Duration::from_secs(30)),
        "",
        Arc::new(pair.source.clone()),
        link.clone(),
    ));
    link.bind(pair.responder.clone());

    let rejoined = restarted
        .run_initiator_round(Instant::now())
        .await
        .unwrap();
    assert_eq!(rejoined.generation, 1);
    assert_eq!(pair.responder.generation(), 1);

    let commits = link.counterpart_commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].psk, rejoined.psk);
    assert_ne!(commits[0].psk, first.psk);
}

/// Transport that stalls the opening request, so concurrent triggers overlap.
struct SlowTransport {
    inner: Arc<DirectTransport>,
    delay: Duration,
}

#[async_trait]
impl PeerTransport for SlowTransport {
    async fn request_key(&self, kind: RequestKind) -> Result<KeyId, PeerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.request_key(kind).await
    }

    async fn confirm(&self, generation: u64) -> Result<(), PeerError> {
        self.inner.confirm(generation).await
    }
}

#[tokio::test]
async fn test_at_most_one_round_in_flight_per_relationship() {
    let source = MemoryKeySource::unbounded();
    let link = Arc::new(DirectTransport::new());
    let responder_link = Arc::new(DirectTransport::new());

    let initiator = Arc::new(Relationship::new(
        test_descriptor(Role::Initiator, Duration::from_secs(30)),
        "",
        Arc::new(source.clone()),
        Arc::new(SlowTransport {
            inner: link.clone(),
            delay: Duration::from_millis(100),
        }),
    ));
    let responder = Arc::new(Relationship::new(
        test_descriptor(Role::Responder, Duration::from_secs(30)),
        "",
        Arc::new(source.clone()),
        responder_link.clone(),
    ));
    link.bind(responder.clone());
    responder_link.bind(initiator.clone());

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let initiator = initiator.clone();
        tasks.push(tokio::spawn(async move {
            initiator.run_initiator_round(Instant::now()).await
        }));
    }

    let mut committed = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => committed += 1,
            Err(ExchangeError::Protocol(ProtocolViolation::RoundInFlight)) => refused += 1,
            Err(other) => panic!("unexpected round outcome: {other}"),
        }
    }

    // Exactly one trigger held the lease; the rest were skipped, not queued.
    assert_eq!(committed, 1);
    assert_eq!(refused, 4);
    assert_eq!(initiator.generation(), 1);
    assert_eq!(responder.generation(), 1);
}

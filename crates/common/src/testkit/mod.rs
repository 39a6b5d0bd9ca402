//! Helpers for exercising the exchange without a network.
//!
//! `linked_pair` wires an initiator and a responder relationship over a
//! shared in-memory key source; `DirectTransport` delivers peer messages by
//! invoking the counterpart in-process, mapping exchange failures the same
//! way the HTTP transport maps status codes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::exchange::{ExchangeError, Relationship};
use crate::key_source::{KeyId, MemoryKeySource};
use crate::protocol::{PeerError, PeerTransport, RequestKind};
use crate::types::{DerivedSecret, PeerRelationship, RelationshipId, Role, SaeId};

/// Delivers peer messages by calling the counterpart relationship directly.
///
/// Bound after construction (the two ends reference each other). Derived
/// secrets the counterpart commits on CONFIRM are recorded for assertions,
/// standing in for the counterpart's sink.
pub struct DirectTransport {
    target: Mutex<Option<Arc<Relationship>>>,
    commits: Mutex<Vec<DerivedSecret>>,
}

impl DirectTransport {
    pub fn new() -> Self {
        Self {
            target: Mutex::new(None),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Point this transport at the counterpart relationship.
    pub fn bind(&self, target: Arc<Relationship>) {
        *self.target.lock().expect("transport target lock poisoned") = Some(target);
    }

    /// Derived secrets the counterpart committed via CONFIRM, in order.
    pub fn counterpart_commits(&self) -> Vec<DerivedSecret> {
        self.commits
            .lock()
            .expect("transport commits lock poisoned")
            .clone()
    }

    fn target(&self) -> Result<Arc<Relationship>, PeerError> {
        self.target
            .lock()
            .expect("transport target lock poisoned")
            .clone()
            .ok_or_else(|| PeerError::Transport("transport not bound to a peer".to_string()))
    }
}

impl Default for DirectTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Same classification the HTTP client applies to response statuses:
/// protocol refusals are rejections, everything else is transport.
fn map_exchange_error(err: ExchangeError) -> PeerError {
    match err {
        ExchangeError::Protocol(violation) => PeerError::Rejected(violation.to_string()),
        ExchangeError::Exhausted => PeerError::Transport("key source exhausted at peer".to_string()),
        ExchangeError::Transport(msg) => PeerError::Transport(msg),
    }
}

#[async_trait]
impl PeerTransport for DirectTransport {
    async fn request_key(&self, kind: RequestKind) -> Result<KeyId, PeerError> {
        let target = self.target()?;
        target
            .handle_request(kind, Instant::now())
            .await
            .map_err(map_exchange_error)
    }

    async fn confirm(&self, generation: u64) -> Result<(), PeerError> {
        let target = self.target()?;
        let derived = target
            .handle_confirm(generation, Instant::now())
            .map_err(map_exchange_error)?;
        self.commits
            .lock()
            .expect("transport commits lock poisoned")
            .push(derived);
        Ok(())
    }
}

/// An initiator and responder wired together in-process.
pub struct LinkedPair {
    pub initiator: Arc<Relationship>,
    pub responder: Arc<Relationship>,
    pub source: MemoryKeySource,
    /// The initiator's transport; holds the responder's committed secrets.
    pub link: Arc<DirectTransport>,
}

impl LinkedPair {
    /// Secrets the responder committed, in generation order.
    pub fn responder_commits(&self) -> Vec<DerivedSecret> {
        self.link.counterpart_commits()
    }
}

/// Descriptor with placeholder endpoints for in-process tests.
pub fn test_descriptor(role: Role, confirm_timeout: Duration) -> PeerRelationship {
    let side = match role {
        Role::Initiator => "a",
        Role::Responder => "b",
    };
    PeerRelationship {
        id: RelationshipId::from("test-pair"),
        role,
        peer_url: url::Url::parse("http://peer.invalid").expect("static url parses"),
        key_delivery_url: url::Url::parse("http://kd.invalid").expect("static url parses"),
        local_sae_id: SaeId::from(match role {
            Role::Initiator => "sae-a",
            Role::Responder => "sae-b",
        }),
        remote_sae_id: SaeId::from(match role {
            Role::Initiator => "sae-b",
            Role::Responder => "sae-a",
        }),
        alias: format!("psk-{side}"),
        rotate_interval: Duration::from_secs(60),
        confirm_timeout,
    }
}

/// Build a linked pair over one shared key source. `capacity` bounds how
/// many keys the source will mint (None = unbounded).
pub fn linked_pair(preshared: &str, capacity: Option<usize>) -> LinkedPair {
    linked_pair_with_timeout(preshared, capacity, Duration::from_secs(30))
}

pub fn linked_pair_with_timeout(
    preshared: &str,
    capacity: Option<usize>,
    confirm_timeout: Duration,
) -> LinkedPair {
    let source = match capacity {
        Some(n) => MemoryKeySource::with_capacity(n),
        None => MemoryKeySource::unbounded(),
    };

    let initiator_link = Arc::new(DirectTransport::new());
    let responder_link = Arc::new(DirectTransport::new());

    let initiator = Arc::new(Relationship::new(
        test_descriptor(Role::Initiator, confirm_timeout),
        preshared,
        Arc::new(source.clone()),
        initiator_link.clone(),
    ));
    let responder = Arc::new(Relationship::new(
        test_descriptor(Role::Responder, confirm_timeout),
        preshared,
        Arc::new(source.clone()),
        responder_link.clone(),
    ));

    initiator_link.bind(responder.clone());
    responder_link.bind(initiator.clone());

    LinkedPair {
        initiator,
        responder,
        source,
        link: initiator_link,
    }
}

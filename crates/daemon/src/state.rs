//! Service state: the relationship table.
//!
//! One entry per configured counterpart, each owning its chain state and
//! round lease; entries never share mutable state with each other. Cheap to
//! clone — handlers, scheduler tasks, and the CLI all hold the same Arc.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;

use common::prelude::{
    KeySource, MemoryKeySource, PeerTransport, Relationship, RelationshipId,
};

use crate::config::Config;
use crate::http_server::api::client::ApiError;
use crate::kd_client::KdClient;
use crate::peer_client::HttpPeerTransport;
use crate::sink::{KeyFolderSink, SecretSink, SinkError, WireguardSink};

/// One relationship plus where its secrets go.
#[derive(Clone)]
pub struct PeerHandle {
    pub relationship: Arc<Relationship>,
    pub sink: Arc<dyn SecretSink>,
}

#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

struct StateInner {
    relationships: HashMap<RelationshipId, PeerHandle>,
    /// Backing store for the simulated key-delivery API, when enabled.
    simulator: Option<MemoryKeySource>,
    started_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to build peer client: {0}")]
    PeerClient(#[from] ApiError),
    #[error("failed to prepare key folder: {0}")]
    KeyFolder(#[from] SinkError),
}

impl State {
    pub fn from_config(config: &Config) -> Result<Self, StateError> {
        let simulator = config
            .simulate_key_delivery
            .then(MemoryKeySource::unbounded);

        let mut relationships = HashMap::new();
        for (id, entry) in &config.relationships {
            let descriptor = config.descriptor(id, entry);

            let source: Arc<dyn KeySource> = Arc::new(KdClient::new(
                entry.key_delivery_url.clone(),
                config.http_timeout(),
            )?);
            let peer: Arc<dyn PeerTransport> = Arc::new(HttpPeerTransport::new(
                &entry.peer_url,
                id.clone(),
                config.http_timeout(),
            )?);
            let sink: Arc<dyn SecretSink> = match &entry.wireguard_public_key {
                Some(public_key) => Arc::new(WireguardSink::new(&entry.alias, public_key)),
                None => Arc::new(KeyFolderSink::new(&config.key_folder)?),
            };

            let relationship = Arc::new(Relationship::new(
                descriptor,
                &config.preshared,
                source,
                peer,
            ));
            relationships.insert(id.clone(), PeerHandle { relationship, sink });
        }

        Ok(Self {
            inner: Arc::new(StateInner {
                relationships,
                simulator,
                started_at: OffsetDateTime::now_utc(),
            }),
        })
    }

    pub fn relationship(&self, id: &RelationshipId) -> Option<&PeerHandle> {
        self.inner.relationships.get(id)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &PeerHandle> {
        self.inner.relationships.values()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.relationships.len()
    }

    pub fn simulator(&self) -> Option<&MemoryKeySource> {
        self.inner.simulator.as_ref()
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.inner.started_at
    }
}

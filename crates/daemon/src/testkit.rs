//! In-process daemons for integration testing.
//!
//! `start_pair` boots two daemons on ephemeral ports, cross-configured over
//! one relationship, with the initiator end serving the simulated
//! key-delivery API for both. Rounds can be driven deterministically via
//! `scheduler::rotate_once` or left to the rotation timers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use common::prelude::{RelationshipId, Role, SaeId};

use crate::config::{Config, RelationshipEntry};
use crate::http_server;
use crate::scheduler;
use crate::ServiceState;

/// Relationship id used by every test pair.
pub const PAIR_ID: &str = "pair";
/// Sink alias used on both ends of a test pair.
pub const PAIR_ALIAS: &str = "tunnel";

/// One daemon under test: its state, its listener address, and the scratch
/// key folder its secrets land in.
pub struct TestDaemon {
    pub name: String,
    pub state: ServiceState,
    pub addr: SocketAddr,
    key_dir: tempfile::TempDir,
    shutdown_tx: watch::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl TestDaemon {
    /// Path of the published key file for the pair alias.
    pub fn key_file(&self) -> PathBuf {
        self.key_dir.path().join(format!("{PAIR_ALIAS}.key"))
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

pub struct TestPair {
    pub initiator: TestDaemon,
    pub responder: TestDaemon,
    pub relationship_id: RelationshipId,
}

impl TestPair {
    pub async fn stop(self) {
        self.initiator.stop().await;
        self.responder.stop().await;
    }
}

fn http_url(addr: SocketAddr) -> Result<Url> {
    Ok(Url::parse(&format!("http://{addr}"))?)
}

fn pair_config(
    listen: SocketAddr,
    peer: SocketAddr,
    key_delivery: SocketAddr,
    role: Role,
    simulate_key_delivery: bool,
    key_folder: PathBuf,
    rotate_interval_secs: u64,
) -> Result<Config> {
    let (local_sae, remote_sae) = match role {
        Role::Initiator => ("sae-a", "sae-b"),
        Role::Responder => ("sae-b", "sae-a"),
    };

    let mut relationships = HashMap::new();
    relationships.insert(
        RelationshipId::from(PAIR_ID),
        RelationshipEntry {
            role,
            peer_url: http_url(peer)?,
            key_delivery_url: http_url(key_delivery)?,
            local_sae_id: SaeId::from(local_sae),
            remote_sae_id: SaeId::from(remote_sae),
            alias: PAIR_ALIAS.to_string(),
            wireguard_public_key: None,
        },
    );

    let config = Config {
        bind: listen.ip(),
        port: listen.port(),
        key_folder,
        rotate_interval_secs,
        confirm_timeout_secs: 5,
        http_timeout_secs: 5,
        simulate_key_delivery,
        preshared: "testkit".to_string(),
        log_level: "debug".to_string(),
        log_dir: None,
        relationships,
    };
    config.validate()?;
    Ok(config)
}

async fn start_daemon(
    name: &str,
    listener: TcpListener,
    config: Config,
    spawn_timers: bool,
) -> Result<TestDaemon> {
    let addr = listener.local_addr()?;
    let key_dir = tempfile::TempDir::new()?;
    // State reads the key folder from config; point it at the scratch dir.
    let config = Config {
        key_folder: key_dir.path().to_path_buf(),
        ..config
    };

    let state = ServiceState::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let mut handles = Vec::new();
    let server_config = http_server::Config::new(addr, config.log_level());
    let server_state = state.clone();
    let server_rx = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = http_server::serve(listener, server_config, server_state, server_rx).await
        {
            tracing::error!("test daemon server error: {}", e);
        }
    }));

    if spawn_timers {
        handles.extend(scheduler::spawn(&state, shutdown_rx));
    }

    Ok(TestDaemon {
        name: name.to_string(),
        state,
        addr,
        key_dir,
        shutdown_tx,
        handles,
    })
}

/// Boot a cross-configured pair without rotation timers; tests drive rounds
/// explicitly.
pub async fn start_pair() -> Result<TestPair> {
    start_pair_inner(false, 60).await
}

/// Boot a pair with live rotation timers at the given cadence.
pub async fn start_pair_with_timers(rotate_interval_secs: u64) -> Result<TestPair> {
    start_pair_inner(true, rotate_interval_secs).await
}

async fn start_pair_inner(spawn_timers: bool, rotate_interval_secs: u64) -> Result<TestPair> {
    let listener_a = TcpListener::bind("127.0.0.1:0").await?;
    let listener_b = TcpListener::bind("127.0.0.1:0").await?;
    let addr_a = listener_a.local_addr()?;
    let addr_b = listener_b.local_addr()?;

    // The initiator end hosts the simulated key-delivery API; both ends
    // redeem against the same single-use store.
    let config_a = pair_config(
        addr_a,
        addr_b,
        addr_a,
        Role::Initiator,
        true,
        PathBuf::new(),
        rotate_interval_secs,
    )?;
    let config_b = pair_config(
        addr_b,
        addr_a,
        addr_a,
        Role::Responder,
        false,
        PathBuf::new(),
        rotate_interval_secs,
    )?;

    let initiator = start_daemon("initiator", listener_a, config_a, spawn_timers).await?;
    let responder = start_daemon("responder", listener_b, config_b, spawn_timers).await?;

    Ok(TestPair {
        initiator,
        responder,
        relationship_id: RelationshipId::from(PAIR_ID),
    })
}

/// Poll a condition until it succeeds or times out.
pub async fn eventually<F, Fut>(timeout: Duration, condition: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = std::time::Instant::now();
    let poll_interval = Duration::from_millis(100);

    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                // Transient errors are expected while the pair converges.
                tracing::debug!("eventually condition check error: {}", e);
            }
        }

        if start.elapsed() > timeout {
            return Err(anyhow::anyhow!("condition not met within {:?}", timeout));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

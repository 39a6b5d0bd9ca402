//! Secret sinks.
//!
//! Where released secrets go after a commit. One addressable slot per
//! relationship alias; each publish fully replaces the previous value, so a
//! concurrent reader never sees a torn secret.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use common::prelude::DerivedSecret;

/// Command the WireGuard hook invokes: `wg-set-psk <interface> <public_key>`
/// with the base64 secret on stdin.
pub const WG_SET_PSK_COMMAND: &str = "wg-set-psk";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer update command exited with {0}")]
    Command(std::process::ExitStatus),
}

/// Owns one slot per alias; each publish atomically replaces the slot.
#[async_trait]
pub trait SecretSink: Send + Sync {
    async fn publish(&self, secret: &DerivedSecret) -> Result<(), SinkError>;
}

/// Writes `<folder>/<alias>.key` containing the base64 secret.
///
/// The write goes to a temp file in the same directory which is then
/// renamed over the slot, so readers only ever observe complete values.
#[derive(Debug, Clone)]
pub struct KeyFolderSink {
    folder: PathBuf,
}

impl KeyFolderSink {
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }
}

#[async_trait]
impl SecretSink for KeyFolderSink {
    async fn publish(&self, secret: &DerivedSecret) -> Result<(), SinkError> {
        let path = self.folder.join(format!("{}.key", secret.alias));

        let mut staged = tempfile::NamedTempFile::new_in(&self.folder)?;
        staged.write_all(secret.psk.to_base64().as_bytes())?;
        staged.write_all(b"\n")?;
        staged.persist(&path).map_err(|err| SinkError::Io(err.error))?;

        tracing::info!(
            alias = %secret.alias,
            generation = secret.generation,
            path = %path.display(),
            "published rotated secret"
        );
        Ok(())
    }
}

/// Pipes the secret to the WireGuard peer-update hook for one tunnel peer.
#[derive(Debug, Clone)]
pub struct WireguardSink {
    interface: String,
    public_key: String,
}

impl WireguardSink {
    pub fn new(alias: &str, public_key: impl Into<String>) -> Self {
        Self {
            interface: format!("wg0_{alias}"),
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl SecretSink for WireguardSink {
    async fn publish(&self, secret: &DerivedSecret) -> Result<(), SinkError> {
        let mut child = tokio::process::Command::new(WG_SET_PSK_COMMAND)
            .arg(&self.interface)
            .arg(&self.public_key)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(secret.psk.to_base64().as_bytes())
                .await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(SinkError::Command(status));
        }

        tracing::info!(
            alias = %secret.alias,
            generation = secret.generation,
            interface = %self.interface,
            "applied rotated secret to tunnel"
        );
        Ok(())
    }
}

/// Records published secrets for assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<DerivedSecret>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<DerivedSecret> {
        self.published
            .lock()
            .expect("sink lock poisoned")
            .clone()
    }
}

#[async_trait]
impl SecretSink for MemorySink {
    async fn publish(&self, secret: &DerivedSecret) -> Result<(), SinkError> {
        self.published
            .lock()
            .expect("sink lock poisoned")
            .push(secret.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::prelude::{advance, derive_label, KeyBytes, KeyId, KeyMaterial};

    fn derived(alias: &str, generation: u64, key_id: &str) -> DerivedSecret {
        let (_, psk) = advance(
            &derive_label("sink-test"),
            &KeyMaterial {
                key_id: KeyId::new(key_id),
                secret: KeyBytes::new(vec![generation as u8; 8]),
            },
        );
        DerivedSecret {
            alias: alias.to_string(),
            generation,
            psk,
        }
    }

    #[tokio::test]
    async fn test_key_folder_sink_writes_base64_slot() {
        let dir = tempfile::tempdir().unwrap();
        let sink = KeyFolderSink::new(dir.path()).unwrap();

        let secret = derived("tunnel", 1, "K1");
        sink.publish(&secret).await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("tunnel.key")).unwrap();
        assert_eq!(contents, format!("{}\n", secret.psk.to_base64()));
    }

    #[tokio::test]
    async fn test_key_folder_sink_replaces_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let sink = KeyFolderSink::new(dir.path()).unwrap();

        sink.publish(&derived("tunnel", 1, "K1")).await.unwrap();
        let second = derived("tunnel", 2, "K2");
        sink.publish(&second).await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("tunnel.key")).unwrap();
        assert_eq!(contents, format!("{}\n", second.psk.to_base64()));
        // No staging leftovers beside the slot.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.publish(&derived("tunnel", 1, "K1")).await.unwrap();
        sink.publish(&derived("tunnel", 2, "K2")).await.unwrap();

        let published = sink.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].generation, 1);
        assert_eq!(published[1].generation, 2);
    }
}

//! Daemon configuration.
//!
//! Loaded once at startup from a TOML file; any validation failure is fatal.
//! Every relationship entry pins the full counterpart description — there is
//! no runtime peer discovery.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use common::prelude::{PeerRelationship, RelationshipId, Role, SaeId};

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_rotate_interval_secs() -> u64 {
    120
}

fn default_confirm_timeout_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the peer protocol endpoint listens on.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    pub port: u16,

    /// Directory rotated secrets are published into (one file per alias).
    pub key_folder: PathBuf,

    /// Global rotation cadence, applied to every relationship.
    #[serde(default = "default_rotate_interval_secs")]
    pub rotate_interval_secs: u64,
    /// How long a responder holds a speculative round open for CONFIRM.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Timeout for outbound peer and key-delivery requests.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Serve a process-local simulated key-delivery API under
    /// /api/v1/keys. For lab setups without a physical key source; both
    /// ends then point key_delivery_url at the simulating instance.
    #[serde(default)]
    pub simulate_key_delivery: bool,

    /// Extra seed folded into every relationship's initial chain secret.
    /// Must match on both ends.
    #[serde(default)]
    pub preshared: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (stdout only if not set).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    pub relationships: HashMap<RelationshipId, RelationshipEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipEntry {
    /// Which side of the exchange this end plays. The two ends of a
    /// relationship must be configured with opposite roles.
    pub role: Role,
    /// Base URL of the counterpart's peer protocol endpoint.
    pub peer_url: Url,
    /// Base URL of the local key-delivery endpoint.
    pub key_delivery_url: Url,
    pub local_sae_id: SaeId,
    pub remote_sae_id: SaeId,
    /// Names the published secret slot: `<key_folder>/<alias>.key`.
    pub alias: String,
    /// When set, secrets are piped to the WireGuard peer-update hook for
    /// this public key instead of the key folder.
    #[serde(default)]
    pub wireguard_public_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {err}")]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no relationships configured")]
    NoRelationships,
    #[error("relationship {0}: alias must not be empty")]
    EmptyAlias(RelationshipId),
    #[error("relationship {0}: entity identifiers must not be empty")]
    EmptySaeId(RelationshipId),
    #[error("alias {0} is used by more than one relationship")]
    DuplicateAlias(String),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Load and validate a config file. Called exactly once at startup;
    /// errors here are fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relationships.is_empty() {
            return Err(ConfigError::NoRelationships);
        }
        let mut aliases = HashSet::new();
        for (id, entry) in &self.relationships {
            if entry.alias.is_empty() {
                return Err(ConfigError::EmptyAlias(id.clone()));
            }
            if entry.local_sae_id.as_str().is_empty() || entry.remote_sae_id.as_str().is_empty() {
                return Err(ConfigError::EmptySaeId(id.clone()));
            }
            if !aliases.insert(entry.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias(entry.alias.clone()));
            }
        }
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))?;
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn rotate_interval(&self) -> Duration {
        Duration::from_secs(self.rotate_interval_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::INFO)
    }

    /// Build the immutable per-peer descriptor for one entry.
    pub fn descriptor(&self, id: &RelationshipId, entry: &RelationshipEntry) -> PeerRelationship {
        PeerRelationship {
            id: id.clone(),
            role: entry.role,
            peer_url: entry.peer_url.clone(),
            key_delivery_url: entry.key_delivery_url.clone(),
            local_sae_id: entry.local_sae_id.clone(),
            remote_sae_id: entry.remote_sae_id.clone(),
            alias: entry.alias.clone(),
            rotate_interval: self.rotate_interval(),
            confirm_timeout: self.confirm_timeout(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_toml() -> String {
        r#"
            port = 8451
            key_folder = "/var/lib/qpskd"
            rotate_interval_secs = 120
            preshared = "lab-seed"

            [relationships.site-b]
            role = "initiator"
            peer_url = "http://peer.example:8451"
            key_delivery_url = "http://127.0.0.1:9451"
            local_sae_id = "sae-a"
            remote_sae_id = "sae-b"
            alias = "wg0-site-b"
        "#
        .to_string()
    }

    #[test]
    fn test_parse_and_validate_sample() {
        let config: Config = toml::from_str(&sample_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen_addr().port(), 8451);
        assert_eq!(config.rotate_interval(), Duration::from_secs(120));
        // Defaults fill the rest.
        assert_eq!(config.confirm_timeout(), Duration::from_secs(30));
        assert!(!config.simulate_key_delivery);

        let id = RelationshipId::from("site-b");
        let entry = config.relationships.get(&id).unwrap();
        let descriptor = config.descriptor(&id, entry);
        assert_eq!(descriptor.role, Role::Initiator);
        assert_eq!(descriptor.alias, "wg0-site-b");
    }

    #[test]
    fn test_empty_relationships_rejected() {
        let raw = r#"
            port = 8451
            key_folder = "/var/lib/qpskd"
            [relationships]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoRelationships)
        ));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut raw = sample_toml();
        raw.push_str(
            r#"
            [relationships.site-c]
            role = "responder"
            peer_url = "http://other.example:8451"
            key_delivery_url = "http://127.0.0.1:9451"
            local_sae_id = "sae-a"
            remote_sae_id = "sae-c"
            alias = "wg0-site-b"
        "#,
        );
        let config: Config = toml::from_str(&raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateAlias(alias)) if alias == "wg0-site-b"
        ));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let raw = format!("log_level = \"verbose\"\n{}", sample_toml());
        let config: Config = toml::from_str(&raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let raw = format!("rotation_jitter = 5\n{}", sample_toml());
        assert!(toml::from_str::<Config>(&raw).is_err());
    }
}

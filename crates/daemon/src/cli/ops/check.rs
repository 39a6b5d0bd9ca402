use std::fmt::Write;

use clap::Args;

use qpskd_daemon::{Config, ConfigError};

/// Load and validate the configuration without starting the service.
#[derive(Args, Debug, Clone)]
pub struct Check {}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Check {
    type Error = CheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = Config::load(&ctx.config_path)?;

        let mut out = String::new();
        let _ = writeln!(out, "config ok: {}", ctx.config_path.display());
        let _ = writeln!(out, "listen: {}", config.listen_addr());
        let _ = writeln!(
            out,
            "rotation: every {}s, confirm window {}s",
            config.rotate_interval_secs, config.confirm_timeout_secs
        );
        let _ = writeln!(out, "key folder: {}", config.key_folder.display());
        if config.simulate_key_delivery {
            let _ = writeln!(out, "simulated key delivery: enabled");
        }

        let mut ids: Vec<_> = config.relationships.keys().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let _ = writeln!(out, "relationships: {}", ids.len());
        for id in ids {
            let entry = &config.relationships[id];
            let _ = writeln!(
                out,
                "  {} ({}): peer {} alias {}",
                id, entry.role, entry.peer_url, entry.alias
            );
        }

        Ok(out.trim_end().to_string())
    }
}

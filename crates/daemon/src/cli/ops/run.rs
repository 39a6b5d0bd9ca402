use clap::Args;

use qpskd_daemon::{spawn_service, Config, ConfigError};

#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Override the listen port from the config file
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = RunError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = Config::load(&ctx.config_path)?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if self.log_dir.is_some() {
            config.log_dir = self.log_dir.clone();
        }

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}

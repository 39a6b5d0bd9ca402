pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qpskd")]
#[command(about = "Rolling pre-shared key daemon")]
pub struct Args {
    /// Path to the qpskd config file
    #[arg(
        long,
        global = true,
        env = "QPSKD_CONFIG_FILE",
        default_value = "/etc/qpskd.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: crate::Command,
}

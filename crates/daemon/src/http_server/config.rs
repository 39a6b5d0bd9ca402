use std::net::SocketAddr;

/// Runtime settings for the HTTP server, separate from the file config so
/// the testkit can inject ephemeral listen addresses.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(listen_addr: SocketAddr, log_level: tracing::Level) -> Self {
        Self {
            listen_addr,
            log_level,
        }
    }
}

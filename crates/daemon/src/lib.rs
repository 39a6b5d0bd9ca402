// Service modules (daemon functionality)
pub mod config;
pub mod http_server;
pub mod kd_client;
pub mod peer_client;
pub mod process;
pub mod scheduler;
pub mod sink;
pub mod state;

// In-process daemons for integration tests
pub mod testkit;

// Re-exports for consumers (CLI ops, testkit users)
pub use config::{Config, ConfigError};
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use state::State as ServiceState;

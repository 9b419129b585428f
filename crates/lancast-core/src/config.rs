//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Well-known discovery/transfer port.
pub const DEFAULT_PORT: u16 = 4644;

/// Cadence of the periodic HELLO broadcast.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(60);

/// Engine configuration, read from the settings collaborator at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Display name advertised in HELLO datagrams
    pub nickname: String,

    /// Platform tag advertised in HELLO datagrams
    pub platform: String,

    /// UDP port for discovery broadcasts
    pub discovery_port: u16,

    /// TCP port the inbound transfer listener binds
    pub transfer_port: u16,

    /// Folder received payloads are written under
    pub download_dir: PathBuf,

    /// Periodic HELLO cadence
    pub announce_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nickname: whoami(),
            platform: std::env::consts::OS.to_string(),
            discovery_port: DEFAULT_PORT,
            transfer_port: DEFAULT_PORT,
            download_dir: PathBuf::from("."),
            announce_interval: ANNOUNCE_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Set both ports at once, keeping the rest.
    #[must_use]
    pub fn with_ports(mut self, discovery_port: u16, transfer_port: u16) -> Self {
        self.discovery_port = discovery_port;
        self.transfer_port = transfer_port;
        self
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "lancast".to_string())
}

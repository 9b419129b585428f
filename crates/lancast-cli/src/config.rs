//! CLI configuration file handling.
//!
//! Lancast reads `~/.config/lancast/config.toml` when present; every field
//! has a default so a missing file just means defaults. Command-line flags
//! override file values.

use anyhow::{Context, Result};
use lancast_core::{EngineConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name advertised to the network
    pub nickname: Option<String>,

    /// Folder received payloads are saved under
    pub download_dir: Option<PathBuf>,

    /// Discovery and transfer port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nickname: None,
            download_dir: None,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lancast")
            .join("config.toml")
    }

    /// Load from a specific path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default path if it exists, defaults otherwise.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Sanity-check field values.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be non-zero");
        }
        if let Some(name) = &self.nickname {
            if name.trim().is_empty() {
                anyhow::bail!("nickname must not be empty");
            }
        }
        Ok(())
    }

    /// Turn into an engine configuration, applying CLI overrides.
    pub fn into_engine_config(
        self,
        nickname: Option<String>,
        download_dir: Option<PathBuf>,
        port: Option<u16>,
    ) -> EngineConfig {
        let defaults = EngineConfig::default();
        let port = port.unwrap_or(self.port);
        EngineConfig {
            nickname: nickname.or(self.nickname).unwrap_or(defaults.nickname),
            download_dir: download_dir
                .or(self.download_dir)
                .or_else(dirs::download_dir)
                .unwrap_or(defaults.download_dir),
            discovery_port: port,
            transfer_port: port,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.nickname.is_none());
    }

    #[test]
    fn full_file_parses() {
        let config: Config = toml::from_str(
            r#"
            nickname = "alice"
            download_dir = "/tmp/incoming"
            port = 4700
            "#,
        )
        .unwrap();
        assert_eq!(config.nickname.as_deref(), Some("alice"));
        assert_eq!(config.download_dir, Some(PathBuf::from("/tmp/incoming")));
        assert_eq!(config.port, 4700);
    }

    #[test]
    fn zero_port_rejected() {
        let config: Config = toml::from_str("port = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        writeln!(
            std::fs::File::create(&path).unwrap(),
            "nickname = \"bob\""
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.nickname.as_deref(), Some("bob"));
    }

    #[test]
    fn cli_overrides_win() {
        let config: Config = toml::from_str("nickname = \"from-file\"\nport = 5000").unwrap();
        let engine = config.into_engine_config(Some("from-flag".into()), None, Some(6000));
        assert_eq!(engine.nickname, "from-flag");
        assert_eq!(engine.discovery_port, 6000);
        assert_eq!(engine.transfer_port, 6000);
    }

    #[test]
    fn file_port_applies_to_both_sockets() {
        let config: Config = toml::from_str("port = 4700").unwrap();
        let engine = config.into_engine_config(None, None, None);
        assert_eq!(engine.discovery_port, 4700);
        assert_eq!(engine.transfer_port, 4700);
    }
}

//! Configuration management for AttendChain

use crate::blockchain::AnchorMode;
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "attendchain.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageBackend::default(), path: default_data_dir() }
    }
}

/// The work target is fixed at [`crate::blockchain::DIFFICULTY`] and is not
/// configurable; an unknown key such as `difficulty` is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSettings {
    #[serde(default)]
    pub anchor_mode: AnchorMode,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// Load `attendchain.toml` from the working directory, falling back to
/// defaults when it is absent.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = if path.exists() {
        fs::read_to_string(path).map_err(|e| LedgerError::Config(format!("Failed to read {:?}: {}", path, e)))?
    } else {
        String::new()
    };
    parse_config(&config_str)
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = if text.trim().is_empty() { Config::default() } else { toml::from_str(text)? };
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend != StorageBackend::Memory && self.storage.path.trim().is_empty() {
            return Err(LedgerError::Config("storage.path must be set for file-backed stores".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.storage.path, "./data");
        assert_eq!(config.ledger.anchor_mode, AnchorMode::Snapshot);
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [storage]
            backend = "sqlite"
            path = "/tmp/ledger.db"

            [ledger]
            anchor_mode = "live_tip"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.ledger.anchor_mode, AnchorMode::LiveTip);
    }

    #[test]
    fn difficulty_is_not_configurable() {
        for text in ["[ledger]\ndifficulty = 0\n", "[ledger]\ndifficulty = 4\n"] {
            let err = parse_config(text).unwrap_err();
            assert!(matches!(err, LedgerError::Config(ref msg) if msg.contains("difficulty")), "{}", err);
        }
    }

    #[test]
    fn rejects_empty_path_for_file_store() {
        assert!(parse_config("[storage]\npath = \"\"\n").is_err());
        assert!(parse_config("[storage]\nbackend = \"memory\"\npath = \"\"\n").is_ok());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.ledger.anchor_mode, AnchorMode::Snapshot);
    }
}

//! Configuration management
//!
//! Config directory: ~/.cessfs/ (cross-platform)
//!
//! Config file format (~/.cessfs/config.toml):
//! ```toml
//! [chain]
//! registry = "/home/me/.cessfs/registry.json"
//!
//! [storage]
//! work_dir = "/tmp"
//! save_dir = "."
//! timeout_secs = 60
//!
//! [selector]
//! strategy = "priority"
//! max_ttl_ms = 300
//! max_node_num = 120
//!
//! [layout]
//! segment_size = 67108864
//! data_shards = 4
//! parity_shards = 2
//! ```

use anyhow::{Context, Result};
use cessfs_core::Layout;
use cessfs_network::SelectorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Structure of ~/.cessfs/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "SelectorConfig::from_env")]
    pub selector: SelectorConfig,

    #[serde(default = "default_layout")]
    pub layout: Layout,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            storage: StorageConfig::default(),
            selector: SelectorConfig::from_env(),
            layout: default_layout(),
        }
    }
}

fn default_layout() -> Layout {
    Layout::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring CESSFS_* layout overrides");
        Layout::default()
    })
}

/// Chain access settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Registry file backing the local chain
    #[serde(default = "default_registry")]
    pub registry: PathBuf,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
        }
    }
}

fn default_registry() -> PathBuf {
    std::env::var("CESSFS_REGISTRY")
        .map(PathBuf::from)
        .unwrap_or_else(|_| base_dir().join("registry.json"))
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Scratch space for segments and fragments
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Where retrieved files land
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Per-request timeout for miner calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            save_dir: default_save_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_work_dir() -> PathBuf {
    std::env::var("CESSFS_WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}

fn default_save_dir() -> PathBuf {
    std::env::var("CESSFS_SAVE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn default_timeout_secs() -> u64 {
    std::env::var("CESSFS_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(cessfs_client::DEFAULT_TIMEOUT.as_secs())
}

/// ~/.cessfs, or ./.cessfs when there is no home directory
fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cessfs")
}

/// Get the config directory path (~/.cessfs/), creating it if needed
pub fn config_dir() -> Result<PathBuf> {
    let dir = base_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory ~/.cessfs/")?;
    }
    Ok(dir)
}

/// Get the default config file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from `path` (or the default location).
///
/// A missing file yields defaults; an unreadable or invalid one is an error.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ClientConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Layout::new(
        config.layout.segment_size,
        config.layout.data_shards,
        config.layout.parity_shards,
    )
    .context("Invalid [layout] section")?;
    Ok(config)
}

/// Save configuration to `path` (or the default location)
pub fn save_config(config: &ClientConfig, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, content).context("Failed to write config file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.layout, Layout::default());
        assert_eq!(config.selector.max_node_num, 120);
        assert!(config.storage.timeout_secs > 0);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ClientConfig::default();
        config.storage.timeout_secs = 5;
        config.layout = Layout::new(64 * 1024, 4, 2).unwrap();
        save_config(&config, Some(&path)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[chain]"));
        assert!(content.contains("[layout]"));

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.storage.timeout_secs, 5);
        assert_eq!(loaded.layout.segment_size, 64 * 1024);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[storage]\ntimeout_secs = 9\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.storage.timeout_secs, 9);
        assert_eq!(loaded.layout, Layout::default());
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[layout]\nsegment_size = 100\ndata_shards = 4\nparity_shards = 2\n",
        )
        .unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}

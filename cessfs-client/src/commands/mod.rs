//! CLI Commands

pub mod chunk;
pub mod miners;
pub mod retrieve;
pub mod store;
pub mod territory;

use crate::config::ClientConfig;
use anyhow::{Context, Result};
use cessfs_client::{HttpMinerTransport, Keyring, MinerInfo, StaticChain, StorageClient};
use cessfs_network::{NodeSelector, PeerInfo};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Settings resolved from the config file and command-line overrides
pub struct Session {
    pub config: ClientConfig,
    pub registry: PathBuf,
    pub mnemonic: Option<String>,
}

impl Session {
    /// Open the registry-backed chain
    pub async fn open_chain(&self) -> Result<Arc<StaticChain>> {
        let chain = StaticChain::load(&self.registry)
            .await
            .with_context(|| format!("Failed to open registry {}", self.registry.display()))?;
        Ok(Arc::new(chain))
    }

    /// Signing identity from the configured mnemonic
    pub fn keyring(&self) -> Result<Arc<Keyring>> {
        let phrase = self
            .mnemonic
            .as_deref()
            .context("No mnemonic. Set CESSFS_MNEMONIC or pass --mnemonic")?;
        Ok(Arc::new(Keyring::from_mnemonic(phrase)?))
    }

    /// Storage client over HTTP with a freshly flushed node selector
    pub async fn storage_client(&self, chain: Arc<StaticChain>) -> Result<StorageClient> {
        let keyring = self.keyring()?;
        let transport = Arc::new(HttpMinerTransport::new(
            keyring.clone(),
            self.config.storage.timeout(),
        )?);

        let selector = Arc::new(NodeSelector::new(self.config.selector.clone())?);
        let peers: Vec<PeerInfo> = chain
            .snapshot()
            .await
            .miners
            .iter()
            .map(MinerInfo::peer_info)
            .collect();
        let ping_timeout = self.config.selector.max_ttl();
        let active = selector.flush(&peers, ping_timeout).await;
        let allowed = selector.flush_allowed(ping_timeout).await;
        debug!(peers = peers.len(), active, allowed, "Node selector flushed");

        Ok(StorageClient::new(chain, transport, keyring)
            .with_layout(self.config.layout)
            .with_work_dir(&self.config.storage.work_dir)
            .with_selector(selector))
    }
}

/// Spinner shown while a long operation runs
pub fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// First `n` characters of a hash, for tables
pub fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

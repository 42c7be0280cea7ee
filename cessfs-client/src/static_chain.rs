//! File-backed chain registry
//!
//! `StaticChain` implements [`ChainClient`] over an in-memory registry that
//! can be persisted as JSON. It backs the command-line tool on a local
//! network and every test. All access goes through one `tokio::sync::Mutex`,
//! so transactions apply one at a time.

use crate::chain::{
    AccountId, ChainClient, ChainError, FileMetadata, MinerInfo, MinerState, ShardAssignment,
    StorageOrder, TerritoryInfo, TerritoryState,
};
use cessfs_core::{sha256_hex, GIB};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Everything the registry knows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Miners in registration order
    #[serde(default)]
    pub miners: Vec<MinerInfo>,
    #[serde(default)]
    pub territories: Vec<TerritoryInfo>,
    /// File metadata by fid
    #[serde(default)]
    pub files: BTreeMap<String, FileMetadata>,
}

/// Local chain stand-in
pub struct StaticChain {
    registry: Mutex<Registry>,
    path: Option<PathBuf>,
}

impl Default for StaticChain {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticChain {
    /// Empty, in-memory registry
    pub fn new() -> Self {
        Self::from_registry(Registry::default())
    }

    pub fn from_registry(registry: Registry) -> Self {
        Self {
            registry: Mutex::new(registry),
            path: None,
        }
    }

    /// Load a registry from `path`; a missing file yields an empty registry
    /// that will be saved there
    pub async fn load(path: &Path) -> Result<Self, ChainError> {
        let registry = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| ChainError::Storage(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Registry::default(),
            Err(e) => return Err(ChainError::Storage(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            registry: Mutex::new(registry),
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the registry back to the file it was loaded from
    pub async fn save(&self) -> Result<(), ChainError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let registry = self.registry.lock().await;
            serde_json::to_string_pretty(&*registry)
                .map_err(|e| ChainError::Storage(e.to_string()))?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChainError::Storage(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        debug!(path = %path.display(), "Registry saved");
        Ok(())
    }

    /// Register a miner, replacing any entry with the same account
    pub async fn register_miner(&self, miner: MinerInfo) {
        let mut registry = self.registry.lock().await;
        match registry.miners.iter_mut().find(|m| m.account == miner.account) {
            Some(existing) => *existing = miner,
            None => registry.miners.push(miner),
        }
    }

    /// Change a miner's state; returns false for unknown miners
    pub async fn set_miner_state(&self, account: &str, state: MinerState) -> bool {
        let mut registry = self.registry.lock().await;
        match registry.miners.iter_mut().find(|m| m.account == account) {
            Some(miner) => {
                miner.state = state;
                true
            }
            None => false,
        }
    }

    /// Copy of the registry
    pub async fn snapshot(&self) -> Registry {
        self.registry.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ChainClient for StaticChain {
    async fn query_file(&self, fid: &str) -> Result<Option<FileMetadata>, ChainError> {
        Ok(self.registry.lock().await.files.get(fid).cloned())
    }

    async fn query_miner(&self, account: &str) -> Result<Option<MinerInfo>, ChainError> {
        Ok(self
            .registry
            .lock()
            .await
            .miners
            .iter()
            .find(|m| m.account == account)
            .cloned())
    }

    async fn query_all_miners(&self) -> Result<Vec<AccountId>, ChainError> {
        Ok(self
            .registry
            .lock()
            .await
            .miners
            .iter()
            .map(|m| m.account.clone())
            .collect())
    }

    async fn query_territory(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<TerritoryInfo>, ChainError> {
        Ok(self
            .registry
            .lock()
            .await
            .territories
            .iter()
            .find(|t| t.owner == owner && t.name == name)
            .cloned())
    }

    async fn mint_territory(
        &self,
        owner: &str,
        name: &str,
        gib: u32,
        days: u32,
    ) -> Result<(), ChainError> {
        let mut registry = self.registry.lock().await;
        if registry
            .territories
            .iter()
            .any(|t| t.owner == owner && t.name == name)
        {
            return Err(ChainError::Rejected(format!(
                "territory {} already exists",
                name
            )));
        }
        let space = gib as u64 * GIB;
        registry.territories.push(TerritoryInfo {
            owner: owner.to_string(),
            name: name.to_string(),
            total_space: space,
            remaining_space: space,
            state: TerritoryState::Active,
            expires_at: Utc::now() + chrono::Duration::days(days as i64),
        });
        info!(owner = %owner, territory = %name, gib, days, "Territory minted");
        Ok(())
    }

    async fn place_storage_order(&self, order: &StorageOrder) -> Result<String, ChainError> {
        let tx = sha256_hex(format!("{}:{}", order.owner, order.fid).as_bytes());
        let mut registry = self.registry.lock().await;
        if registry.files.contains_key(&order.fid) {
            return Ok(tx);
        }

        let territory = registry
            .territories
            .iter_mut()
            .find(|t| t.owner == order.owner && t.name == order.territory)
            .ok_or_else(|| {
                ChainError::Rejected(format!("territory {} not found", order.territory))
            })?;
        if territory.state != TerritoryState::Active {
            return Err(ChainError::Rejected(format!(
                "territory {} is {}",
                territory.name, territory.state
            )));
        }
        if territory.remaining_space < order.stored_size {
            return Err(ChainError::Rejected(format!(
                "territory {} has {} bytes left, order needs {}",
                territory.name, territory.remaining_space, order.stored_size
            )));
        }
        territory.remaining_space -= order.stored_size;

        registry.files.insert(
            order.fid.clone(),
            FileMetadata {
                fid: order.fid.clone(),
                file_size: order.file_size,
                owner: order.owner.clone(),
                file_name: order.file_name.clone(),
                bucket: order.bucket.clone(),
                territory: order.territory.clone(),
                segments: order.segments.clone(),
            },
        );
        info!(fid = %order.fid, tx = %tx, "Storage order placed");
        Ok(tx)
    }

    async fn record_assignments(
        &self,
        fid: &str,
        assignments: &[ShardAssignment],
    ) -> Result<(), ChainError> {
        let mut registry = self.registry.lock().await;
        let file = registry
            .files
            .get_mut(fid)
            .ok_or_else(|| ChainError::Rejected(format!("no storage order for {}", fid)))?;
        if let Some(bad) = assignments
            .iter()
            .find(|a| file.segments.iter().any(|s| a.shard >= s.fragments.len()))
        {
            return Err(ChainError::Rejected(format!(
                "shard {} out of range",
                bad.shard
            )));
        }
        for assignment in assignments {
            for segment in &mut file.segments {
                segment.fragments[assignment.shard].miner = Some(assignment.miner.clone());
            }
        }
        info!(fid = %fid, shards = assignments.len(), "Fragment assignments recorded");
        Ok(())
    }
}

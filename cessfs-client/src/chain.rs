//! Chain-side types and the chain client interface
//!
//! The chain owns file metadata, the miner registry and territories. The
//! storage drivers only see the typed records below.

use cessfs_network::PeerInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SS58-encoded account address
pub type AccountId = String;

/// Chain errors
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Registry storage error: {0}")]
    Storage(String),
}

/// One fragment of a stored segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMeta {
    pub hash: String,
    /// Miner holding the fragment, once assigned
    pub miner: Option<AccountId>,
}

/// One stored segment, fragments in shard order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub hash: String,
    pub fragments: Vec<FragmentMeta>,
}

/// On-chain record of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub fid: String,
    /// Declared plaintext size; retrieval trims to this
    pub file_size: u64,
    pub owner: AccountId,
    pub file_name: String,
    pub bucket: String,
    pub territory: String,
    pub segments: Vec<SegmentMeta>,
}

impl FileMetadata {
    /// Segment hashes in file order
    pub fn segment_hashes(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.hash.as_str()).collect()
    }

    /// Whether every fragment has a miner
    pub fn is_fully_assigned(&self) -> bool {
        self.segments
            .iter()
            .flat_map(|s| &s.fragments)
            .all(|f| f.miner.is_some())
    }
}

/// Miner chosen for one fragment group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub shard: usize,
    pub miner: AccountId,
}

/// Storage order submitted before distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOrder {
    pub fid: String,
    pub file_name: String,
    pub file_size: u64,
    pub owner: AccountId,
    pub bucket: String,
    pub territory: String,
    /// Fragment bytes charged against the territory
    pub stored_size: u64,
    pub segments: Vec<SegmentMeta>,
}

/// Miner lifecycle state; only `Positive` miners accept fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinerState {
    Positive,
    Frozen,
    Exit,
    Lock,
}

impl fmt::Display for MinerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MinerState::Positive => "positive",
            MinerState::Frozen => "frozen",
            MinerState::Exit => "exit",
            MinerState::Lock => "lock",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MinerState {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, ChainError> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(MinerState::Positive),
            "frozen" => Ok(MinerState::Frozen),
            "exit" => Ok(MinerState::Exit),
            "lock" => Ok(MinerState::Lock),
            other => Err(ChainError::Rejected(format!("unknown miner state {}", other))),
        }
    }
}

/// Registered storage miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    pub account: AccountId,
    pub peer_id: String,
    /// HTTP base URL, e.g. `http://1.2.3.4:15001`
    pub endpoint: String,
    /// Free space in bytes
    pub idle_space: u64,
    pub state: MinerState,
}

impl MinerInfo {
    /// Peer view of the miner for the node selector
    pub fn peer_info(&self) -> PeerInfo {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint);
        let host_port = without_scheme.split('/').next().unwrap_or_default();
        PeerInfo::new(self.peer_id.clone(), vec![host_port.to_string()])
    }
}

/// Territory lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerritoryState {
    Active,
    Frozen,
    Expired,
}

impl fmt::Display for TerritoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerritoryState::Active => "active",
            TerritoryState::Frozen => "frozen",
            TerritoryState::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Purchased storage space owned by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryInfo {
    pub owner: AccountId,
    pub name: String,
    pub total_space: u64,
    pub remaining_space: u64,
    pub state: TerritoryState,
    pub expires_at: DateTime<Utc>,
}

/// Read/write access to the chain
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Metadata for a stored file
    async fn query_file(&self, fid: &str) -> Result<Option<FileMetadata>, ChainError>;

    /// A registered miner
    async fn query_miner(&self, account: &str) -> Result<Option<MinerInfo>, ChainError>;

    /// All registered miners in registry order
    async fn query_all_miners(&self) -> Result<Vec<AccountId>, ChainError>;

    /// A territory owned by `owner`
    async fn query_territory(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<TerritoryInfo>, ChainError>;

    /// Buy `gib` GiB of space for `days` days under a new territory
    async fn mint_territory(
        &self,
        owner: &str,
        name: &str,
        gib: u32,
        days: u32,
    ) -> Result<(), ChainError>;

    /// Submit a storage order; returns the transaction hash.
    ///
    /// Placing an order for a fid that already has one is a no-op.
    async fn place_storage_order(&self, order: &StorageOrder) -> Result<String, ChainError>;

    /// Record that `assignment.miner` holds fragment `assignment.shard` of
    /// every segment of `fid`
    async fn record_assignments(
        &self,
        fid: &str,
        assignments: &[ShardAssignment],
    ) -> Result<(), ChainError>;
}

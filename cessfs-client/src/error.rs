//! Client errors
//!
//! Every miner-level failure names the miner (and fragment, where there is
//! one) so a failed store can be traced to the node that caused it.

use crate::chain::{AccountId, ChainError, MinerState};
use crate::transport::TransportError;
use cessfs_core::CessError;
use cessfs_network::SelectorError;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    // ===== Validation =====
    #[error("Invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("Invalid territory name {name:?}: {reason}")]
    InvalidTerritoryName { name: String, reason: &'static str },

    #[error("Invalid fid: {0}")]
    InvalidFid(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid account address: {0}")]
    InvalidAccount(String),

    // ===== Wrapped layers =====
    #[error(transparent)]
    Core(#[from] CessError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // ===== Capacity / preconditions =====
    #[error("Territory {name}: {reason}")]
    TerritoryCapacity { name: String, reason: String },

    #[error("Miner {0} is not registered")]
    MinerNotFound(AccountId),

    #[error("Miner {miner} is {state}, not positive")]
    MinerNotPositive { miner: AccountId, state: MinerState },

    #[error("Miner {miner} has {idle} bytes idle, {required} required")]
    MinerInsufficientSpace {
        miner: AccountId,
        idle: u64,
        required: u64,
    },

    #[error("Miner {miner} (peer {peer}) is blacklisted")]
    MinerBlacklisted { miner: AccountId, peer: String },

    // ===== Placement =====
    #[error("Upload of fragment {fragment} to miner {miner} failed: {source}")]
    Upload {
        miner: AccountId,
        fragment: String,
        #[source]
        source: TransportError,
    },

    #[error("Shard {shard} could not be placed on requested miner {miner}: {source}")]
    StrictPlacement {
        shard: usize,
        miner: AccountId,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Only {placed} of {required} fragment groups placed; last error: {last_error}")]
    PlacementIncomplete {
        placed: usize,
        required: usize,
        last_error: String,
    },

    // ===== Retrieval =====
    #[error("File {0} not found on chain")]
    FileNotFound(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Segment {segment} unrecoverable: {available} of {required} fragments available")]
    SegmentUnrecoverable {
        segment: usize,
        available: usize,
        required: usize,
    },

    // ===== Runtime =====
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

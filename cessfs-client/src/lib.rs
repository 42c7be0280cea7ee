//! cessfs Client Library
//!
//! Stores files on CESS storage miners and reads them back.
//!
//! # Store
//! 1. Validate bucket and territory names
//! 2. Segment, encrypt and erasure code the file (`cessfs-core`)
//! 3. Skip the upload if the fid is already fully placed for this owner
//! 4. Make sure the owner's territory has room, minting one if missing
//! 5. Place the storage order
//! 6. Upload fragment group `j` (fragment `j` of every segment) to one miner
//! 7. Record on chain which miner holds each group
//!
//! # Retrieve
//! 1. Read the file's metadata from chain and check it against the fid
//! 2. Fetch any `data_shards` fragments per segment, rebuild, decrypt
//! 3. Trim the padding and move the file into place
//!
//! Chain access goes through [`ChainClient`]; miner HTTP traffic goes through
//! [`MinerTransport`]. Both are traits so tests can run without a network.

pub mod chain;
pub mod error;
pub mod keyring;
pub mod retrieve;
pub mod static_chain;
pub mod storage;
pub mod store;
pub mod transport;
pub mod validate;

pub use chain::{
    AccountId, ChainClient, ChainError, FileMetadata, FragmentMeta, MinerInfo, MinerState,
    SegmentMeta, ShardAssignment, StorageOrder, TerritoryInfo, TerritoryState,
};
pub use error::{ClientError, Result};
pub use keyring::{Keyring, SignedNonce};
pub use static_chain::{Registry, StaticChain};
pub use storage::StorageClient;
pub use store::{StoreReport, StoreRequest};
pub use transport::{HttpMinerTransport, MinerTransport, TransportError};

use cessfs_core::CipherKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of a territory minted on demand, in days
pub const TERRITORY_DAYS: u32 = 30;

/// Default per-request timeout for miner HTTP calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Store a file with a key derived from `mnemonic`, over HTTP
pub async fn store_file_to_miners(
    chain: Arc<dyn ChainClient>,
    mnemonic: &str,
    timeout: Duration,
    request: StoreRequest,
) -> Result<StoreReport> {
    let keyring = Arc::new(Keyring::from_mnemonic(mnemonic)?);
    let transport = Arc::new(HttpMinerTransport::new(keyring.clone(), timeout)?);
    StorageClient::new(chain, transport, keyring)
        .store_file(request)
        .await
}

/// Retrieve a file into `save_dir` with a key derived from `mnemonic`, over HTTP
pub async fn retrieve_file_from_miners(
    chain: Arc<dyn ChainClient>,
    mnemonic: &str,
    timeout: Duration,
    fid: &str,
    cipher_key: Option<&CipherKey>,
    save_dir: &Path,
) -> Result<PathBuf> {
    let keyring = Arc::new(Keyring::from_mnemonic(mnemonic)?);
    let transport = Arc::new(HttpMinerTransport::new(keyring.clone(), timeout)?);
    StorageClient::new(chain, transport, keyring)
        .retrieve_file(fid, cipher_key, save_dir)
        .await
}

//! Shared fixtures: in-memory miners and a local chain with registered miners
#![allow(dead_code)]

use cessfs_client::{
    Keyring, MinerInfo, MinerState, MinerTransport, StaticChain, StorageClient, StoreReport,
    StoreRequest, TransportError,
};
use cessfs_core::{CipherKey, Layout, GIB};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const PHRASE: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

/// Miners registered by [`harness`]
pub const MINERS: usize = 8;

/// 64 KiB segments, 4 + 2 fragments of 16 KiB
pub fn small_layout() -> Layout {
    Layout::new(64 * 1024, 4, 2).unwrap()
}

pub fn account(i: usize) -> String {
    format!("miner-{}", i)
}

pub fn peer_id(i: usize) -> String {
    format!("12D3KooWPeer{}", i)
}

pub fn endpoint(i: usize) -> String {
    format!("http://93.184.1.{}:15001", i + 1)
}

pub fn miner(i: usize) -> MinerInfo {
    MinerInfo {
        account: account(i),
        peer_id: peer_id(i),
        endpoint: endpoint(i),
        idle_space: GIB,
        state: MinerState::Positive,
    }
}

/// Deterministic, non-repeating-looking content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Fragments held by in-memory miners, keyed by endpoint then hash
#[derive(Default)]
pub struct MemoryMiners {
    fragments: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    rejecting: Mutex<HashSet<String>>,
    offline: Mutex<HashSet<String>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryMiners {
    /// Refuse uploads at `endpoint`
    pub fn reject(&self, endpoint: &str) {
        self.rejecting.lock().insert(endpoint.to_string());
    }

    /// Take uploads at `endpoint` again
    pub fn accept(&self, endpoint: &str) {
        self.rejecting.lock().remove(endpoint);
    }

    /// Fail downloads from `endpoint`
    pub fn take_offline(&self, endpoint: &str) {
        self.offline.lock().insert(endpoint.to_string());
    }

    /// Flip one byte of every fragment held at `endpoint`
    pub fn corrupt(&self, endpoint: &str) {
        if let Some(held) = self.fragments.lock().get_mut(endpoint) {
            for data in held.values_mut() {
                data[0] ^= 0xff;
            }
        }
    }

    pub fn holds(&self, endpoint: &str, hash: &str) -> bool {
        self.fragments
            .lock()
            .get(endpoint)
            .is_some_and(|held| held.contains_key(hash))
    }

    pub fn count_at(&self, endpoint: &str) -> usize {
        self.fragments
            .lock()
            .get(endpoint)
            .map_or(0, |held| held.len())
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MinerTransport for MemoryMiners {
    async fn put_fragment(
        &self,
        endpoint: &str,
        _fid: &str,
        fragment_hash: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.rejecting.lock().contains(endpoint) {
            return Err(TransportError::Rejected("miner refused fragment".to_string()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.fragments
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .insert(fragment_hash.to_string(), data);
        Ok(())
    }

    async fn get_fragment(
        &self,
        endpoint: &str,
        _fid: &str,
        fragment_hash: &str,
        max_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.offline.lock().contains(endpoint) {
            return Err(TransportError::Status {
                status: 503,
                message: "offline".to_string(),
            });
        }
        self.fragments
            .lock()
            .get(endpoint)
            .and_then(|held| held.get(fragment_hash).cloned())
            .ok_or_else(|| TransportError::Status {
                status: 404,
                message: "no such fragment".to_string(),
            })
            .and_then(|data| {
                if data.len() > max_len {
                    Err(TransportError::TooLarge { limit: max_len })
                } else {
                    Ok(data)
                }
            })
    }
}

pub struct Harness {
    pub chain: Arc<StaticChain>,
    pub miners: Arc<MemoryMiners>,
    pub client: StorageClient,
    pub dir: TempDir,
}

impl Harness {
    pub fn request(&self, file: PathBuf, want_miners: Vec<String>) -> StoreRequest {
        StoreRequest {
            file,
            cipher_key: None,
            territory: "territory1".to_string(),
            bucket: "bucket-one".to_string(),
            want_miners,
        }
    }

    pub fn encrypted_request(&self, file: PathBuf, key: &str) -> StoreRequest {
        StoreRequest {
            cipher_key: CipherKey::from_passphrase(key).unwrap(),
            ..self.request(file, Vec::new())
        }
    }

    pub async fn store(&self, request: StoreRequest) -> StoreReport {
        self.client.store_file(request).await.unwrap()
    }

    pub fn save_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

/// Chain with [`MINERS`] positive miners and a client over in-memory miners
pub async fn harness() -> Harness {
    let chain = Arc::new(StaticChain::new());
    for i in 0..MINERS {
        chain.register_miner(miner(i)).await;
    }
    harness_with(chain)
}

pub fn harness_with(chain: Arc<StaticChain>) -> Harness {
    let dir = TempDir::new().unwrap();
    let miners = Arc::new(MemoryMiners::default());
    let keyring = Arc::new(Keyring::from_mnemonic(PHRASE).unwrap());
    let client = StorageClient::new(chain.clone(), miners.clone(), keyring)
        .with_layout(small_layout())
        .with_work_dir(dir.path().join("work"));
    Harness {
        chain,
        miners,
        client,
        dir,
    }
}

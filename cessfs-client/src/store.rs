//! Store driver
//!
//! `Chunked -> OrderPlaced -> Distributing -> AllFragmentsStored`
//!
//! A failed store leaves its order on chain with unassigned fragments; the
//! next store of the same file resumes it instead of deduplicating.
//!
//! Placement modes:
//! - strict, when at least `total_shards` miners are requested: miner `i`
//!   must take fragment group `i` and any failure fails the store
//! - best effort otherwise: requested miners first, then the registry in
//!   order, skipping miners already used or failed, until every group is
//!   placed or candidates run out

use crate::chain::{
    AccountId, ChainClient, FileMetadata, FragmentMeta, MinerInfo, MinerState, SegmentMeta,
    ShardAssignment, StorageOrder, TerritoryState,
};
use crate::error::{ClientError, Result};
use crate::storage::StorageClient;
use crate::validate::{validate_bucket_name, validate_territory_name};
use crate::TERRITORY_DAYS;
use cessfs_core::{CessError, CipherKey, FragmentPlan, ProcessedFile, SegmentProcessor, GIB};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// What to store and where
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub file: PathBuf,
    pub cipher_key: Option<CipherKey>,
    pub territory: String,
    pub bucket: String,
    /// Miners to try first; `total_shards` or more selects strict placement
    pub want_miners: Vec<AccountId>,
}

/// Outcome of a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReport {
    pub fid: String,
    pub file_size: u64,
    pub segments: usize,
    /// One entry per shard index, empty when deduplicated
    pub assignments: Vec<ShardAssignment>,
    /// The file was already on chain and nothing was uploaded
    pub deduplicated: bool,
}

impl StorageClient {
    /// Segment, encode and distribute a file
    #[instrument(skip_all, fields(file = %request.file.display(), bucket = %request.bucket))]
    pub async fn store_file(&self, request: StoreRequest) -> Result<StoreReport> {
        validate_bucket_name(&request.bucket)?;
        validate_territory_name(&request.territory)?;
        let file_name = request
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CessError::NotAFile(request.file.clone()))?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workdir = tempfile::Builder::new()
            .prefix("cessfs-store-")
            .tempdir_in(&self.work_dir)?;

        let layout = self.layout;
        let file = request.file.clone();
        let key = request.cipher_key.clone();
        let dir = workdir.path().to_path_buf();
        let processed = tokio::task::spawn_blocking(move || {
            SegmentProcessor::with_layout(layout)?.process(&file, key.as_ref(), &dir)
        })
        .await??;
        let fid = processed.fid.clone();
        info!(fid = %fid, segments = processed.segments.len(), "Chunked");

        let owner = self.keyring.account().to_string();
        let existing = self.chain.query_file(&fid).await?;
        if existing.as_ref().is_some_and(|meta| is_stored_for(meta, &owner)) {
            info!(fid = %fid, "File already on chain, skipping upload");
            return Ok(StoreReport {
                fid,
                file_size: processed.file_size,
                segments: processed.segments.len(),
                assignments: Vec::new(),
                deduplicated: true,
            });
        }

        let stored_size = layout.stored_size(processed.segments.len() as u64);
        if existing.is_some() {
            // An earlier attempt placed the order and charged the territory
            info!(fid = %fid, "Resuming unfinished store");
        } else {
            self.ensure_territory(&owner, &request.territory, stored_size)
                .await?;
        }

        let order = StorageOrder {
            fid: fid.clone(),
            file_name,
            file_size: processed.file_size,
            owner,
            bucket: request.bucket.clone(),
            territory: request.territory.clone(),
            stored_size,
            segments: order_segments(&processed),
        };
        let tx = self.chain.place_storage_order(&order).await?;
        info!(fid = %fid, tx = %tx, "OrderPlaced");

        let assignments = self.distribute(&processed, &request.want_miners).await?;
        self.chain.record_assignments(&fid, &assignments).await?;
        info!(fid = %fid, miners = assignments.len(), "AllFragmentsStored");

        Ok(StoreReport {
            fid,
            file_size: processed.file_size,
            segments: processed.segments.len(),
            assignments,
            deduplicated: false,
        })
    }

    /// Make sure `owner` has an active territory with `required` bytes free
    async fn ensure_territory(&self, owner: &str, name: &str, required: u64) -> Result<()> {
        match self.chain.query_territory(owner, name).await? {
            None => {
                let gib = u32::try_from(required.div_ceil(GIB).max(1)).map_err(|_| {
                    ClientError::TerritoryCapacity {
                        name: name.to_string(),
                        reason: format!("{} bytes is too large to mint", required),
                    }
                })?;
                info!(territory = %name, gib, days = TERRITORY_DAYS, "Minting territory");
                self.chain
                    .mint_territory(owner, name, gib, TERRITORY_DAYS)
                    .await?;
                Ok(())
            }
            Some(t) if t.state != TerritoryState::Active => Err(ClientError::TerritoryCapacity {
                name: name.to_string(),
                reason: format!("territory is {}", t.state),
            }),
            Some(t) if t.remaining_space < required => Err(ClientError::TerritoryCapacity {
                name: name.to_string(),
                reason: format!(
                    "{} bytes remaining, {} required",
                    t.remaining_space, required
                ),
            }),
            Some(_) => Ok(()),
        }
    }

    async fn distribute(
        &self,
        processed: &ProcessedFile,
        want_miners: &[AccountId],
    ) -> Result<Vec<ShardAssignment>> {
        let groups = processed.fragment_groups();
        let total = self.layout.total_shards();
        let mut assignments = Vec::with_capacity(total);

        if want_miners.len() >= total {
            info!(fid = %processed.fid, miners = total, "Distributing (strict)");
            for (shard, group) in groups.iter().enumerate() {
                let miner = &want_miners[shard];
                self.place_group(&processed.fid, miner, group)
                    .await
                    .map_err(|e| ClientError::StrictPlacement {
                        shard,
                        miner: miner.clone(),
                        source: Box::new(e),
                    })?;
                assignments.push(ShardAssignment {
                    shard,
                    miner: miner.clone(),
                });
            }
            return Ok(assignments);
        }

        info!(
            fid = %processed.fid,
            requested = want_miners.len(),
            "Distributing (best effort)"
        );
        let mut candidates = Candidates::new(want_miners);
        let mut last_error: Option<String> = None;
        for (shard, group) in groups.iter().enumerate() {
            loop {
                let Some(miner) = candidates.next(self.chain.as_ref()).await? else {
                    warn!(
                        fid = %processed.fid,
                        placed = assignments.len(),
                        required = total,
                        "Ran out of candidate miners"
                    );
                    return Err(ClientError::PlacementIncomplete {
                        placed: assignments.len(),
                        required: total,
                        last_error: last_error
                            .unwrap_or_else(|| "no candidate miners".to_string()),
                    });
                };
                match self.place_group(&processed.fid, &miner, group).await {
                    Ok(()) => {
                        assignments.push(ShardAssignment { shard, miner });
                        break;
                    }
                    Err(e) => {
                        warn!(miner = %miner, shard, error = %e, "Miner failed, trying next");
                        last_error = Some(e.to_string());
                    }
                }
            }
        }
        Ok(assignments)
    }

    /// Look up a miner, check it, upload a fragment group and report the outcome
    async fn place_group(&self, fid: &str, account: &str, group: &[&FragmentPlan]) -> Result<()> {
        let miner = self
            .chain
            .query_miner(account)
            .await?
            .ok_or_else(|| ClientError::MinerNotFound(account.to_string()))?;
        if self.is_blacklisted(&miner.peer_id) {
            return Err(ClientError::MinerBlacklisted {
                miner: miner.account,
                peer: miner.peer_id,
            });
        }

        let result = self.upload_group(fid, &miner, group).await;
        self.feedback(&miner.peer_id, result.is_ok());
        result
    }

    async fn upload_group(
        &self,
        fid: &str,
        miner: &MinerInfo,
        group: &[&FragmentPlan],
    ) -> Result<()> {
        if miner.state != MinerState::Positive {
            return Err(ClientError::MinerNotPositive {
                miner: miner.account.clone(),
                state: miner.state,
            });
        }
        let required = group.len() as u64 * self.layout.fragment_size() as u64;
        if miner.idle_space < required {
            return Err(ClientError::MinerInsufficientSpace {
                miner: miner.account.clone(),
                idle: miner.idle_space,
                required,
            });
        }

        for fragment in group {
            let data = tokio::fs::read(&fragment.path).await?;
            self.transport
                .put_fragment(&miner.endpoint, fid, &fragment.hash, data)
                .await
                .map_err(|source| ClientError::Upload {
                    miner: miner.account.clone(),
                    fragment: fragment.hash.clone(),
                    source,
                })?;
            debug!(miner = %miner.account, fragment = %fragment.hash, "Fragment stored");
        }
        info!(miner = %miner.account, fragments = group.len(), "Fragment group stored");
        Ok(())
    }
}

/// Every fragment has a miner and `owner` placed the order
fn is_stored_for(meta: &FileMetadata, owner: &str) -> bool {
    meta.owner == owner && meta.is_fully_assigned()
}

/// Chain view of the processed segments, no miners assigned yet
fn order_segments(processed: &ProcessedFile) -> Vec<SegmentMeta> {
    processed
        .segments
        .iter()
        .map(|s| SegmentMeta {
            hash: s.hash.clone(),
            fragments: s
                .fragments
                .iter()
                .map(|f| FragmentMeta {
                    hash: f.hash.clone(),
                    miner: None,
                })
                .collect(),
        })
        .collect()
}

/// Best-effort candidate order: requested miners, then the registry
struct Candidates {
    requested: VecDeque<AccountId>,
    registry: Option<VecDeque<AccountId>>,
    tried: HashSet<AccountId>,
}

impl Candidates {
    fn new(requested: &[AccountId]) -> Self {
        Self {
            requested: requested.iter().cloned().collect(),
            registry: None,
            tried: HashSet::new(),
        }
    }

    async fn next(&mut self, chain: &dyn ChainClient) -> Result<Option<AccountId>> {
        while let Some(miner) = self.requested.pop_front() {
            if self.tried.insert(miner.clone()) {
                return Ok(Some(miner));
            }
        }
        if self.registry.is_none() {
            let all = chain.query_all_miners().await?;
            debug!(miners = all.len(), "Falling back to registry scan");
            self.registry = Some(all.into());
        }
        if let Some(registry) = self.registry.as_mut() {
            while let Some(miner) = registry.pop_front() {
                if self.tried.insert(miner.clone()) {
                    return Ok(Some(miner));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(owner: &str, miners: &[Option<&str>]) -> FileMetadata {
        FileMetadata {
            fid: "fid".to_string(),
            file_size: 1,
            owner: owner.to_string(),
            file_name: "a.bin".to_string(),
            bucket: "bucket".to_string(),
            territory: "terr".to_string(),
            segments: vec![SegmentMeta {
                hash: "seg".to_string(),
                fragments: miners
                    .iter()
                    .map(|&miner| FragmentMeta {
                        hash: "frag".to_string(),
                        miner: miner.map(str::to_string),
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_is_stored_for() {
        let placed = metadata("alice", &[Some("m0"), Some("m1")]);
        assert!(is_stored_for(&placed, "alice"));
        assert!(!is_stored_for(&placed, "bob"));

        // Order placed but distribution never finished
        let unfinished = metadata("alice", &[Some("m0"), None]);
        assert!(!is_stored_for(&unfinished, "alice"));
    }
}

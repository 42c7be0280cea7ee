//! SHA-256 hash tree over segment hashes
//!
//! The file id (fid) is the root of a binary tree whose leaves are the
//! SHA-256 of each segment's hex hash string, in segment order. Parents hash
//! the concatenation of their children's raw digests and an unpaired node is
//! paired with itself at every level.

use crate::codec::{is_hash_name, sha256};
use crate::error::{CessError, Result};
use sha2::{Digest, Sha256};

/// One step of an inclusion proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    /// Digest of the sibling node
    pub sibling: [u8; 32],
    /// Whether the sibling sits to the left of the running hash
    pub sibling_is_left: bool,
}

/// A fully materialized hash tree
#[derive(Debug, Clone)]
pub struct HashTree {
    /// `levels[0]` are the leaves, the last level is the root
    levels: Vec<Vec<[u8; 32]>>,
}

impl HashTree {
    /// Build a tree from segment hashes (lowercase hex, in order)
    pub fn new<S: AsRef<str>>(hashes: &[S]) -> Result<Self> {
        if hashes.is_empty() {
            return Err(CessError::EmptyHashList);
        }
        let mut leaves = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let hash = hash.as_ref();
            if !is_hash_name(hash) {
                return Err(CessError::InvalidHash(hash.to_string()));
            }
            leaves.push(sha256(hash.as_bytes()));
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let parents = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    hash_pair(&pair[0], right)
                })
                .collect();
            levels.push(parents);
        }
        Ok(Self { levels })
    }

    /// Root digest
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_default()
    }

    /// Root as lowercase hex; this is the fid
    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            let sibling = *level.get(sibling_idx).unwrap_or(&level[idx]);
            steps.push(ProofStep {
                sibling,
                sibling_is_left: idx % 2 == 1,
            });
            idx /= 2;
        }
        Some(steps)
    }
}

/// Compute the fid for an ordered list of segment hashes
pub fn build_root<S: AsRef<str>>(hashes: &[S]) -> Result<String> {
    Ok(HashTree::new(hashes)?.root_hex())
}

/// Recompute the root and require it to equal `expected`
pub fn verify_root<S: AsRef<str>>(hashes: &[S], expected: &str) -> Result<()> {
    let actual = build_root(hashes)?;
    if actual != expected {
        return Err(CessError::RootMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Check that `segment_hash` is included under `root` via `proof`
pub fn verify_proof(segment_hash: &str, proof: &[ProofStep], root: &str) -> bool {
    let mut running = sha256(segment_hash.as_bytes());
    for step in proof {
        running = if step.sibling_is_left {
            hash_pair(&step.sibling, &running)
        } else {
            hash_pair(&running, &step.sibling)
        };
    }
    hex::encode(running) == root
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

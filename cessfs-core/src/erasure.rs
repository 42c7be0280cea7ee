//! Reed-Solomon Erasure Coding
//!
//! Implements (k=4, m=2) coding of fixed-size segments where:
//! - k=4 data fragments (minimum required to rebuild a segment)
//! - m=2 parity fragments (redundancy)
//! - Total 6 fragments, each stored on a different miner
//! - Any 4 of the 6 fragments rebuild the segment
//!
//! Fragments are written to disk named by their SHA-256 hex digest.

use crate::codec::{sha256_hex, write_atomic};
use crate::error::{CessError, Result};
use crate::layout::Layout;
use crate::segment::FragmentPlan;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reed-Solomon encoder/decoder bound to a [`Layout`]
pub struct ErasureCoder {
    layout: Layout,
    encoder: ReedSolomon,
}

impl ErasureCoder {
    /// Create a coder with the default (4, 2) layout
    pub fn new() -> Result<Self> {
        Self::with_layout(Layout::default())
    }

    /// Create a coder with a custom layout
    pub fn with_layout(layout: Layout) -> Result<Self> {
        let encoder = ReedSolomon::new(layout.data_shards, layout.parity_shards)?;
        Ok(Self { layout, encoder })
    }

    /// Get the layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Encode one segment into `total_shards` fragments of equal size
    pub fn encode(&self, segment: &[u8]) -> Result<Vec<Vec<u8>>> {
        if segment.len() != self.layout.segment_size {
            return Err(CessError::SegmentSizeMismatch {
                expected: self.layout.segment_size,
                actual: segment.len(),
            });
        }
        let fragment_size = self.layout.fragment_size();

        // Split into data shards
        let mut shards: Vec<Vec<u8>> = segment
            .par_chunks(fragment_size)
            .map(|c| c.to_vec())
            .collect();

        // Add empty parity shards
        for _ in 0..self.layout.parity_shards {
            shards.push(vec![0u8; fragment_size]);
        }

        // Encode (fills in parity shards)
        self.encoder.encode(&mut shards)?;
        Ok(shards)
    }

    /// Encode the segment stored at `segment_path` and write every fragment
    /// into `out_dir` under its hash.
    ///
    /// Returns the fragments in shard order.
    pub fn encode_file(&self, segment_path: &Path, out_dir: &Path) -> Result<Vec<FragmentPlan>> {
        let segment = fs::read(segment_path)?;
        let shards = self.encode(&segment)?;
        drop(segment);

        let hashed: Vec<(usize, String, Vec<u8>)> = shards
            .into_par_iter()
            .enumerate()
            .map(|(index, data)| (index, sha256_hex(&data), data))
            .collect();

        let mut plans = Vec::with_capacity(hashed.len());
        for (index, hash, data) in hashed {
            let path = out_dir.join(&hash);
            write_atomic(&path, &data)?;
            plans.push(FragmentPlan { index, hash, path });
        }

        debug!(
            segment = %segment_path.display(),
            fragments = plans.len(),
            "Segment encoded"
        );
        Ok(plans)
    }

    /// Rebuild a segment from fragments in shard order.
    ///
    /// Missing fragments are `None`. When every fragment is present the set
    /// is verified first and only rebuilt if parity does not match. The
    /// result is always verified before the data fragments are joined.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<Vec<u8>> {
        let total = self.layout.total_shards();
        if shards.len() != total {
            return Err(CessError::ShardSizeMismatch {
                expected: total,
                actual: shards.len(),
            });
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.layout.data_shards {
            return Err(CessError::InsufficientShards {
                available,
                required: self.layout.data_shards,
            });
        }

        let fragment_size = self.layout.fragment_size();
        if let Some(bad) = shards
            .iter()
            .flatten()
            .find(|s| s.len() != fragment_size)
        {
            return Err(CessError::ShardSizeMismatch {
                expected: fragment_size,
                actual: bad.len(),
            });
        }

        if available == total && self.verify(shards)? {
            return Ok(self.join_data(shards));
        }

        self.encoder.reconstruct(shards)?;
        if !self.verify(shards)? {
            return Err(CessError::ShardVerificationFailed);
        }
        Ok(self.join_data(shards))
    }

    /// Rebuild a segment and write it to `out_path`
    pub fn reconstruct_to(&self, shards: &mut [Option<Vec<u8>>], out_path: &Path) -> Result<()> {
        let segment = self.reconstruct(shards)?;
        write_atomic(out_path, &segment)
    }

    /// Rebuild a segment from fragment files; a `None` path is a missing fragment
    pub fn reconstruct_files<P: AsRef<Path>>(
        &self,
        fragment_paths: &[Option<P>],
        out_path: &Path,
    ) -> Result<()> {
        let mut shards = fragment_paths
            .iter()
            .map(|p| p.as_ref().map(fs::read).transpose())
            .collect::<std::io::Result<Vec<_>>>()?;
        self.reconstruct_to(&mut shards, out_path)
    }

    /// Verify that a complete fragment set is consistent
    fn verify(&self, shards: &[Option<Vec<u8>>]) -> Result<bool> {
        let refs: Option<Vec<&[u8]>> = shards.iter().map(|s| s.as_deref()).collect();
        match refs {
            Some(refs) => Ok(self.encoder.verify(&refs)?),
            None => Ok(false),
        }
    }

    fn join_data(&self, shards: &[Option<Vec<u8>>]) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.layout.segment_size);
        for shard in shards.iter().take(self.layout.data_shards).flatten() {
            result.extend_from_slice(shard);
        }
        result
    }
}

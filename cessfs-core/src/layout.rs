//! Segment and fragment geometry
//!
//! A [`Layout`] fixes how a file is cut into segments and how each segment
//! is split into erasure-coded fragments. The production network uses the
//! defaults from the crate root; smaller layouts keep the same shape and are
//! used for local testing.

use crate::cipher::BLOCK_SIZE;
use crate::codec::sha256_hex;
use crate::error::{CessError, Result};
use crate::{DATA_SHARDS, PARITY_SHARDS, SEGMENT_SIZE, ZERO_FRAGMENT_HASH};
use serde::{Deserialize, Serialize};

/// Segment/fragment geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Bytes per segment as stored on the network
    pub segment_size: usize,
    /// Number of data fragments (k)
    pub data_shards: usize,
    /// Number of parity fragments (m)
    pub parity_shards: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            segment_size: SEGMENT_SIZE,
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
        }
    }
}

impl Layout {
    /// Create a validated layout
    pub fn new(segment_size: usize, data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(CessError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(CessError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        if segment_size <= BLOCK_SIZE || segment_size % BLOCK_SIZE != 0 {
            return Err(CessError::Configuration(format!(
                "segment_size must be a multiple of {} larger than one block, got {}",
                BLOCK_SIZE, segment_size
            )));
        }
        if segment_size % data_shards != 0 {
            return Err(CessError::Configuration(format!(
                "segment_size {} is not divisible by data_shards {}",
                segment_size, data_shards
            )));
        }
        Ok(Self {
            segment_size,
            data_shards,
            parity_shards,
        })
    }

    /// Read layout overrides from the environment, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let default = Self::default();
        let segment_size = env_usize("CESSFS_SEGMENT_SIZE").unwrap_or(default.segment_size);
        let data = env_usize("CESSFS_DATA_SHARDS").unwrap_or(default.data_shards);
        let parity = env_usize("CESSFS_PARITY_SHARDS").unwrap_or(default.parity_shards);
        Self::new(segment_size, data, parity)
    }

    /// Total fragments per segment
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Bytes per fragment
    pub fn fragment_size(&self) -> usize {
        self.segment_size / self.data_shards
    }

    /// Plaintext bytes carried by one segment.
    ///
    /// Encryption reserves one cipher block so PKCS#7 padding brings the
    /// ciphertext back to exactly `segment_size`.
    pub fn effective_segment_size(&self, encrypted: bool) -> usize {
        if encrypted {
            self.segment_size - BLOCK_SIZE
        } else {
            self.segment_size
        }
    }

    /// Number of segments a file of `file_size` bytes is cut into
    pub fn segment_count(&self, file_size: u64, encrypted: bool) -> u64 {
        file_size.div_ceil(self.effective_segment_size(encrypted) as u64)
    }

    /// Bytes of fragment storage needed for `segments` segments
    pub fn stored_size(&self, segments: u64) -> u64 {
        segments * (self.total_shards() * self.fragment_size()) as u64
    }

    /// Hash of an all-zero fragment for this layout
    pub fn zero_fragment_hash(&self) -> String {
        if *self == Self::default() {
            ZERO_FRAGMENT_HASH.to_string()
        } else {
            sha256_hex(&vec![0u8; self.fragment_size()])
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse::<usize>().ok())
}

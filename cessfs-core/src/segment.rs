//! File segmenting pipeline
//!
//! Turns a local file into a [`ProcessedFile`]:
//! - the file is read in fixed-size segments, the last one zero-padded
//! - each segment is optionally encrypted back up to `segment_size` bytes
//! - each segment is erasure coded into fragments named by their hash
//! - the fid is the hash-tree root over the ordered segment hashes
//!
//! Only one segment buffer is held in memory at a time.

use crate::cipher::{self, CipherKey};
use crate::codec::{read_full, write_content_addressed};
use crate::erasure::ErasureCoder;
use crate::error::{CessError, Result};
use crate::hashtree::build_root;
use crate::layout::Layout;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// One encoded fragment on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentPlan {
    /// Shard index within the segment (0..total_shards)
    pub index: usize,
    /// Lowercase hex SHA-256 of the fragment bytes
    pub hash: String,
    /// Path of the fragment file, named by `hash`
    pub path: PathBuf,
}

/// One segment and its fragments, in shard order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPlan {
    /// Position of the segment in the file
    pub index: usize,
    /// Lowercase hex SHA-256 of the (possibly encrypted) segment
    pub hash: String,
    /// Fragments in shard order
    pub fragments: Vec<FragmentPlan>,
}

/// Result of processing a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    /// Hash-tree root over the segment hashes
    pub fid: String,
    /// Original plaintext size in bytes
    pub file_size: u64,
    /// Whether segments were encrypted
    pub encrypted: bool,
    /// Segments in file order
    pub segments: Vec<SegmentPlan>,
}

impl ProcessedFile {
    /// Segment hashes in order
    pub fn segment_hashes(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.hash.clone()).collect()
    }

    /// Fragments grouped by shard index.
    ///
    /// Group `j` holds fragment `j` of every segment, in segment order. Each
    /// group is placed on a single miner.
    pub fn fragment_groups(&self) -> Vec<Vec<&FragmentPlan>> {
        let shards = self
            .segments
            .first()
            .map(|s| s.fragments.len())
            .unwrap_or(0);
        (0..shards)
            .map(|j| {
                self.segments
                    .iter()
                    .filter_map(|s| s.fragments.get(j))
                    .collect()
            })
            .collect()
    }

    /// Total number of fragments
    pub fn fragment_count(&self) -> usize {
        self.segments.iter().map(|s| s.fragments.len()).sum()
    }
}

/// Segments, encrypts and erasure codes files
pub struct SegmentProcessor {
    layout: Layout,
    coder: ErasureCoder,
}

impl SegmentProcessor {
    /// Create a processor for the default layout
    pub fn new() -> Result<Self> {
        Self::with_layout(Layout::default())
    }

    /// Create a processor for a custom layout
    pub fn with_layout(layout: Layout) -> Result<Self> {
        Ok(Self {
            layout,
            coder: ErasureCoder::with_layout(layout)?,
        })
    }

    /// Get the layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Process `file` into fragments under `workdir`.
    ///
    /// Intermediate segment files are removed once encoded; fragment files
    /// stay in `workdir` for upload.
    #[instrument(skip_all, fields(file = %file.display(), encrypted = key.is_some()))]
    pub fn process(
        &self,
        file: &Path,
        key: Option<&CipherKey>,
        workdir: &Path,
    ) -> Result<ProcessedFile> {
        let metadata = fs::metadata(file)?;
        if !metadata.is_file() {
            return Err(CessError::NotAFile(file.to_path_buf()));
        }
        let file_size = metadata.len();
        if file_size == 0 {
            return Err(CessError::EmptyFile(file.to_path_buf()));
        }
        fs::create_dir_all(workdir)?;

        let encrypted = key.is_some();
        let effective = self.layout.effective_segment_size(encrypted);
        let count = self.layout.segment_count(file_size, encrypted) as usize;
        let mut reader = BufReader::new(File::open(file)?);
        let mut segments = Vec::with_capacity(count);

        for index in 0..count {
            let mut buf = vec![0u8; effective];
            let read = read_full(&mut reader, &mut buf)?;
            let is_last = index + 1 == count;
            if read == 0 || (read < effective && !is_last) {
                return Err(CessError::ShortRead {
                    segment: index,
                    expected: effective,
                    actual: read,
                });
            }

            let segment = match key {
                Some(key) => cipher::encrypt(&buf, key)?,
                None => buf,
            };
            if segment.len() != self.layout.segment_size {
                return Err(CessError::SegmentSizeMismatch {
                    expected: self.layout.segment_size,
                    actual: segment.len(),
                });
            }

            let (hash, segment_path) = write_content_addressed(workdir, &segment)?;
            drop(segment);
            let fragments = self.coder.encode_file(&segment_path, workdir)?;
            fs::remove_file(&segment_path)?;

            debug!(segment = index, hash = %hash, read, "Segment processed");
            segments.push(SegmentPlan {
                index,
                hash,
                fragments,
            });
        }

        let hashes: Vec<&str> = segments.iter().map(|s| s.hash.as_str()).collect();
        let fid = build_root(&hashes)?;

        info!(
            fid = %fid,
            size = file_size,
            segments = segments.len(),
            "File processed"
        );

        Ok(ProcessedFile {
            fid,
            file_size,
            encrypted,
            segments,
        })
    }
}

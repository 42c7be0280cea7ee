//! cessfs Core Library
//!
//! Client-side data preparation for the CESS decentralized storage network.
//! This crate provides:
//! - Fixed-size segmenting of files with optional AES-256-CBC encryption
//! - Reed-Solomon erasure coding (4 data + 2 parity fragments per segment)
//! - SHA-256 content addressing of segments and fragments
//! - The Merkle root that becomes a file's fid
//! - Common types and error handling

pub mod cipher;
pub mod codec;
pub mod erasure;
pub mod error;
pub mod hashtree;
pub mod layout;
pub mod segment;

pub use cipher::{decrypt, encrypt, CipherKey};
pub use codec::{is_hash_name, sha256_hex};
pub use erasure::ErasureCoder;
pub use error::{CessError, Result};
pub use hashtree::{build_root, verify_root, HashTree};
pub use layout::Layout;
pub use segment::{FragmentPlan, ProcessedFile, SegmentPlan, SegmentProcessor};

/// Default erasure coding configuration
/// - 4 data fragments: minimum required to rebuild a segment
/// - 2 parity fragments: any 2 miners may be lost
/// - 6 fragments per segment, one per miner
///
/// Override at runtime via CESSFS_DATA_SHARDS / CESSFS_PARITY_SHARDS env vars.
pub const DATA_SHARDS: usize = 4;
pub const PARITY_SHARDS: usize = 2;
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Size of one segment on the wire
pub const SEGMENT_SIZE: usize = 64 * 1024 * 1024; // 64 MiB

/// Size of one fragment, `SEGMENT_SIZE / DATA_SHARDS`
pub const FRAGMENT_SIZE: usize = SEGMENT_SIZE / DATA_SHARDS; // 16 MiB

/// SHA-256 of an all-zero fragment of `FRAGMENT_SIZE` bytes.
///
/// Fragments with this hash are never fetched; they are synthesized locally.
pub const ZERO_FRAGMENT_HASH: &str =
    "080acf35a507ac9849cfcba47dc2ad83e01b75663a516279c8b9d243b719643e";

/// Length of a lowercase hex SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Territory space is purchased in whole GiB
pub const GIB: u64 = 1024 * 1024 * 1024;

//! Error types for cessfs
//!
//! Provides a unified error type for segmenting, coding and hashing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cessfs core operations
pub type Result<T> = std::result::Result<T, CessError>;

/// Unified error type for the cessfs data path
#[derive(Error, Debug)]
pub enum CessError {
    // ===== Input Errors =====
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Short read in segment {segment}: expected {expected} bytes, got {actual}")]
    ShortRead {
        segment: usize,
        expected: usize,
        actual: usize,
    },

    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Shard size mismatch: expected {expected}, got {actual}")]
    ShardSizeMismatch { expected: usize, actual: usize },

    #[error("Segment size mismatch: expected {expected}, got {actual}")]
    SegmentSizeMismatch { expected: usize, actual: usize },

    #[error("Shard verification failed after reconstruction")]
    ShardVerificationFailed,

    // ===== Cryptography Errors =====
    #[error("Cipher key must not be empty")]
    EmptyKey,

    #[error("Invalid key length: at most {max} bytes, got {actual}")]
    InvalidKeyLength { max: usize, actual: usize },

    #[error("Decryption error: {0}")]
    Decryption(String),

    // ===== Hash Errors =====
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Cannot build a hash tree from an empty list")]
    EmptyHashList,

    #[error("Root mismatch: expected {expected}, computed {actual}")]
    RootMismatch { expected: String, actual: String },

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reed_solomon_erasure::Error> for CessError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        CessError::ErasureCoding(err.to_string())
    }
}

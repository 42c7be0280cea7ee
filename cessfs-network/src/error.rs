//! Selector errors

use thiserror::Error;

/// Result type for selector operations
pub type Result<T> = std::result::Result<T, SelectorError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Requested {requested} peers but at most {max} are tracked")]
    TooManyRequested { requested: usize, max: usize },

    #[error("Insufficient peers: have {available}, need {required}")]
    InsufficientPeers { available: usize, required: usize },

    #[error("Unknown selector strategy: {0}")]
    InvalidStrategy(String),

    #[error("Invalid selector configuration: {0}")]
    Configuration(String),
}

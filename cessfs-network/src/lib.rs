//! cessfs Network Layer
//!
//! Chooses which storage miners to talk to.
//!
//! This crate provides:
//! - `NodeSelector`: allow-list and active peer pools ranked by latency and failures
//! - `Pinger`: round-trip probing of peer addresses (TCP connect by default)
//! - `Blacklist`: a Bloom filter of peers that failed too often
//!
//! # Strategies
//!
//! - `priority` (default): allow-listed and discovered peers compete on rank
//! - `fixed`: only allow-listed peers are ever returned

pub mod blacklist;
pub mod error;
pub mod peer;
pub mod pinger;
pub mod selector;

pub use blacklist::Blacklist;
pub use error::{Result, SelectorError};
pub use peer::{NodeRecord, PeerInfo};
pub use pinger::{Pinger, TcpPinger};
pub use selector::{NodeSelector, PeerIterator, SelectorConfig, SelectorSnapshot, Strategy};

/// Consecutive failures after which a discovered peer is blacklisted
pub const FAILURE_THRESHOLD: u32 = 3;

/// Default cap on the number of tracked peers per pool
pub const DEFAULT_MAX_NODE_NUM: usize = 120;

/// Default latency ceiling for a peer to count as available, in milliseconds
pub const DEFAULT_MAX_TTL_MS: u64 = 300;

//! Node selector
//!
//! Keeps two bounded pools of candidate peers:
//! - the allow-list, loaded once from configuration
//! - the active pool, filled by `flush` with peers discovered elsewhere
//!
//! `flush` probes latency, `feedback` tracks consecutive failures, and
//! `new_iterator` hands out the best available peers. Discovered peers that
//! fail `FAILURE_THRESHOLD` times in a row are evicted and blacklisted for
//! good. Allow-listed peers only sink in the ranking.

use crate::blacklist::Blacklist;
use crate::error::{Result, SelectorError};
use crate::peer::{NodeRecord, PeerInfo};
use crate::pinger::{Pinger, TcpPinger};
use crate::{DEFAULT_MAX_NODE_NUM, DEFAULT_MAX_TTL_MS, FAILURE_THRESHOLD};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Which pools `new_iterator` draws from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Allow-list and active pool merged
    #[default]
    Priority,
    /// Allow-list only
    Fixed,
}

impl FromStr for Strategy {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(Strategy::Priority),
            "fixed" => Ok(Strategy::Fixed),
            other => Err(SelectorError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Priority => write!(f, "priority"),
            Strategy::Fixed => write!(f, "fixed"),
        }
    }
}

/// Selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub strategy: Strategy,
    /// Latency ceiling for a peer to count as available
    pub max_ttl_ms: u64,
    /// Capacity of each pool and cap on iterator length
    pub max_node_num: usize,
    /// Peers that are always considered first-class candidates
    pub allow_list: Vec<PeerInfo>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_ttl_ms: DEFAULT_MAX_TTL_MS,
            max_node_num: DEFAULT_MAX_NODE_NUM,
            allow_list: Vec::new(),
        }
    }
}

impl SelectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            strategy: std::env::var("CESSFS_SELECTOR_STRATEGY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.strategy),
            max_ttl_ms: std::env::var("CESSFS_SELECTOR_MAX_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_ttl_ms),
            max_node_num: std::env::var("CESSFS_SELECTOR_MAX_NODE_NUM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_node_num),
            allow_list: default.allow_list,
        }
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_millis(self.max_ttl_ms)
    }
}

/// Point-in-time copy of selector state
#[derive(Debug, Clone)]
pub struct SelectorSnapshot {
    pub strategy: Strategy,
    pub allowed: Vec<NodeRecord>,
    pub active: Vec<NodeRecord>,
    pub blacklisted: usize,
}

/// Ranked candidates handed out by [`NodeSelector::new_iterator`]
#[derive(Debug)]
pub struct PeerIterator {
    inner: std::vec::IntoIter<PeerInfo>,
}

impl Iterator for PeerIterator {
    type Item = PeerInfo;

    fn next(&mut self) -> Option<PeerInfo> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for PeerIterator {}

/// Tracks and ranks candidate miner peers
pub struct NodeSelector {
    config: SelectorConfig,
    pinger: Arc<dyn Pinger>,
    allowed: RwLock<HashMap<String, NodeRecord>>,
    active: RwLock<HashMap<String, NodeRecord>>,
    blacklist: RwLock<Blacklist>,
}

impl NodeSelector {
    /// Create a selector that probes peers over TCP
    pub fn new(config: SelectorConfig) -> Result<Self> {
        Self::with_pinger(config, Arc::new(TcpPinger))
    }

    /// Create a selector with a custom pinger
    pub fn with_pinger(config: SelectorConfig, pinger: Arc<dyn Pinger>) -> Result<Self> {
        if config.max_node_num == 0 {
            return Err(SelectorError::Configuration(
                "max_node_num must be > 0".to_string(),
            ));
        }
        if config.max_ttl_ms == 0 {
            return Err(SelectorError::Configuration(
                "max_ttl_ms must be > 0".to_string(),
            ));
        }
        if config.allow_list.len() > config.max_node_num {
            warn!(
                configured = config.allow_list.len(),
                max = config.max_node_num,
                "Allow-list larger than max_node_num, truncating"
            );
        }

        let allowed: HashMap<String, NodeRecord> = config
            .allow_list
            .iter()
            .take(config.max_node_num)
            .map(|p| (p.id.clone(), NodeRecord::new(p.clone())))
            .collect();

        info!(
            strategy = %config.strategy,
            allow_list = allowed.len(),
            max_node_num = config.max_node_num,
            "Node selector initialized"
        );

        Ok(Self {
            config,
            pinger,
            allowed: RwLock::new(allowed),
            active: RwLock::new(HashMap::new()),
            blacklist: RwLock::new(Blacklist::default()),
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Probe `peers` and merge the results into the pools.
    ///
    /// Blacklisted peers and peers without a public address are skipped.
    /// Negative points are preserved. Returns how many probed peers are
    /// available.
    pub async fn flush(&self, peers: &[PeerInfo], ping_timeout: Duration) -> usize {
        let probes = peers
            .iter()
            .filter(|p| !self.is_blacklisted(&p.id))
            .filter_map(|p| match p.public_addr() {
                Some(addr) => Some((p, addr)),
                None => {
                    trace!(peer = %p.id, "No public address, skipping");
                    None
                }
            })
            .map(|(peer, addr)| async move {
                let ttl = self.pinger.ping(&addr, ping_timeout).await;
                (peer, ttl.unwrap_or(Duration::ZERO))
            });
        let results = join_all(probes).await;

        let now = Instant::now();
        let max_ttl = self.config.max_ttl();
        let mut available = 0;
        for (peer, ttl) in results {
            let ok = ttl > Duration::ZERO && ttl < max_ttl;
            if ok {
                available += 1;
            }
            self.merge(peer, ttl, ok, now);
        }

        debug!(
            probed = peers.len(),
            available,
            active = self.active.read().len(),
            "Selector flushed"
        );
        available
    }

    /// Probe the allow-listed peers
    pub async fn flush_allowed(&self, ping_timeout: Duration) -> usize {
        let peers: Vec<PeerInfo> = self
            .allowed
            .read()
            .values()
            .map(|r| r.peer.clone())
            .collect();
        self.flush(&peers, ping_timeout).await
    }

    fn merge(&self, peer: &PeerInfo, ttl: Duration, available: bool, now: Instant) {
        let update = |record: &mut NodeRecord| {
            record.ttl = ttl;
            record.available = available;
            record.flushed_at = Some(now);
        };

        if let Some(record) = self.allowed.write().get_mut(&peer.id) {
            update(record);
            return;
        }

        let mut active = self.active.write();
        if let Some(record) = active.get_mut(&peer.id) {
            record.peer = peer.clone();
            update(record);
        } else if active.len() < self.config.max_node_num {
            let mut record = NodeRecord::new(peer.clone());
            update(&mut record);
            active.insert(peer.id.clone(), record);
        } else {
            trace!(peer = %peer.id, "Active pool full, dropping peer");
        }
    }

    /// Report the outcome of an interaction with a peer.
    ///
    /// Success resets the failure count. A discovered peer reaching
    /// `FAILURE_THRESHOLD` failures is evicted and blacklisted.
    pub fn feedback(&self, peer_id: &str, ok: bool) {
        if let Some(record) = self.allowed.write().get_mut(peer_id) {
            if ok {
                record.ne_points = 0;
            } else {
                record.ne_points += 1;
                debug!(peer = %peer_id, ne_points = record.ne_points, "Allow-listed peer failed");
            }
            return;
        }

        let mut active = self.active.write();
        let Some(record) = active.get_mut(peer_id) else {
            trace!(peer = %peer_id, ok, "Feedback for untracked peer");
            return;
        };
        if ok {
            record.ne_points = 0;
            return;
        }

        record.ne_points += 1;
        if record.ne_points >= FAILURE_THRESHOLD {
            active.remove(peer_id);
            drop(active);
            self.blacklist.write().insert(peer_id);
            warn!(peer = %peer_id, "Peer failed {} times, blacklisted", FAILURE_THRESHOLD);
        }
    }

    /// Whether a peer has been blacklisted
    pub fn is_blacklisted(&self, peer_id: &str) -> bool {
        self.blacklist.read().contains(peer_id)
    }

    /// Rank available peers.
    ///
    /// Fewer negative points rank first, then lower latency, then peer id.
    /// At most `max_node_num` peers are returned.
    pub fn new_iterator(&self, min_count: usize) -> Result<PeerIterator> {
        let max = self.config.max_node_num;
        if min_count > max {
            return Err(SelectorError::TooManyRequested {
                requested: min_count,
                max,
            });
        }

        let mut candidates: Vec<NodeRecord> = self
            .allowed
            .read()
            .values()
            .filter(|r| r.available)
            .cloned()
            .collect();
        if self.config.strategy == Strategy::Priority {
            let blacklist = self.blacklist.read();
            candidates.extend(
                self.active
                    .read()
                    .values()
                    .filter(|r| r.available && !blacklist.contains(&r.peer.id))
                    .cloned(),
            );
        }

        candidates.sort_by(|a, b| {
            a.ne_points
                .cmp(&b.ne_points)
                .then(a.ttl.cmp(&b.ttl))
                .then_with(|| a.peer.id.cmp(&b.peer.id))
        });
        candidates.truncate(max);

        if candidates.len() < min_count {
            return Err(SelectorError::InsufficientPeers {
                available: candidates.len(),
                required: min_count,
            });
        }

        let peers: Vec<PeerInfo> = candidates.into_iter().map(|r| r.peer).collect();
        Ok(PeerIterator {
            inner: peers.into_iter(),
        })
    }

    /// Copy of the current pools
    pub fn snapshot(&self) -> SelectorSnapshot {
        SelectorSnapshot {
            strategy: self.config.strategy,
            allowed: self.allowed.read().values().cloned().collect(),
            active: self.active.read().values().cloned().collect(),
            blacklisted: self.blacklist.read().len(),
        }
    }
}

//! Peer identities and per-peer selector state

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// A peer and the addresses it advertises
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer id as registered on chain
    pub id: String,
    /// `host:port` or multiaddr (`/ip4/1.2.3.4/tcp/4001`) strings
    #[serde(default)]
    pub addrs: Vec<String>,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, addrs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            addrs,
        }
    }

    /// First address that is reachable from the public internet, as `host:port`
    pub fn public_addr(&self) -> Option<String> {
        self.addrs
            .iter()
            .filter_map(|a| dial_addr(a))
            .find(|a| is_public(a))
    }
}

/// Selector bookkeeping for one peer
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub peer: PeerInfo,
    /// Last measured round trip; zero when unreachable
    pub ttl: Duration,
    /// Consecutive failures reported through feedback
    pub ne_points: u32,
    /// Whether the last flush found the peer fast enough to use
    pub available: bool,
    /// When the last flush measured this peer
    pub flushed_at: Option<Instant>,
}

impl NodeRecord {
    pub fn new(peer: PeerInfo) -> Self {
        Self {
            peer,
            ttl: Duration::ZERO,
            ne_points: 0,
            available: false,
            flushed_at: None,
        }
    }
}

/// Normalize a multiaddr or `host:port` string into `host:port`
pub fn dial_addr(addr: &str) -> Option<String> {
    if !addr.starts_with('/') {
        return addr.rsplit_once(':').map(|_| addr.to_string());
    }
    let parts: Vec<&str> = addr.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        ["ip4" | "dns" | "dns4" | "dns6", host, "tcp", port, ..] => {
            Some(format!("{}:{}", host, port))
        }
        ["ip6", host, "tcp", port, ..] => Some(format!("[{}]:{}", host, port)),
        _ => None,
    }
}

/// Whether a `host:port` address is outside loopback, private and link-local ranges
pub fn is_public(addr: &str) -> bool {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return is_public_ip(&sock.ip());
    }
    match addr.rsplit_once(':') {
        Some((host, _)) => !host.eq_ignore_ascii_case("localhost") && !host.is_empty(),
        None => false,
    }
}

fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

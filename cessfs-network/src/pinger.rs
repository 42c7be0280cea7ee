//! Peer latency probing

use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::trace;

/// Measures the round trip to a peer address
#[async_trait::async_trait]
pub trait Pinger: Send + Sync {
    /// Round-trip time to `addr` (`host:port`), or `None` when the peer did
    /// not answer within `timeout`
    async fn ping(&self, addr: &str, timeout: Duration) -> Option<Duration>;
}

/// Times a TCP connect to the peer
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPinger;

#[async_trait::async_trait]
impl Pinger for TcpPinger {
    async fn ping(&self, addr: &str, timeout: Duration) -> Option<Duration> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                let rtt = start.elapsed();
                trace!(addr = %addr, rtt_ms = rtt.as_millis() as u64, "Ping ok");
                // A sub-resolution connect still counts as reachable
                Some(rtt.max(Duration::from_micros(1)))
            }
            Ok(Err(e)) => {
                trace!(addr = %addr, error = %e, "Ping failed");
                None
            }
            Err(_) => None,
        }
    }
}

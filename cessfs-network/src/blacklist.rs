//! Bloom-filter blacklist
//!
//! Membership only grows. A peer that was inserted is always reported as
//! blacklisted; an unrelated peer may rarely be reported too, at the
//! configured false-positive rate.

use sha2::{Digest, Sha256};

/// Default number of peers the filter is sized for
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default false-positive rate
pub const DEFAULT_FP_RATE: f64 = 0.001;

/// Fixed-size Bloom filter over peer ids
#[derive(Debug, Clone)]
pub struct Blacklist {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    inserted: usize,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_FP_RATE)
    }
}

impl Blacklist {
    /// Size the filter for `capacity` entries at `fp_rate`
    pub fn with_capacity(capacity: usize, fp_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;
        Self {
            bits: vec![0; num_bits.div_ceil(64) as usize],
            num_bits,
            num_hashes,
            inserted: 0,
        }
    }

    /// Add a peer id
    pub fn insert(&mut self, peer_id: &str) {
        for bit in self.bit_indexes(peer_id) {
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// Whether a peer id may have been inserted
    pub fn contains(&self, peer_id: &str) -> bool {
        self.bit_indexes(peer_id)
            .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    /// Number of insertions so far
    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    // Kirsch-Mitzenmacher double hashing over one SHA-256 digest
    fn bit_indexes(&self, peer_id: &str) -> impl Iterator<Item = u64> {
        let digest = Sha256::digest(peer_id.as_bytes());
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&digest[..8]);
        h2.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(h1);
        let h2 = u64::from_le_bytes(h2) | 1;
        let m = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }
}

use std::collections::VecDeque;

use hmac::{Hmac, Mac};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

// Outcome randomness. Every draw is a float in [0,1); callers map it onto
// symbol tables and probability bands.

pub type HmacSha256 = Hmac<Sha256>;

/// One HMAC-SHA256 block yields eight 4-byte floats.
const FLOATS_PER_BLOCK: usize = 8;

pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

pub fn derive_hash_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

pub fn derive_floats(hmac_bytes: &[u8], count: usize) -> Vec<f64> {
    // Successive 4-byte chunks as big-endian u32, mapped to [0,1)
    let mut out = Vec::with_capacity(count);
    let mut buffer = hmac_bytes.to_vec();
    let mut i = 0usize;
    while out.len() < count {
        if i + 4 > buffer.len() {
            // extend deterministically by hashing the previous buffer
            buffer = Sha256::digest(&buffer).to_vec();
            i = 0;
            continue;
        }
        let v = u32::from_be_bytes([buffer[i], buffer[i + 1], buffer[i + 2], buffer[i + 3]]);
        out.push(v as f64 / (u32::MAX as f64 + 1.0));
        i += 4;
    }
    out
}

/// Replayable stream: HMAC(server_seed, "client_seed:nonce"), nonce advancing
/// once per exhausted block.
pub struct SeededRng {
    server_seed: String,
    client_seed: String,
    nonce: u64,
    pending: VecDeque<f64>,
}

impl SeededRng {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
            pending: VecDeque::with_capacity(FLOATS_PER_BLOCK),
        }
    }

    /// Published commitment to the server seed.
    pub fn seed_hash(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hmac_bytes(&self) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes())
            .expect("HMAC takes keys of any length");
        mac.update(format!("{}:{}", self.client_seed, self.nonce).as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    fn refill(&mut self) {
        let bytes = self.hmac_bytes();
        self.pending.extend(derive_floats(&bytes, FLOATS_PER_BLOCK));
        self.nonce += 1;
    }
}

impl RandomSource for SeededRng {
    fn next_unit(&mut self) -> f64 {
        if self.pending.is_empty() {
            self.refill();
        }
        self.pending.pop_front().unwrap_or(0.0)
    }
}

/// OS-seeded generator used outside of replays.
pub struct EntropyRng(StdRng);

impl EntropyRng {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl Default for EntropyRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropyRng {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// 128-bit random hex token for spin and instance ids.
pub fn random_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = SeededRng::new("server", "client", 1);
        let mut rng2 = SeededRng::new("server", "client", 1);
        assert_eq!(rng1.seed_hash(), rng2.seed_hash());
        assert_eq!(rng1.hmac_bytes(), rng2.hmac_bytes());
        let a: Vec<f64> = (0..20).map(|_| rng1.next_unit()).collect();
        let b: Vec<f64> = (0..20).map(|_| rng2.next_unit()).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|f| (0.0..1.0).contains(f)));
    }

    #[test]
    fn nonce_advances_per_block() {
        let mut rng = SeededRng::new("server", "client", 5);
        let first_block = derive_floats(&rng.hmac_bytes(), FLOATS_PER_BLOCK);
        for expected in &first_block {
            assert_eq!(rng.next_unit(), *expected);
        }
        assert_eq!(rng.nonce(), 6);
        let next = SeededRng::new("server", "client", 6).hmac_bytes();
        assert_eq!(rng.next_unit(), derive_floats(&next, 1)[0]);
    }

    #[test]
    fn derive_floats_extends_past_block() {
        let floats = derive_floats(&[0xff; 32], 20);
        assert_eq!(floats.len(), 20);
        assert!(floats[0] > 0.99);
    }

    #[test]
    fn random_ids_are_distinct() {
        let a = random_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, random_id());
    }
}

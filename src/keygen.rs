// src/keygen.rs
//
// Keys and payloads for injected operations.
//
// Server topology draws a fresh 64-char hex key per operation; collisions are
// not checked. Client topology keys are `dir-{op}/obj-{discriminator}` where the
// discriminator is drawn once per worker launch, so two workers may share one.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Topology;
use crate::constants::{
    CLIENT_DISCRIMINATOR_RANGE, PAYLOAD_BYTE_MAX, PAYLOAD_BYTE_MIN, SEED_MIX, SERVER_KEY_ALPHABET,
    SERVER_KEY_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    RandomHex { len: usize },
    Hierarchical,
}

impl KeyStrategy {
    pub fn for_topology(topology: Topology) -> Self {
        match topology {
            Topology::Server => KeyStrategy::RandomHex {
                len: SERVER_KEY_LEN,
            },
            Topology::Client => KeyStrategy::Hierarchical,
        }
    }
}

/// Per-worker key source. Owned by exactly one worker task.
pub struct WorkerKeys {
    strategy: KeyStrategy,
    discriminator: u32,
    rng: StdRng,
}

impl WorkerKeys {
    /// With a seed, worker `ordinal` always produces the same sequence.
    pub fn new(strategy: KeyStrategy, ordinal: usize, seed: Option<u64>) -> Self {
        let mut rng = worker_rng(ordinal, seed);
        let discriminator = rng.random_range(0..CLIENT_DISCRIMINATOR_RANGE);
        Self {
            strategy,
            discriminator,
            rng,
        }
    }

    pub fn discriminator(&self) -> u32 {
        self.discriminator
    }

    pub fn next_key(&mut self, op_index: usize) -> String {
        match self.strategy {
            KeyStrategy::RandomHex { len } => random_hex(&mut self.rng, len),
            KeyStrategy::Hierarchical => client_key(op_index, self.discriminator),
        }
    }
}

fn worker_rng(ordinal: usize, seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ (ordinal as u64).wrapping_mul(SEED_MIX)),
        None => StdRng::from_os_rng(),
    }
}

pub fn random_hex<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| SERVER_KEY_ALPHABET[rng.random_range(0..SERVER_KEY_ALPHABET.len())] as char)
        .collect()
}

pub fn client_key(op_index: usize, discriminator: u32) -> String {
    format!("dir-{}/obj-{}", op_index, discriminator)
}

/// Printable payload, generated once per pool run and shared read-only.
pub fn payload(size: usize, seed: Option<u64>) -> Bytes {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let buf: Vec<u8> = (0..size)
        .map(|_| rng.random_range(PAYLOAD_BYTE_MIN..PAYLOAD_BYTE_MAX))
        .collect();
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_server_keys_are_hex_and_unique() {
        let mut keys = WorkerKeys::new(KeyStrategy::for_topology(Topology::Server), 0, None);
        let mut seen = HashSet::new();
        for op in 0..10_000 {
            let key = keys.next_key(op);
            assert_eq!(key.len(), SERVER_KEY_LEN);
            assert!(key.bytes().all(|b| SERVER_KEY_ALPHABET.contains(&b)));
            seen.insert(key);
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_client_key_is_stable_per_worker() {
        let mut keys = WorkerKeys::new(KeyStrategy::Hierarchical, 3, None);
        let first = keys.next_key(7);
        assert_eq!(keys.next_key(7), first);
        assert_eq!(first, format!("dir-7/obj-{}", keys.discriminator()));
        assert_ne!(keys.next_key(8), first);
    }

    #[test]
    fn test_discriminator_range() {
        for ordinal in 0..200 {
            let keys = WorkerKeys::new(KeyStrategy::Hierarchical, ordinal, None);
            assert!(keys.discriminator() < CLIENT_DISCRIMINATOR_RANGE);
        }
    }

    #[test]
    fn test_seeded_workers_repeat() {
        let strategy = KeyStrategy::for_topology(Topology::Server);
        let mut a = WorkerKeys::new(strategy, 5, Some(42));
        let mut b = WorkerKeys::new(strategy, 5, Some(42));
        assert_eq!(a.discriminator(), b.discriminator());
        assert_eq!(a.next_key(0), b.next_key(0));

        let mut other = WorkerKeys::new(strategy, 6, Some(42));
        assert_ne!(WorkerKeys::new(strategy, 5, Some(42)).next_key(0), other.next_key(0));
    }

    #[test]
    fn test_payload_is_printable() {
        let data = payload(4096, None);
        assert_eq!(data.len(), 4096);
        assert!(data
            .iter()
            .all(|b| (PAYLOAD_BYTE_MIN..PAYLOAD_BYTE_MAX).contains(b)));
        assert!(payload(0, None).is_empty());
    }
}

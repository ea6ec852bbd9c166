//! ## dissect-mem::hash
//! **Keyed hashing for arena hash maps**
//!
//! Maps resist collision flooding two ways: bucket selection multiplies by a
//! random odd 32-bit multiplier (multiply-shift universal hashing), and keys
//! without a cheap natural hash go through a keyed one-at-a-time hash whose
//! pre- and post-seeds are drawn once per process.

use once_cell::sync::OnceCell;
use rand::Rng;
use tracing::debug;

/// Random values that key every map and strong hash in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSeeds {
    /// Bucket multiplier; always odd.
    pub multiplier: u32,
    pub preseed: u32,
    pub postseed: u32,
}

static SEEDS: OnceCell<HashSeeds> = OnceCell::new();

impl HashSeeds {
    /// Draws a fresh seed set from the thread-local RNG.
    pub fn generate() -> Self {
        Self::from_rng(&mut rand::rng())
    }

    /// Draws a seed set from `rng`.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            multiplier: rng.random::<u32>() | 1,
            preseed: rng.random(),
            postseed: rng.random(),
        }
    }

    /// Keyed one-at-a-time hash of `bytes` under these seeds.
    pub fn strong_hash(&self, bytes: &[u8]) -> u32 {
        #[inline]
        fn spread(h: u32) -> u32 {
            let h = h.wrapping_add(h << 10);
            h ^ (h >> 6)
        }

        let mut h = self.preseed.wrapping_add(bytes.len() as u32);
        for &byte in bytes.iter().chain(self.postseed.to_le_bytes().iter()) {
            h = spread(h).wrapping_add(u32::from(byte));
        }
        h = spread(h);
        h = h.wrapping_add(h << 3);
        h ^= h >> 11;
        h.wrapping_add(h << 15)
    }
}

/// Draws the process-wide seeds if that has not happened yet.
pub fn init_hashing() -> &'static HashSeeds {
    SEEDS.get_or_init(|| {
        let seeds = HashSeeds::generate();
        debug!("hash seeds drawn");
        seeds
    })
}

/// The process-wide seeds, drawn on first use.
pub fn seeds() -> &'static HashSeeds {
    init_hashing()
}

/// Keyed hash of arbitrary bytes under the process seeds.
pub fn strong_hash(bytes: &[u8]) -> u32 {
    seeds().strong_hash(bytes)
}

pub fn str_hash(s: &str) -> u32 {
    strong_hash(s.as_bytes())
}

pub fn int64_hash(value: u64) -> u32 {
    strong_hash(&value.to_le_bytes())
}

pub fn double_hash(value: f64) -> u32 {
    strong_hash(&value.to_bits().to_le_bytes())
}

/// Identity hash for keys that already fit in 32 bits.
pub fn direct_hash(value: u32) -> u32 {
    value
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn seeds_from(seed: u64) -> HashSeeds {
        HashSeeds::from_rng(&mut SmallRng::seed_from_u64(seed))
    }

    /// Straightforward transcription of the mixing schedule.
    fn reference_hash(seeds: &HashSeeds, bytes: &[u8]) -> u32 {
        let mut h = seeds.preseed.wrapping_add(bytes.len() as u32);
        let tail = seeds.postseed.to_le_bytes();
        for &b in bytes.iter().chain(tail.iter()) {
            h = h.wrapping_add(h << 10);
            h ^= h >> 6;
            h = h.wrapping_add(u32::from(b));
        }
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
        h = h.wrapping_add(h << 3);
        h ^= h >> 11;
        h.wrapping_add(h << 15)
    }

    #[test]
    fn test_multiplier_is_always_odd() {
        for seed in 0..256 {
            assert_eq!(seeds_from(seed).multiplier & 1, 1);
        }
    }

    #[test]
    fn test_strong_hash_matches_mixing_schedule() {
        let seeds = seeds_from(7);
        let inputs: [&[u8]; 4] = [b"", b"a", b"coap", b"a much longer key with spaces"];
        for input in inputs {
            assert_eq!(seeds.strong_hash(input), reference_hash(&seeds, input));
        }
    }

    #[test]
    fn test_strong_hash_is_deterministic_per_seed_set() {
        let seeds = seeds_from(42);
        assert_eq!(seeds.strong_hash(b"modbus"), seeds.strong_hash(b"modbus"));
        assert_ne!(seeds.strong_hash(b"modbus"), seeds.strong_hash(b"modbuS"));
    }

    #[test]
    fn test_strong_hash_varies_across_seed_sets() {
        let key = b"192.168.0.1:502";
        let distinct: std::collections::HashSet<u32> =
            (0..16).map(|seed| seeds_from(seed).strong_hash(key)).collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn test_length_is_part_of_the_hash() {
        let seeds = HashSeeds {
            multiplier: 1,
            preseed: 0,
            postseed: 0,
        };
        assert_ne!(seeds.strong_hash(b"\0"), seeds.strong_hash(b"\0\0"));
    }

    #[test]
    fn test_global_seeds_are_stable() {
        let first = *init_hashing();
        assert_eq!(first, *seeds());
        assert_eq!(str_hash("dns"), strong_hash(b"dns"));
        assert_eq!(direct_hash(37), 37);
    }
}

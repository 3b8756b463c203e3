//! Deterministic PRG handles.
//!
//! Every randomized core path draws from an explicit [`Prg`] built from a
//! 16-byte [`PrgKey`]; there is no hidden process-wide RNG. Servers derive
//! fresh subkeys from their own PRG when spawning per-bucket instances, so a
//! single top-level key reproduces an entire deployment.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// Length of a PRG key in bytes.
pub const PRG_KEY_LEN: usize = 16;

/// A 16-byte PRG key. Shipped inside hints so clients can re-expand the
/// server's public `A` matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrgKey(pub [u8; PRG_KEY_LEN]);

impl PrgKey {
    /// Expand the 16-byte key into a 32-byte ChaCha seed by repetition.
    fn expand(&self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        seed[..PRG_KEY_LEN].copy_from_slice(&self.0);
        seed[PRG_KEY_LEN..].copy_from_slice(&self.0);
        seed
    }
}

/// Buffered pseudo-random generator (ChaCha20).
#[derive(Clone)]
pub struct Prg {
    rng: ChaCha20Rng,
}

impl Prg {
    /// Deterministic PRG from a key. Two `Prg`s built from the same key
    /// produce identical streams.
    pub fn from_key(key: &PrgKey) -> Self {
        Self { rng: ChaCha20Rng::from_seed(key.expand()) }
    }

    /// PRG seeded from OS entropy, for per-session query randomness.
    pub fn from_entropy() -> Self {
        Self { rng: ChaCha20Rng::from_entropy() }
    }

    /// Derive a fresh key from this PRG's stream.
    pub fn gen_key(&mut self) -> PrgKey {
        let mut key = [0u8; PRG_KEY_LEN];
        self.rng.fill_bytes(&mut key);
        PrgKey(key)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }

    /// Sample 512-bit seeds (8 little-endian u64 words each) for the ring
    /// backend's public polynomials.
    pub fn sample_poly_seeds(&mut self, num: usize) -> Vec<u64> {
        let mut seeds = vec![0u64; crate::rlwe::POLY_SEED_WORDS * num];
        for word in seeds.iter_mut() {
            let mut buf = [0u8; 8];
            self.rng.fill_bytes(&mut buf);
            *word = u64::from_le_bytes(buf);
        }
        seeds
    }
}

impl std::fmt::Debug for Prg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prg").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: PrgKey = PrgKey([
        100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
    ]);

    #[test]
    fn test_deterministic_streams() {
        let mut a = Prg::from_key(&KEY);
        let mut b = Prg::from_key(&KEY);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_subkeys_diverge() {
        let mut prg = Prg::from_key(&KEY);
        let k1 = prg.gen_key();
        let k2 = prg.gen_key();
        assert_ne!(k1, k2);

        let mut a = Prg::from_key(&k1);
        let mut b = Prg::from_key(&k2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_poly_seed_shape() {
        let mut prg = Prg::from_key(&KEY);
        let seeds = prg.sample_poly_seeds(3);
        assert_eq!(seeds.len(), 3 * crate::rlwe::POLY_SEED_WORDS);
    }
}

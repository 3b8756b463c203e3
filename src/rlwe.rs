//! Ring backend for the hybrid query path.
//!
//! Works over the negacyclic ring `R = Z_{2^W}[X]/(X^n + 1)` where `W` is the
//! element width and `n` the secret dimension for that width. Because the
//! ring modulus equals the LWE modulus, sample extraction needs no modulus
//! switch: coefficient `t` of a ciphertext body `b = a ⊛ s + e + Δ·m` is
//! already an LWE sample under the coefficient rows of `a`.
//!
//! Public `a` polynomials expand deterministically from 512-bit seeds
//! (8 little-endian u64 words), so queries and hints agree on the mask
//! without shipping it.

use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::error::{PirError, Result};
use crate::math::{gauss_sample, Prg};
use crate::matrix::{Elem, Matrix};
use crate::params::secret_dim;

/// Number of u64 words in a public-polynomial seed (512 bits).
pub const POLY_SEED_WORDS: usize = 8;

/// Serialized ciphertext body.
pub type CipherBlob = Vec<u8>;

/// Ring context: dimensions and scaling for one element width.
#[derive(Debug, Clone)]
pub struct RingContext<T: Elem> {
    n: u64,
    p: u64,
    _elem: PhantomData<T>,
}

/// Ring secret key; its coefficient vector doubles as the extracted LWE key.
#[derive(Debug, Clone)]
pub struct RlweKey<T: Elem> {
    s: Vec<T>,
}

/// A public randomness polynomial, expanded from a 512-bit seed.
#[derive(Debug, Clone)]
pub struct APoly<T: Elem> {
    coeffs: Vec<T>,
}

/// Ciphertext under preprocessed encryption: only the body `b` is carried,
/// the mask lives in the hint.
#[derive(Debug, Clone)]
pub struct RlweCiphertext<T: Elem> {
    b: Vec<T>,
}

impl<T: Elem> RlweCiphertext<T> {
    /// Truncate to the first `size` samples.
    pub fn truncate(&mut self, size: usize) {
        self.b.truncate(size);
    }

    /// Serialize: 8-byte little-endian sample count, then the samples.
    pub fn store(&self) -> CipherBlob {
        store_samples(&self.b)
    }
}

fn store_samples<T: Elem>(samples: &[T]) -> CipherBlob {
    let width = (T::BITS / 8) as usize;
    let mut blob = vec![0u8; 8 + samples.len() * width];
    LittleEndian::write_u64(&mut blob[..8], samples.len() as u64);
    for (i, v) in samples.iter().enumerate() {
        let at = 8 + i * width;
        LittleEndian::write_uint(&mut blob[at..at + width], v.to_u64(), width);
    }
    blob
}

/// Expand a 512-bit seed into a ChaCha stream by folding the halves.
fn seed_rng(seed: &[u64]) -> Result<ChaCha20Rng> {
    if seed.len() != POLY_SEED_WORDS {
        return Err(PirError::crypto(format!(
            "polynomial seed must be {} words, got {}",
            POLY_SEED_WORDS,
            seed.len()
        )));
    }
    let mut bytes = [0u8; 64];
    for (i, w) in seed.iter().enumerate() {
        LittleEndian::write_u64(&mut bytes[i * 8..(i + 1) * 8], *w);
    }
    let mut folded = [0u8; 32];
    for i in 0..32 {
        folded[i] = bytes[i] ^ bytes[32 + i];
    }
    Ok(ChaCha20Rng::from_seed(folded))
}

/// Negacyclic product `a ⊛ b` in `Z_{2^W}[X]/(X^n + 1)`, schoolbook.
pub(crate) fn negacyclic_mul<T: Elem>(a: &[T], b: &[T]) -> Vec<T> {
    let n = a.len();
    debug_assert_eq!(n, b.len());
    let mut c = vec![T::default(); n];
    for (i, &ai) in a.iter().enumerate() {
        if ai == T::default() {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            let prod = ai.wrapping_mul(bj);
            let k = i + j;
            if k < n {
                c[k] = c[k].wrapping_add(prod);
            } else {
                c[k - n] = c[k - n].wrapping_sub(prod);
            }
        }
    }
    c
}

impl<T: Elem> RingContext<T> {
    /// Context at the standard secret dimension for width `T`.
    pub fn new(p: u64) -> Self {
        Self::with_dim(secret_dim(T::BITS), p)
    }

    /// Context with an explicit ring dimension (small dimensions are only
    /// meaningful for tests and benches).
    pub fn with_dim(n: u64, p: u64) -> Self {
        Self { n, p, _elem: PhantomData }
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn p(&self) -> u64 {
        self.p
    }

    fn delta(&self) -> u64 {
        ((1u128 << T::BITS) / self.p as u128) as u64
    }

    /// Sample a fresh Gaussian ring key.
    pub fn new_key(&self, prg: &mut Prg) -> RlweKey<T> {
        let s = (0..self.n).map(|_| T::from_signed(gauss_sample(prg))).collect();
        RlweKey { s }
    }

    /// The LWE form of a ring key: its coefficient vector.
    pub fn extract_lwe_key(&self, key: &RlweKey<T>) -> Matrix<T> {
        Matrix::from_raw(key.s.clone(), self.n, 1)
    }

    /// Expand a public polynomial from its 512-bit seed.
    pub fn new_a(&self, seed: &[u64]) -> Result<APoly<T>> {
        let mut rng = seed_rng(seed)?;
        let coeffs = (0..self.n).map(|_| self.uniform(&mut rng)).collect();
        Ok(APoly { coeffs })
    }

    fn uniform(&self, rng: &mut ChaCha20Rng) -> T {
        match T::BITS {
            32 => T::from_u64(rng.next_u32() as u64),
            _ => T::from_u64(rng.next_u64()),
        }
    }

    /// First phase of encryption: `b = a ⊛ s + e`.
    pub fn preprocess_enc(&self, key: &RlweKey<T>, a: &APoly<T>, prg: &mut Prg) -> RlweCiphertext<T> {
        let mut b = negacyclic_mul(&a.coeffs, &key.s);
        for v in b.iter_mut() {
            *v = v.wrapping_add(T::from_signed(gauss_sample(prg)));
        }
        RlweCiphertext { b }
    }

    /// Second phase: add `Δ·m` coefficient-wise and truncate the ciphertext
    /// to the plaintext length.
    pub fn encrypt_preprocessed(&self, ct: &mut RlweCiphertext<T>, data: &[T]) {
        let delta = T::from_u64(self.delta());
        for (b, &m) in ct.b.iter_mut().zip(data.iter()) {
            *b = b.wrapping_add(delta.wrapping_mul(m));
        }
        if data.len() < self.n as usize {
            ct.truncate(data.len());
        }
    }

    /// Parse a serialized ciphertext back into its LWE samples. The sample
    /// count must match what the caller expects for its column block.
    pub fn extract_lwe_ct(&self, blob: &[u8], samples: u64) -> Result<Matrix<T>> {
        if blob.len() < 8 {
            return Err(PirError::crypto("ciphertext blob shorter than its header"));
        }
        let count = LittleEndian::read_u64(&blob[..8]);
        if count != samples {
            return Err(PirError::crypto(format!(
                "ciphertext carries {} samples, expected {}",
                count, samples
            )));
        }
        let width = (T::BITS / 8) as usize;
        let body = &blob[8..];
        if body.len() != count as usize * width {
            return Err(PirError::crypto(format!(
                "ciphertext body is {} bytes, expected {}",
                body.len(),
                count as usize * width
            )));
        }
        let data = body
            .chunks_exact(width)
            .map(|chunk| T::from_u64(LittleEndian::read_uint(chunk, width)))
            .collect();
        Ok(Matrix::from_raw(data, samples, 1))
    }

    /// Compute the hint `DB · A` where `A` stacks, per seed, the negacyclic
    /// coefficient rows of that seed's public polynomial. Parallel over
    /// database rows.
    pub fn compute_hint(&self, db: &Matrix<u32>, seeds: &[u64]) -> Result<Matrix<T>> {
        if seeds.len() % POLY_SEED_WORDS != 0 {
            return Err(PirError::crypto("ragged polynomial seed buffer"));
        }
        let n = self.n as usize;
        let m = db.cols() as usize;
        let num = seeds.len() / POLY_SEED_WORDS;
        if num != m.div_ceil(n) {
            return Err(PirError::dims(format!(
                "{} seeds for {} columns of block size {}",
                num, m, n
            )));
        }

        let mut hint: Matrix<T> = Matrix::zeros(db.rows(), self.n);
        for (bi, seed) in seeds.chunks(POLY_SEED_WORDS).enumerate() {
            let a = self.new_a(seed)?;
            let start = bi * n;
            let width = n.min(m - start);
            let rows = self.negacyclic_rows(&a, width);

            hint.data_mut()
                .par_chunks_mut(n)
                .zip(db.data().par_chunks(m))
                .for_each(|(hint_row, db_row)| {
                    for (t, a_row) in rows.chunks(n).enumerate() {
                        let d = db_row[start + t];
                        if d == 0 {
                            continue;
                        }
                        let d = T::from_u64(d as u64);
                        for (h, &av) in hint_row.iter_mut().zip(a_row.iter()) {
                            *h = h.wrapping_add(d.wrapping_mul(av));
                        }
                    }
                });
        }
        Ok(hint)
    }

    /// The first `width` coefficient rows of multiplication by `a`:
    /// `row_t[j] = a[t-j]` for `j <= t`, else `-a[n+t-j]`.
    fn negacyclic_rows(&self, a: &APoly<T>, width: usize) -> Vec<T> {
        let n = self.n as usize;
        let mut rows = vec![T::default(); width * n];
        for t in 0..width {
            let row = &mut rows[t * n..(t + 1) * n];
            for (j, r) in row.iter_mut().enumerate() {
                *r = if j <= t {
                    a.coeffs[t - j]
                } else {
                    T::default().wrapping_sub(a.coeffs[n + t - j])
                };
            }
        }
        rows
    }

    /// Uniformly random serialized ciphertexts, one per `n`-sample block.
    /// Used for dummy queries, which must be indistinguishable from real
    /// ones without decrypting to anything meaningful.
    pub fn store_random_cts(&self, samples: u64, seed: &[u64]) -> Result<Vec<CipherBlob>> {
        let mut rng = seed_rng(seed)?;
        let n = self.n;
        let num = samples.div_ceil(n);
        let mut blobs = Vec::with_capacity(num as usize);
        for i in 0..num {
            let count = n.min(samples - i * n);
            let body: Vec<T> = (0..count).map(|_| self.uniform(&mut rng)).collect();
            blobs.push(store_samples(&body));
        }
        Ok(blobs)
    }

    /// Nearest-Δ rounding of every sample, reduced mod `p`.
    pub fn round_lwe_inplace(&self, vec: &mut Matrix<T>) {
        let delta = self.delta() as u128;
        let p = self.p as u128;
        for v in vec.data_mut().iter_mut() {
            let rounded = ((v.to_u64() as u128 + delta / 2) / delta) % p;
            *v = T::from_u64(rounded as u64);
        }
    }
}

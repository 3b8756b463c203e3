//! LWE-compatible database encoding.
//!
//! Raw records arrive as 32-bit limbs in big-endian limb order. Each record
//! is decomposed into `Ne` base-`p` digits (little-endian) and stacked
//! vertically in its column, so record `i` lives at column `i % M`, rows
//! `(i / M)·Ne .. (i / M)·Ne + Ne`. [`DbInfo::reconstruct_elem`] inverts the
//! decomposition exactly.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{PirError, Result};
use crate::math::Prg;
use crate::matrix::{Matrix, SQUISH_RATIO};

/// Number of 32-bit limbs a record of `bits_per` bits occupies.
pub fn num_limbs(bits_per: u64) -> u64 {
    bits_per.div_ceil(32)
}

/// Number of base-`p` digits a record of `bits_per` bits occupies.
pub fn elem_width(bits_per: u64, p: u64) -> u64 {
    if bits_per as f64 <= (p as f64).log2() {
        1
    } else {
        (bits_per as f64 / (p as f64).log2()).ceil() as u64
    }
}

/// Database metadata; read-only after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInfo {
    /// Number of records.
    pub n: u64,
    /// Bits per record.
    pub bits_per: u64,
    /// Encoded height.
    pub l: u64,
    /// Encoded width.
    pub m: u64,
    /// Plaintext modulus (zero for the trivial local scheme).
    pub p: u64,
    /// Z_p elements per record.
    pub ne: u64,
    /// Packed elements per word after squishing (zero if unsquished).
    pub squishing: u64,
}

impl DbInfo {
    /// Derive the layout for `data_len` raw limbs of `bits_per`-bit records
    /// over `cols` columns and plaintext modulus `p`.
    pub fn new(data_len: u64, bits_per: u64, cols: u64, p: u64) -> Result<Self> {
        let limbs = num_limbs(bits_per);
        if data_len % limbs != 0 {
            return Err(PirError::dims(format!(
                "{} limbs do not divide into {}-limb records",
                data_len, limbs
            )));
        }
        let n = data_len / limbs;

        let (ne, total_elems) = if p == 0 {
            (limbs, n)
        } else if bits_per as f64 <= (p as f64).log2() {
            (1, n)
        } else {
            let ne = elem_width(bits_per, p);
            (ne, n * ne)
        };

        // Records spanning multiple elements stack vertically, so the height
        // must be a multiple of ne.
        let mut l = total_elems.div_ceil(cols);
        if l % ne != 0 {
            l += ne - (l % ne);
        }

        Ok(Self { n, bits_per, l, m: cols, p, ne, squishing: 0 })
    }

    /// Invert the base-`p` digit decomposition of one record back into its
    /// 32-bit limbs (big-endian limb order).
    pub fn reconstruct_elem(&self, vals: &[u32]) -> Vec<u32> {
        if self.p == 0 {
            return vals.to_vec();
        }
        if self.bits_per as f64 <= (self.p as f64).log2() {
            // Single-digit records; fold defensively in case callers hand us
            // more than one value.
            let p = self.p as u32;
            let mut result = vals[0];
            for &v in &vals[1..] {
                result = result.wrapping_mul(p).wrapping_add(v);
            }
            return vec![result];
        }

        // Digits are little-endian base p
        let p = BigUint::from(self.p);
        let mut val = BigUint::from(vals[vals.len() - 1]);
        for i in 0..(self.ne as usize - 1) {
            val = val * &p + BigUint::from(vals[vals.len() - 2 - i]);
        }

        // Split back into 32-bit limbs; the leading limb holds the remainder
        // of bits_per mod 32.
        let limbs = num_limbs(self.bits_per) as usize;
        let mut result = vec![0u32; limbs];
        let final_bits = self.bits_per - (limbs as u64 - 1) * 32;
        let mask = (BigUint::from(1u64) << final_bits) - 1u32;
        result[limbs - 1] = low_u32(&(&val & &mask));
        val >>= final_bits;
        for i in 0..limbs - 1 {
            result[limbs - 2 - i] = low_u32(&(&val & &BigUint::from(u32::MAX)));
            val >>= 32;
        }
        result
    }
}

fn low_u32(v: &BigUint) -> u32 {
    v.iter_u32_digits().next().unwrap_or(0)
}

/// An encoded database: metadata plus the packed element matrix. The data
/// matrix is always 32-bit; query width only affects hints and answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Db {
    pub info: DbInfo,
    pub data: Matrix<u32>,
}

impl Db {
    /// Encode raw limbs into a fresh database.
    pub fn new(data: &[u32], bits_per: u64, cols: u64, p: u64) -> Result<Self> {
        if p == 0 {
            return Err(PirError::dims("plaintext modulus must be nonzero"));
        }
        let info = DbInfo::new(data.len() as u64, bits_per, cols, p)?;
        let mut db = Db { info, data: Matrix::zeros(info.l, info.m) };

        if bits_per as f64 > (p as f64).log2() {
            // Multi-element records: assemble the limbs into a big integer,
            // then emit little-endian base-p digits.
            let limbs = num_limbs(bits_per);
            let p_big = BigUint::from(p);
            for i in 0..info.n {
                let mut val = BigUint::from(data[(i * limbs) as usize]);
                for j in 0..limbs - 1 {
                    let shift = u64::min(32, bits_per - 32 * (j + 1));
                    val <<= shift;
                    val += BigUint::from(data[(i * limbs + j + 1) as usize]);
                }
                for j in 0..info.ne {
                    let digit = low_u32(&(&val % &p_big));
                    val /= &p_big;
                    db.data.set((i / info.m) * info.ne + j, i % info.m, digit);
                }
            }
        } else {
            let p32 = p as u32;
            for (i, &entry) in data.iter().enumerate() {
                let i = i as u64;
                for j in 0..info.ne {
                    let mut e = entry;
                    for _ in 0..j {
                        e /= p32;
                    }
                    db.data.set((i / info.m) * info.ne + j, i % info.m, e % p32);
                }
            }
        }

        Ok(db)
    }

    /// A database of uniformly random elements, for benches. Overflow slots
    /// in the last row are zeroed.
    pub fn random(prg: &mut Prg, data_len: u64, bits_per: u64, cols: u64, p: u64) -> Result<Self> {
        let info = DbInfo::new(data_len, bits_per, cols, p)?;
        let max = if bits_per >= 64 { p } else { p.min(1 << bits_per) };
        let mut db = Db { info, data: Matrix::random(prg, info.l, info.m, max) };

        let row = info.l - 1;
        for i in data_len..info.l * info.m {
            db.data.set(row, i % info.m, 0);
        }
        Ok(db)
    }

    /// Pack the data matrix in place when the modulus permits, widening
    /// per-cycle arithmetic density. Records the ratio in the info.
    pub fn squish(&mut self) {
        if Matrix::<u32>::can_squish(self.info.p) {
            self.info.squishing = SQUISH_RATIO;
            self.data.squish();
        }
    }
}

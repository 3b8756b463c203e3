//! Dense matrices over 32- or 64-bit wrapping arithmetic.
//!
//! All LWE arithmetic in this crate happens modulo `2^W`, where `W` is the
//! element width. The width is chosen once at top-level construction through
//! the [`Elem`] trait (32 or 64 bits); everything downstream is monomorphic.
//!
//! Databases are always stored as 32-bit limbs ([`Matrix<u32>`]) regardless
//! of the query width, so the product routines come in three flavors:
//! same-width ([`mul`]), database-by-query ([`mul_db`]) and the packed
//! variant ([`mul_vec_packed`]) used after [`Matrix::squish`].

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PirError, Result};
use crate::math::{gauss_sample, Prg};

/// Log2 of the packed-element basis used by squishing.
pub const SQUISH_BASIS: u64 = 10;

/// Number of database elements packed per 32-bit word when squished.
pub const SQUISH_RATIO: u64 = 3;

/// An element width: unsigned 32- or 64-bit integers with wrapping
/// (mod `2^W`) arithmetic.
pub trait Elem:
    Copy
    + Default
    + std::fmt::Debug
    + PartialEq
    + Eq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Width in bits (the LWE modulus is `2^BITS`).
    const BITS: u64;

    fn from_u64(v: u64) -> Self;
    fn to_u64(self) -> u64;

    /// Centered representative of a signed value mod `2^BITS`.
    fn from_signed(v: i64) -> Self {
        Self::from_u64(v as u64)
    }

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;

    /// Sample an element; `max == 0` means uniform over the full width.
    fn sample(prg: &mut Prg, max: u64) -> Self;
}

impl Elem for u32 {
    const BITS: u64 = 32;

    fn from_u64(v: u64) -> Self {
        v as u32
    }

    fn to_u64(self) -> u64 {
        self as u64
    }

    fn wrapping_add(self, rhs: Self) -> Self {
        u32::wrapping_add(self, rhs)
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        u32::wrapping_sub(self, rhs)
    }

    fn wrapping_mul(self, rhs: Self) -> Self {
        u32::wrapping_mul(self, rhs)
    }

    fn sample(prg: &mut Prg, max: u64) -> Self {
        if max == 0 {
            prg.next_u32()
        } else {
            (prg.next_u64() % max) as u32
        }
    }
}

impl Elem for u64 {
    const BITS: u64 = 64;

    fn from_u64(v: u64) -> Self {
        v
    }

    fn to_u64(self) -> u64 {
        self
    }

    fn wrapping_add(self, rhs: Self) -> Self {
        u64::wrapping_add(self, rhs)
    }

    fn wrapping_sub(self, rhs: Self) -> Self {
        u64::wrapping_sub(self, rhs)
    }

    fn wrapping_mul(self, rhs: Self) -> Self {
        u64::wrapping_mul(self, rhs)
    }

    fn sample(prg: &mut Prg, max: u64) -> Self {
        if max == 0 {
            prg.next_u64()
        } else {
            prg.next_u64() % max
        }
    }
}

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix<T> {
    rows: u64,
    cols: u64,
    data: Vec<T>,
}

impl<T: Elem> Matrix<T> {
    pub fn zeros(rows: u64, cols: u64) -> Self {
        Self { rows, cols, data: vec![T::default(); (rows * cols) as usize] }
    }

    /// Build from raw data, zero-padding up to `rows * cols` elements.
    pub fn from_raw(mut data: Vec<T>, rows: u64, cols: u64) -> Self {
        data.resize((rows * cols) as usize, T::default());
        Self { rows, cols, data }
    }

    /// Uniformly random matrix; `max == 0` samples the full element width.
    pub fn random(prg: &mut Prg, rows: u64, cols: u64, max: u64) -> Self {
        let data = (0..rows * cols).map(|_| T::sample(prg, max)).collect();
        Self { rows, cols, data }
    }

    /// Column vector of discrete Gaussian samples.
    pub fn gaussian(prg: &mut Prg, rows: u64) -> Self {
        let data = (0..rows).map(|_| T::from_signed(gauss_sample(prg))).collect();
        Self { rows, cols: 1, data }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn cols(&self) -> u64 {
        self.cols
    }

    /// Total number of elements.
    pub fn size(&self) -> u64 {
        self.rows * self.cols
    }

    /// Size of the raw data in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size() * T::BITS / 8
    }

    pub fn get(&self, row: u64, col: u64) -> T {
        self.data[(row * self.cols + col) as usize]
    }

    pub fn set(&mut self, row: u64, col: u64, val: T) {
        self.data[(row * self.cols + col) as usize] = val;
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Elementwise wrapping add.
    pub fn add(&mut self, other: &Matrix<T>) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(PirError::dims(format!(
                "add {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_add(*b);
        }
        Ok(())
    }

    /// Elementwise wrapping subtract.
    pub fn sub(&mut self, other: &Matrix<T>) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(PirError::dims(format!(
                "sub {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_sub(*b);
        }
        Ok(())
    }

    /// Scale every element by a constant (wrapping).
    pub fn mul_const(&mut self, c: T) {
        for v in self.data.iter_mut() {
            *v = v.wrapping_mul(c);
        }
    }

    /// Extend a column vector with trailing zero rows.
    pub fn append_zeros(&mut self, num: u64) {
        debug_assert_eq!(self.cols, 1);
        self.data.extend(std::iter::repeat(T::default()).take(num as usize));
        self.rows += num;
    }

    /// Stack another column vector below this one.
    pub fn concat(&mut self, other: &Matrix<T>) {
        debug_assert_eq!(self.cols.max(1), 1);
        debug_assert_eq!(other.cols, 1);
        self.data.extend_from_slice(&other.data);
        self.rows += other.rows;
        self.cols = 1;
    }
}

/// `lhs * rhs` over a shared element width. Parallelized over output rows.
pub fn mul<T: Elem>(lhs: &Matrix<T>, rhs: &Matrix<T>) -> Result<Matrix<T>> {
    if lhs.cols != rhs.rows {
        return Err(PirError::dims(format!(
            "mul {}x{} by {}x{}",
            lhs.rows, lhs.cols, rhs.rows, rhs.cols
        )));
    }
    let mut out: Matrix<T> = Matrix::zeros(lhs.rows, rhs.cols);
    let cols = rhs.cols as usize;
    let inner = lhs.cols as usize;
    out.data
        .par_chunks_mut(cols)
        .zip(lhs.data.par_chunks(inner))
        .for_each(|(out_row, lhs_row)| {
            for (k, &l) in lhs_row.iter().enumerate() {
                if l == T::default() {
                    continue;
                }
                let rhs_row = &rhs.data[k * cols..(k + 1) * cols];
                for (o, &r) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *o = o.wrapping_add(l.wrapping_mul(r));
                }
            }
        });
    Ok(out)
}

/// Database product: 32-bit limb matrix times a width-`T` matrix.
pub fn mul_db<T: Elem>(db: &Matrix<u32>, rhs: &Matrix<T>) -> Result<Matrix<T>> {
    if db.cols != rhs.rows {
        return Err(PirError::dims(format!(
            "mul_db {}x{} by {}x{}",
            db.rows, db.cols, rhs.rows, rhs.cols
        )));
    }
    let mut out: Matrix<T> = Matrix::zeros(db.rows, rhs.cols);
    let cols = rhs.cols as usize;
    let inner = db.cols as usize;
    out.data
        .par_chunks_mut(cols)
        .zip(db.data.par_chunks(inner))
        .for_each(|(out_row, db_row)| {
            for (k, &d) in db_row.iter().enumerate() {
                if d == 0 {
                    continue;
                }
                let d = T::from_u64(d as u64);
                let rhs_row = &rhs.data[k * cols..(k + 1) * cols];
                for (o, &r) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *o = o.wrapping_add(d.wrapping_mul(r));
                }
            }
        });
    Ok(out)
}

/// Database-vector product against a squished database.
///
/// `v` must already be padded to a multiple of [`SQUISH_RATIO`] samples.
pub fn mul_vec_packed<T: Elem>(db: &Matrix<u32>, v: &Matrix<T>) -> Result<Matrix<T>> {
    if v.rows < db.cols * SQUISH_RATIO || v.cols != 1 {
        return Err(PirError::dims(format!(
            "packed product needs a {}x1 vector, got {}x{}",
            db.cols * SQUISH_RATIO,
            v.rows,
            v.cols
        )));
    }
    let mask = (1u32 << SQUISH_BASIS) - 1;
    let mut out = Matrix::zeros(db.rows, 1);
    let inner = db.cols as usize;
    out.data
        .par_iter_mut()
        .zip(db.data.par_chunks(inner))
        .for_each(|(o, db_row)| {
            let mut acc = T::default();
            for (c, &word) in db_row.iter().enumerate() {
                let base = c * SQUISH_RATIO as usize;
                for k in 0..SQUISH_RATIO as usize {
                    let e = (word >> (SQUISH_BASIS as usize * k)) & mask;
                    if e != 0 {
                        acc = acc
                            .wrapping_add(T::from_u64(e as u64).wrapping_mul(v.data[base + k]));
                    }
                }
            }
            *o = acc;
        });
    Ok(out)
}

/// `A * s` where `A` is a `rows x cols` matrix expanded on the fly from
/// `prg`, in the same row-major order as [`Matrix::random`]. Avoids
/// materializing `A` on the client.
pub fn seeded_mul<T: Elem>(prg: &mut Prg, rows: u64, cols: u64, s: &Matrix<T>) -> Result<Matrix<T>> {
    if s.rows != cols || s.cols != 1 {
        return Err(PirError::dims(format!(
            "seeded_mul expects a {}x1 vector, got {}x{}",
            cols, s.rows, s.cols
        )));
    }
    let mut out = Matrix::zeros(rows, 1);
    for r in 0..rows as usize {
        let mut acc = T::default();
        for &sv in s.data.iter() {
            let a = T::sample(prg, 0);
            acc = acc.wrapping_add(a.wrapping_mul(sv));
        }
        out.data[r] = acc;
    }
    Ok(out)
}

impl Matrix<u32> {
    /// Whether databases over modulus `p` can be packed three-per-word.
    pub fn can_squish(p: u64) -> bool {
        p <= 1 << SQUISH_BASIS
    }

    /// Pack [`SQUISH_RATIO`] consecutive columns into each 32-bit word.
    pub fn squish(&mut self) {
        let packed_cols = self.cols.div_ceil(SQUISH_RATIO);
        let mut packed = vec![0u32; (self.rows * packed_cols) as usize];
        for r in 0..self.rows as usize {
            let row = &self.data[r * self.cols as usize..(r + 1) * self.cols as usize];
            let out = &mut packed[r * packed_cols as usize..(r + 1) * packed_cols as usize];
            for (c, &e) in row.iter().enumerate() {
                out[c / SQUISH_RATIO as usize] |=
                    e << (SQUISH_BASIS as usize * (c % SQUISH_RATIO as usize));
            }
        }
        self.data = packed;
        self.cols = packed_cols;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PrgKey;

    fn prg() -> Prg {
        Prg::from_key(&PrgKey([3u8; 16]))
    }

    #[test]
    fn test_mul_identity() {
        let mut p = prg();
        let m = Matrix::<u32>::random(&mut p, 4, 4, 100);
        let mut id = Matrix::<u32>::zeros(4, 4);
        for i in 0..4 {
            id.set(i, i, 1);
        }
        assert_eq!(mul(&m, &id).unwrap(), m);
    }

    #[test]
    fn test_mul_dimension_mismatch() {
        let mut p = prg();
        let a = Matrix::<u64>::random(&mut p, 3, 5, 10);
        let b = Matrix::<u64>::random(&mut p, 4, 2, 10);
        assert!(matches!(mul(&a, &b), Err(PirError::DimensionMismatch(_))));
    }

    #[test]
    fn test_mul_db_matches_widened_mul() {
        let mut p = prg();
        let db = Matrix::<u32>::random(&mut p, 7, 9, 1000);
        let v = Matrix::<u64>::random(&mut p, 9, 1, 0);
        let widened =
            Matrix::<u64>::from_raw(db.data().iter().map(|&e| e as u64).collect(), 7, 9);
        assert_eq!(mul_db(&db, &v).unwrap(), mul(&widened, &v).unwrap());
    }

    #[test]
    fn test_squish_preserves_products() {
        let mut p = prg();
        let pmod = 997u64;
        let db = Matrix::<u32>::random(&mut p, 16, 10, pmod);
        let mut v = Matrix::<u32>::random(&mut p, 10, 1, 0);

        let plain = mul_db(&db, &v).unwrap();

        assert!(Matrix::<u32>::can_squish(pmod));
        let mut squished = db.clone();
        squished.squish();
        v.append_zeros(SQUISH_RATIO - (db.cols() % SQUISH_RATIO));
        let packed = mul_vec_packed(&squished, &v).unwrap();

        assert_eq!(plain, packed);
    }

    #[test]
    fn test_seeded_mul_matches_materialized() {
        let key = PrgKey([9u8; 16]);
        let mut p = prg();
        let s = Matrix::<u64>::gaussian(&mut p, 6);

        let a = Matrix::<u64>::random(&mut Prg::from_key(&key), 8, 6, 0);
        let expected = mul(&a, &s).unwrap();
        let streamed = seeded_mul(&mut Prg::from_key(&key), 8, 6, &s).unwrap();
        assert_eq!(expected, streamed);
    }

    #[test]
    fn test_add_sub_roundtrip() {
        let mut p = prg();
        let mut a = Matrix::<u32>::random(&mut p, 5, 5, 0);
        let orig = a.clone();
        let b = Matrix::<u32>::random(&mut p, 5, 5, 0);
        a.add(&b).unwrap();
        a.sub(&b).unwrap();
        assert_eq!(a, orig);
    }
}

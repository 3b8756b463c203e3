//! Matrix-shape selection and bucket packing policies.
//!
//! Dimension selection walks the width-specific plaintext-modulus table in
//! ascending cutoff order and takes the first shape whose column count stays
//! inside the cutoff; the cutoffs encode LWE noise-budget limits, so
//! violating them loses correctness and selection fails instead.

pub mod dpir;
pub mod pbc;

use serde::{Deserialize, Serialize};

use crate::error::{PirError, Result};
use crate::lhe::{elem_width, num_limbs};
use crate::matrix::Elem;
use crate::params::{pmod_for, pmod_options};

/// How bucket matrices are shaped relative to the original database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packing {
    /// Square per-bucket dimensions, balancing communication and storage.
    Balanced,
    /// Total columns capped at the original width.
    FixedComm,
    /// Total rows capped at the original (encoded) height.
    FixedStorage,
}

/// Approximately square `(rows, cols, p)` for `entries` records of
/// `bits_per` bits.
pub fn approx_square_dims<T: Elem>(entries: u64, bits_per: u64) -> Result<(u64, u64, u64)> {
    for &cutoff in pmod_options(T::BITS) {
        let p = pmod_for(T::BITS, cutoff).expect("table covers every cutoff");
        let width = elem_width(bits_per, p);
        let size = entries * width;

        let mut rows = (size as f64).sqrt().floor() as u64;
        rows = rows.max(1);
        while rows % width != 0 {
            rows += 1;
        }
        let cols = size.div_ceil(rows).max(1);
        if cols <= cutoff {
            return Ok((rows, cols, p));
        }
    }
    Err(PirError::Infeasible { entries, bits_per })
}

/// Like [`approx_square_dims`] but with the column count capped.
pub fn approx_col_constraint<T: Elem>(
    entries: u64,
    bits_per: u64,
    max_cols: u64,
) -> Result<(u64, u64, u64)> {
    let (rows, cols, p) = approx_square_dims::<T>(entries, bits_per)?;
    if cols <= max_cols {
        return Ok((rows, cols, p));
    }

    let cols = max_cols;
    for &cutoff in pmod_options(T::BITS) {
        if cols <= cutoff {
            let p = pmod_for(T::BITS, cutoff).expect("table covers every cutoff");
            let width = elem_width(bits_per, p);
            let size = entries * width;

            let mut rows = size.div_ceil(cols).max(1);
            while rows % width != 0 {
                rows += 1;
            }
            return Ok((rows, cols, p));
        }
    }
    Err(PirError::Infeasible { entries, bits_per })
}

/// Like [`approx_square_dims`] but with the row count capped; rows round
/// down to the element width so records stay column-local.
pub fn approx_row_constraint<T: Elem>(
    entries: u64,
    bits_per: u64,
    max_rows: u64,
) -> Result<(u64, u64, u64)> {
    let (rows, cols, p) = approx_square_dims::<T>(entries, bits_per)?;
    if rows <= max_rows {
        return Ok((rows, cols, p));
    }

    for &cutoff in pmod_options(T::BITS) {
        let p = pmod_for(T::BITS, cutoff).expect("table covers every cutoff");
        let width = elem_width(bits_per, p);
        let size = entries * width;

        let mut rows = max_rows;
        rows -= rows % width;
        if rows == 0 {
            continue;
        }
        let cols = size.div_ceil(rows).max(1);
        if cols <= cutoff {
            return Ok((rows, cols, p));
        }
    }
    Err(PirError::Infeasible { entries, bits_per })
}

/// Per-bucket matrix parameters for a set of bucket sizes (raw limb counts).
///
/// Buckets are processed in ascending size order so the constrained policies
/// can donate unused quota to the buckets that need it most. The returned
/// dimensions describe the *encoded* matrices; callers allocating raw
/// storage must rescale by `num_limbs / elem_width`.
pub fn packing_dims<T: Elem>(
    sizes: &[u64],
    bits_per: u64,
    orig_rows: u64,
    orig_cols: u64,
    orig_p: u64,
    method: Packing,
) -> Result<(Vec<u64>, Vec<u64>, Vec<u64>)> {
    let limbs = num_limbs(bits_per);

    // `orig_rows` counts raw limb rows; rescale to the encoded height.
    let orig_width = elem_width(bits_per, orig_p);
    let orig_rows = (orig_rows / limbs) * orig_width;

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by_key(|&i| sizes[i] / limbs);

    let mut rows = vec![0u64; sizes.len()];
    let mut cols = vec![0u64; sizes.len()];
    let mut pmods = vec![0u64; sizes.len()];
    let mut free = 0u64;

    for &i in &order {
        let entries = sizes[i] / limbs;
        match method {
            Packing::Balanced => {
                (rows[i], cols[i], pmods[i]) = approx_square_dims::<T>(entries, bits_per)?;
            }
            Packing::FixedComm => {
                let max_cols = orig_cols / sizes.len() as u64 + free;
                (rows[i], cols[i], pmods[i]) =
                    approx_col_constraint::<T>(entries, bits_per, max_cols)?;
                free = max_cols - cols[i];
            }
            Packing::FixedStorage => {
                let max_rows = orig_rows / sizes.len() as u64 + free;
                (rows[i], cols[i], pmods[i]) =
                    approx_row_constraint::<T>(entries, bits_per, max_rows)?;
                free = max_rows - rows[i];
            }
        }
    }
    Ok((rows, cols, pmods))
}

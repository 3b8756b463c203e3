//! Discrete Gaussian sampling for LWE noise and secrets.
//!
//! Rejection sampling over a fixed CDF table with std-dev 3.2, modeled on
//! Albrecht's dgs sampler. The table values must not be regenerated: noise
//! budgets in the parameter tables assume this exact distribution.

use crate::math::prg::Prg;

/// Standard deviation of the error distribution.
pub const GAUSS_STD_DEV: f64 = 3.2;

/// CDF table for a discrete Gaussian with std-dev 3.2.
const CDF_TABLE: [f64; 65] = [
    0.5, 0.952345, 0.822578, 0.644389, 0.457833,
    0.295023, 0.172422, 0.0913938, 0.0439369, 0.0191572,
    0.00757568, 0.00271706, 0.000883826, 0.000260749, 6.97696e-05,
    1.69316e-05, 3.72665e-06, 7.43923e-07, 1.34687e-07, 2.21163e-08,
    3.29371e-09, 4.44886e-10, 5.45004e-11, 6.05535e-12, 6.10194e-13,
    5.57679e-14, 4.62263e-15, 3.47522e-16, 2.36954e-17, 1.46533e-18,
    8.21851e-20, 4.18062e-21, 1.92875e-22, 8.07049e-24, 3.06275e-25,
    1.05418e-26, 3.29081e-28, 9.31708e-30, 2.39247e-31, 5.57187e-33,
    1.17691e-34, 2.25463e-36, 3.91737e-38, 6.1731e-40, 8.82266e-42,
    1.14363e-43, 1.34449e-45, 1.43357e-47, 1.38634e-49, 1.21593e-51,
    9.67246e-54, 6.97835e-56, 4.56622e-58, 2.70987e-60, 1.45858e-62,
    7.12032e-65, 3.15252e-67, 1.26591e-69, 4.6104e-72, 1.52287e-74,
    4.56219e-77, 1.23958e-79, 3.05465e-82, 6.82713e-85, 1.3839e-87,
];

/// Draw one sample from the centered discrete Gaussian.
pub fn gauss_sample(prg: &mut Prg) -> i64 {
    let mut x;
    loop {
        x = (prg.next_u64() % CDF_TABLE.len() as u64) as usize;
        let y = prg.next_f64();
        if y < CDF_TABLE[x] {
            break;
        }
    }

    // Fair coin for the sign
    if prg.next_u64() % 2 == 0 {
        -(x as i64)
    } else {
        x as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::prg::PrgKey;
    use std::collections::HashMap;

    fn test_prg() -> Prg {
        Prg::from_key(&PrgKey([7u8; 16]))
    }

    #[test]
    fn test_table_bounds() {
        let mut prg = test_prg();
        for _ in 0..10_000 {
            let s = gauss_sample(&mut prg);
            assert!(s.unsigned_abs() < CDF_TABLE.len() as u64);
        }
    }

    #[test]
    fn test_symmetry_and_mean() {
        let mut prg = test_prg();
        let n = 100_000;
        let mut sum = 0i64;
        let mut pos = 0u64;
        let mut neg = 0u64;
        for _ in 0..n {
            let s = gauss_sample(&mut prg);
            sum += s;
            if s > 0 {
                pos += 1;
            } else if s < 0 {
                neg += 1;
            }
        }
        let mean = sum as f64 / n as f64;
        assert!(mean.abs() < 0.1, "mean {} too far from 0", mean);
        let ratio = pos as f64 / neg as f64;
        assert!((ratio - 1.0).abs() < 0.05, "asymmetric: {} vs {}", pos, neg);
    }

    #[test]
    fn test_variance() {
        let mut prg = test_prg();
        let n = 100_000;
        let samples: Vec<i64> = (0..n).map(|_| gauss_sample(&mut prg)).collect();
        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let var: f64 = samples
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let expected = GAUSS_STD_DEV * GAUSS_STD_DEV;
        assert!(
            (var - expected).abs() / expected < 0.1,
            "variance {} vs expected {}",
            var,
            expected
        );
    }

    #[test]
    fn test_shape_decreasing() {
        let mut prg = test_prg();
        let mut hist: HashMap<i64, usize> = HashMap::new();
        for _ in 0..100_000 {
            *hist.entry(gauss_sample(&mut prg)).or_insert(0) += 1;
        }
        let at = |k: i64| hist.get(&k).copied().unwrap_or(0) + hist.get(&-k).copied().unwrap_or(0);
        assert!(hist[&0] > at(5));
        assert!(at(5) > at(10));
    }
}

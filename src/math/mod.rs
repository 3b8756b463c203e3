//! Randomness primitives: the PRG factory and the discrete Gaussian sampler.

pub mod gauss;
pub mod prg;

pub use gauss::{gauss_sample, GAUSS_STD_DEV};
pub use prg::{Prg, PrgKey, PRG_KEY_LEN};

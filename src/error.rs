//! Crate-wide error taxonomy.
//!
//! Parameter-selection errors abort construction before any allocation;
//! cuckoo failures bubble up as batch-level failures so the caller can retry
//! with a different PRG or a smaller batch; cryptographic-input errors are
//! fatal to the current query but not the session; transport errors are fatal
//! to the session.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PirError>;

/// All failure modes surfaced by the PIR engine.
#[derive(Debug, Error)]
pub enum PirError {
    /// No plaintext-modulus candidate satisfies the LWE noise-budget cutoffs
    /// for the requested dimensions.
    #[error("no feasible LWE parameters for {entries} entries of {bits_per} bits")]
    Infeasible { entries: u64, bits_per: u64 },

    /// Cuckoo insertion exceeded the iteration cap; the whole batch fails.
    #[error("cuckoo insertion failed for key {key} after {iters} evictions")]
    CuckooFailure { key: u64, iters: u64 },

    /// Malformed ciphertext blob or seed material.
    #[error("invalid cryptographic input: {0}")]
    CryptoInput(String),

    /// Vector or matrix shape does not match the expected dimensions.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// RPC or socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A secret was consumed (recovered) more than once.
    #[error("secret state already freed")]
    UseAfterFree,
}

impl PirError {
    pub(crate) fn crypto(msg: impl Into<String>) -> Self {
        PirError::CryptoInput(msg.into())
    }

    pub(crate) fn dims(msg: impl Into<String>) -> Self {
        PirError::DimensionMismatch(msg.into())
    }
}

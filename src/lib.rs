//! Private information retrieval with batch and distributional dispatch.
//!
//! The core is a linearly-homomorphic retrieval scheme over LWE, with an
//! optional ring-compressed (RLWE) query path. On top of it sit two batching
//! layers:
//!
//! - **PBC**: hash- or cuckoo-bucketed batch PIR, answering many keys per
//!   round with one small LHE instance per bucket.
//! - **dPIR**: a two-shard popular/full split with probabilistic routing,
//!   cutting expected cost under skewed query distributions.
//!
//! A thin framed-socket RPC service and a benchmarking CLI wrap the library.

pub mod batching;
pub mod error;
pub mod lhe;
pub mod math;
pub mod matrix;
pub mod params;
pub mod rlwe;
pub mod service;

pub use batching::dpir::{DpirClient, DpirParams, DpirServer, PirType};
pub use batching::pbc::{PbcClient, PbcMode, PbcParams, PbcServer};
pub use batching::Packing;
pub use error::{PirError, Result};
pub use lhe::{Db, DbInfo, LheType, Mode, SimpleClient, SimpleServer};
pub use math::{Prg, PrgKey};
pub use matrix::{Elem, Matrix};
pub use params::LweParams;

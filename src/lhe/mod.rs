//! Linearly-homomorphic retrieval schemes.
//!
//! Per-scheme hints, secrets, queries and answers differ in shape, so the
//! shared surface is a set of tagged unions with total matching rather than
//! trait objects. The batching layers dispatch over these.

pub mod database;
pub mod local;
pub mod simple;

use serde::{Deserialize, Serialize};

pub use database::{elem_width, num_limbs, Db, DbInfo};
pub use local::{LocalClient, LocalHint, LocalSecret, LocalServer};
pub use simple::{
    gen_a_seeds, SimpleAnswer, SimpleClient, SimpleHint, SimpleQuery, SimpleSecret, SimpleServer,
};

use crate::matrix::Elem;

/// Which scheme a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LheType {
    /// Plain LWE queries.
    Simple,
    /// Ring-compressed queries.
    SimpleHybrid,
    /// Trivial download.
    Local,
}

/// Query construction mode of the simple scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Plain,
    Hybrid,
}

/// Hint handed to a client at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Hint<T: Elem> {
    Simple(SimpleHint<T>),
    Local(LocalHint<T>),
}

/// Per-query client state.
#[derive(Debug)]
pub enum Secret<T: Elem> {
    Simple(SimpleSecret<T>),
    Local(LocalSecret<T>),
}

/// A wire query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Query<T: Elem> {
    Simple(SimpleQuery<T>),
    /// The local scheme sends nothing.
    Empty,
}

impl<T: Elem> Query<T> {
    pub fn size(&self) -> u64 {
        match self {
            Query::Simple(q) => q.size(),
            Query::Empty => 0,
        }
    }
}

/// A wire answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Answer<T: Elem> {
    Simple(SimpleAnswer<T>),
    Empty,
}

impl<T: Elem> Answer<T> {
    pub fn size(&self) -> u64 {
        match self {
            Answer::Simple(a) => a.size(),
            Answer::Empty => 0,
        }
    }
}

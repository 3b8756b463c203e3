//! The trivial retrieval scheme: the hint is the database.
//!
//! Queries are empty and recovery is a local product, so this costs one full
//! database download up front and nothing per query. Useful as the popular
//! shard of a distributional split and as a cost baseline.

use serde::{Deserialize, Serialize};

use crate::error::{PirError, Result};
use crate::lhe::database::{Db, DbInfo};
use crate::lhe::{Answer, Hint, Query, Secret};
use crate::matrix::{self, Elem, Matrix};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct LocalHint<T: Elem> {
    pub db: Matrix<T>,
    pub bits_per: u64,
}

/// The "secret" is just the selection vector, consumed on recovery.
#[derive(Debug)]
pub struct LocalSecret<T: Elem> {
    input: Option<Matrix<T>>,
}

pub struct LocalServer<T: Elem> {
    db: Matrix<T>,
    bits_per: u64,
}

impl<T: Elem> LocalServer<T> {
    /// Widen the raw limb matrix into the query element width.
    pub fn new(data: &[u32], rows: u64, cols: u64, bits_per: u64) -> Self {
        let widened = data.iter().map(|&v| T::from_u64(v as u64)).collect();
        Self { db: Matrix::from_raw(widened, rows, cols), bits_per }
    }

    pub fn hint(&self) -> Hint<T> {
        Hint::Local(LocalHint { db: self.db.clone(), bits_per: self.bits_per })
    }

    pub fn set_batch(&mut self, _batch: u64) {}

    pub fn answer(&self, queries: &[Query<T>]) -> Result<Vec<Answer<T>>> {
        Ok(queries.iter().map(|_| Answer::Empty).collect())
    }

    pub fn db(&self) -> Option<&Db> {
        None
    }

    pub fn state_size(&self) -> u64 {
        self.db.size_bytes()
    }
}

pub struct LocalClient<T: Elem> {
    db: Matrix<T>,
    info: DbInfo,
}

impl<T: Elem> LocalClient<T> {
    pub fn new(hint: LocalHint<T>) -> Result<Self> {
        let info = DbInfo::new(hint.db.size(), hint.bits_per, hint.db.cols(), 0)?;
        Ok(Self { db: hint.db, info })
    }

    pub fn query(&mut self, inputs: &[Matrix<T>]) -> Result<(Vec<Secret<T>>, Vec<Query<T>>)> {
        let secrets = inputs
            .iter()
            .map(|input| Secret::Local(LocalSecret { input: Some(input.clone()) }))
            .collect();
        let queries = inputs.iter().map(|_| Query::Empty).collect();
        Ok((secrets, queries))
    }

    pub fn dummy_query(&mut self, num: u64) -> Result<(Vec<Secret<T>>, Vec<Query<T>>)> {
        let secrets = (0..num).map(|_| Secret::Local(LocalSecret { input: None })).collect();
        let queries = (0..num).map(|_| Query::Empty).collect();
        Ok((secrets, queries))
    }

    pub fn recover(
        &mut self,
        secrets: &mut [Secret<T>],
        _answers: &[Answer<T>],
    ) -> Result<Vec<Matrix<T>>> {
        let mut results = Vec::new();
        for secret in secrets.iter_mut() {
            let secret = match secret {
                Secret::Local(s) => s,
                Secret::Simple(_) => {
                    return Err(PirError::dims("simple secret for the local scheme"))
                }
            };
            if let Some(input) = secret.input.take() {
                results.push(matrix::mul(&self.db, &input)?);
            }
        }
        Ok(results)
    }

    pub fn db_info(&self) -> &DbInfo {
        &self.info
    }

    pub fn state_size(&self) -> u64 {
        self.db.size_bytes()
    }
}

//! Distributional PIR: a two-shard dispatcher.
//!
//! Shard 0 holds the popular prefix (records `[0, cutoff)`), shard 1 the
//! full database. Each query round flips one α-biased coin: with probability
//! `1 − α` the round addresses the popular shard (dropping any index outside
//! the prefix), otherwise the full shard. For skewed access distributions
//! the expected cost per round drops to roughly
//! `α·Cost(N) + (1 − α)·Cost(cutoff)`.
//!
//! The server learns only the shard tag, which the coin makes independent of
//! the queried indices.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batching::pbc::{PbcAnswer, PbcClient, PbcParams, PbcQuery, PbcSecret, PbcServer};
use crate::batching::{approx_square_dims, Packing};
use crate::error::{PirError, Result};
use crate::lhe::{
    elem_width, num_limbs, Answer, Hint, LocalClient, LocalServer, Mode, Query, Secret,
    SimpleClient, SimpleServer,
};
use crate::math::{Prg, PrgKey};
use crate::matrix::{Elem, Matrix};
use crate::params::LweParams;

/// Scheme choice for one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PirType {
    Simple,
    SimpleHybrid,
    Local,
    /// Hash-bucketed batch PIR.
    Pbc,
    /// Cuckoo-bucketed batch PIR.
    PbcAngel,
}

impl PirType {
    fn is_batched(&self) -> bool {
        matches!(self, PirType::Pbc | PirType::PbcAngel)
    }
}

/// Dispatcher parameters; assumes the database is already ordered by
/// popularity so the prefix boundary is a single cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct DpirParams<T: Elem> {
    pub cutoff: u64,
    pub alpha: f64,
    pub load: u64,
    pub types: [PirType; 2],
    pub hints: Vec<DpirHint<T>>,
}

/// Per-shard initialization payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum DpirHint<T: Elem> {
    Lhe(Hint<T>),
    Pbc(PbcParams<T>),
}

/// Client state for one round, tagged with the shard it addressed.
pub struct DpirSecret<T: Elem> {
    pub bucket: usize,
    pub keys: Vec<u64>,
    pub lhe: Vec<Secret<T>>,
    pub batch: Vec<PbcSecret<T>>,
}

/// One round's query envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct DpirQuery<T: Elem> {
    pub bucket: usize,
    pub lhe: Vec<Query<T>>,
    pub batch: Vec<PbcQuery<T>>,
}

impl<T: Elem> DpirQuery<T> {
    pub fn size(&self) -> u64 {
        self.lhe.iter().map(Query::size).sum::<u64>()
            + self.batch.iter().map(PbcQuery::size).sum::<u64>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct DpirAnswer<T: Elem> {
    pub lhe: Vec<Answer<T>>,
    pub batch: Vec<PbcAnswer<T>>,
}

impl<T: Elem> DpirAnswer<T> {
    pub fn size(&self) -> u64 {
        self.lhe.iter().map(Answer::size).sum::<u64>()
            + self.batch.iter().map(PbcAnswer::size).sum::<u64>()
    }
}

enum ShardServer<T: Elem> {
    Lhe(SimpleServer<T>),
    Local(LocalServer<T>),
    Pbc(PbcServer<T>),
}

enum ShardClient<T: Elem> {
    Lhe(SimpleClient<T>),
    Local(LocalClient<T>),
    Pbc(PbcClient<T>),
}

/// Two-shard server.
pub struct DpirServer<T: Elem> {
    cutoff: u64,
    alpha: f64,
    load: u64,
    types: [PirType; 2],
    shards: Vec<ShardServer<T>>,
}

impl<T: Elem> DpirServer<T> {
    /// Stand up both shards over the raw records. `orig_rows`/`orig_cols`
    /// describe the raw limb matrix backing the full shard.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        items: &[u32],
        orig_rows: u64,
        orig_cols: u64,
        cutoff: u64,
        alpha: f64,
        load: u64,
        bits_per: u64,
        p_mod: u64,
        types: [PirType; 2],
        packing: Packing,
        seed: PrgKey,
    ) -> Result<Self> {
        let mut prg = Prg::from_key(&seed);
        let limbs = num_limbs(bits_per);
        if (cutoff * limbs) as usize > items.len() {
            return Err(PirError::dims(format!(
                "popularity cutoff {} exceeds the {}-record database",
                cutoff,
                items.len() as u64 / limbs
            )));
        }

        let (pop_rows, pop_cols, pop_p) = approx_square_dims::<T>(cutoff, bits_per)?;
        let shard_data = [&items[..(cutoff * limbs) as usize], items];
        let rows = [pop_rows, orig_rows];
        let cols = [pop_cols, orig_cols];
        let pmods = [pop_p, p_mod];

        debug!(cutoff, alpha, load, pop_rows, pop_cols, pop_p, "splitting database");

        let mut shards = Vec::with_capacity(2);
        for i in 0..2 {
            let data = shard_data[i];
            let shard = match types[i] {
                PirType::Local => {
                    let width = elem_width(bits_per, pmods[i]);
                    let raw_rows = ((rows[i] * limbs).div_ceil(width)).max(1);
                    let mut server = LocalServer::new(data, raw_rows, cols[i], bits_per);
                    server.set_batch(load);
                    ShardServer::Local(server)
                }
                PirType::Simple | PirType::SimpleHybrid => {
                    let mode = if types[i] == PirType::Simple { Mode::Plain } else { Mode::Hybrid };
                    let params = LweParams::new::<T>(cols[i], pmods[i]);
                    let mut server =
                        SimpleServer::new(data, bits_per, params, prg.gen_key(), mode, false)?;
                    server.set_batch(load);
                    ShardServer::Lhe(server)
                }
                PirType::Pbc | PirType::PbcAngel => {
                    let mode = if types[i] == PirType::Pbc {
                        crate::batching::pbc::PbcMode::Hash
                    } else {
                        crate::batching::pbc::PbcMode::Cuckoo
                    };
                    let width = elem_width(bits_per, pmods[i]);
                    let raw_rows = ((rows[i] * limbs).div_ceil(width)).max(1);
                    ShardServer::Pbc(PbcServer::new(
                        data,
                        raw_rows,
                        cols[i],
                        load,
                        pmods[i],
                        bits_per,
                        prg.gen_key(),
                        packing,
                        mode,
                    )?)
                }
            };
            shards.push(shard);
        }

        Ok(Self { cutoff, alpha, load, types, shards })
    }

    pub fn params(&self) -> DpirParams<T> {
        let hints = self
            .shards
            .iter()
            .map(|shard| match shard {
                ShardServer::Lhe(s) => DpirHint::Lhe(s.hint()),
                ShardServer::Local(s) => DpirHint::Lhe(s.hint()),
                ShardServer::Pbc(s) => DpirHint::Pbc(s.params()),
            })
            .collect();
        DpirParams {
            cutoff: self.cutoff,
            alpha: self.alpha,
            load: self.load,
            types: self.types,
            hints,
        }
    }

    /// Answer one round, dispatching on the shard tag.
    pub fn answer(&self, query: &DpirQuery<T>) -> Result<DpirAnswer<T>> {
        let shard = self
            .shards
            .get(query.bucket)
            .ok_or_else(|| PirError::dims(format!("no shard {}", query.bucket)))?;
        match shard {
            ShardServer::Lhe(s) => Ok(DpirAnswer { lhe: s.answer(&query.lhe)?, batch: vec![] }),
            ShardServer::Local(s) => Ok(DpirAnswer { lhe: s.answer(&query.lhe)?, batch: vec![] }),
            ShardServer::Pbc(s) => Ok(DpirAnswer { lhe: vec![], batch: s.answer(&query.batch)? }),
        }
    }

    pub fn state_size(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| match shard {
                ShardServer::Lhe(s) => s.state_size(),
                ShardServer::Local(s) => s.state_size(),
                ShardServer::Pbc(s) => s.state_size(),
            })
            .sum()
    }
}

/// Two-shard client.
pub struct DpirClient<T: Elem> {
    cutoff: u64,
    alpha: f64,
    load: u64,
    types: [PirType; 2],
    clients: Vec<ShardClient<T>>,
    prg: Prg,
}

impl<T: Elem> DpirClient<T> {
    pub fn new(params: DpirParams<T>) -> Result<Self> {
        let mut clients = Vec::with_capacity(2);
        for (ty, hint) in params.types.iter().zip(params.hints) {
            let client = match (ty, hint) {
                (PirType::Local, DpirHint::Lhe(Hint::Local(h))) => {
                    ShardClient::Local(LocalClient::new(h)?)
                }
                (PirType::Simple | PirType::SimpleHybrid, DpirHint::Lhe(Hint::Simple(h))) => {
                    ShardClient::Lhe(SimpleClient::new(h)?)
                }
                (PirType::Pbc | PirType::PbcAngel, DpirHint::Pbc(p)) => {
                    ShardClient::Pbc(PbcClient::new(p)?)
                }
                _ => return Err(PirError::dims("shard hint does not match its scheme type")),
            };
            clients.push(client);
        }
        Ok(Self {
            cutoff: params.cutoff,
            alpha: params.alpha,
            load: params.load,
            types: params.types,
            clients,
            prg: Prg::from_entropy(),
        })
    }

    /// Build one round of queries for a batch of indices.
    pub fn query(&mut self, indices: &[u64]) -> Result<(DpirSecret<T>, DpirQuery<T>)> {
        // One α-biased coin decides the shard for the whole round
        let bucket = usize::from(self.prg.next_f64() < self.alpha);

        let query_indices: Vec<u64> = if bucket == 0 {
            indices.iter().copied().filter(|&idx| idx < self.cutoff).collect()
        } else {
            indices.to_vec()
        };

        if self.types[bucket].is_batched() {
            let ShardClient::Pbc(client) = &mut self.clients[bucket] else {
                return Err(PirError::dims("shard client does not match its scheme type"));
            };
            let (s, q) = client.query(&query_indices)?;
            Ok((
                DpirSecret { bucket, keys: vec![], lhe: vec![], batch: s },
                DpirQuery { bucket, lhe: vec![], batch: q },
            ))
        } else {
            if query_indices.len() as u64 > self.load {
                return Err(PirError::dims(format!(
                    "{} indices exceed the round load {}",
                    query_indices.len(),
                    self.load
                )));
            }

            let m = match &self.clients[bucket] {
                ShardClient::Lhe(c) => c.db_info().m,
                ShardClient::Local(c) => c.db_info().m,
                ShardClient::Pbc(_) => unreachable!(),
            };
            let inputs: Vec<Matrix<T>> = query_indices
                .iter()
                .map(|&idx| {
                    let mut input = Matrix::zeros(m, 1);
                    input.set(idx % m, 0, T::from_u64(1));
                    input
                })
                .collect();

            let dummies = self.load - inputs.len() as u64;
            let (s, q) = match &mut self.clients[bucket] {
                ShardClient::Lhe(c) => {
                    let (mut s, mut q) = c.query(&inputs)?;
                    let (ds, dq) = c.dummy_query(dummies)?;
                    s.extend(ds);
                    q.extend(dq);
                    (s, q)
                }
                ShardClient::Local(c) => {
                    let (mut s, mut q) = c.query(&inputs)?;
                    let (ds, dq) = c.dummy_query(dummies)?;
                    s.extend(ds);
                    q.extend(dq);
                    (s, q)
                }
                ShardClient::Pbc(_) => unreachable!(),
            };
            debug_assert_eq!(s.len() as u64, self.load);
            debug_assert_eq!(q.len() as u64, self.load);

            Ok((
                DpirSecret { bucket, keys: query_indices, lhe: s, batch: vec![] },
                DpirQuery { bucket, lhe: q, batch: vec![] },
            ))
        }
    }

    /// Recover the round's records, keyed by index. A query routed to the
    /// popular shard for an index outside the prefix is a miss and is
    /// absent from the map.
    pub fn recover(
        &mut self,
        secret: &mut DpirSecret<T>,
        answer: &DpirAnswer<T>,
    ) -> Result<HashMap<u64, Vec<u32>>> {
        let bucket = secret.bucket;
        let mut results = HashMap::with_capacity(self.load as usize);

        if self.types[bucket].is_batched() {
            let ShardClient::Pbc(client) = &mut self.clients[bucket] else {
                return Err(PirError::dims("shard client does not match its scheme type"));
            };
            results.extend(client.recover(&mut secret.batch, &answer.batch)?);
        } else {
            let (recovered, info) = match &mut self.clients[bucket] {
                ShardClient::Lhe(c) => (c.recover(&mut secret.lhe, &answer.lhe)?, *c.db_info()),
                ShardClient::Local(c) => (c.recover(&mut secret.lhe, &answer.lhe)?, *c.db_info()),
                ShardClient::Pbc(_) => unreachable!(),
            };

            for (key, result) in secret.keys.iter().zip(recovered.iter()) {
                let start = (info.ne * (key / info.m)) as usize;
                let vals: Vec<u32> = result.data()[start..start + info.ne as usize]
                    .iter()
                    .map(|v| v.to_u64() as u32)
                    .collect();
                results.insert(*key, info.reconstruct_elem(&vals));
            }
        }
        Ok(results)
    }

    pub fn state_size(&self) -> u64 {
        self.clients
            .iter()
            .map(|client| match client {
                ShardClient::Lhe(c) => c.state_size(),
                ShardClient::Local(c) => c.state_size(),
                ShardClient::Pbc(c) => c.state_size(),
            })
            .sum()
    }
}

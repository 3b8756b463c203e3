//! Probabilistic batch codes: hash and cuckoo bucketing.
//!
//! The database is split into buckets by a deterministic SHA-256 mapping;
//! a batch of keys is scheduled onto buckets and each bucket is served by an
//! independent hybrid LHE instance. Hash bucketing uses one candidate bucket
//! per key with capacity two and silently drops overflow (the caller reasons
//! about the expected recovery ratio); cuckoo bucketing uses three candidate
//! buckets with eviction and either places every key or fails the batch.

use std::collections::HashMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::batching::{packing_dims, Packing};
use crate::error::{PirError, Result};
use crate::lhe::{num_limbs, Answer, Hint, Mode, Query, Secret, SimpleClient, SimpleServer};
use crate::math::{Prg, PrgKey};
use crate::matrix::{Elem, Matrix};
use crate::params::LweParams;

/// Bucket expansion factor for cuckoo bucketing.
pub const CUCKOO_EXPANSION: f64 = 1.5;

/// Candidate buckets per key under cuckoo bucketing.
pub const CUCKOO_CHOICES: u64 = 3;

/// Eviction-chain cap before a batch is declared unschedulable.
pub const MAX_CUCKOO_ITERS: u64 = 500;

/// Keys a bucket can absorb under hash bucketing.
pub const HASH_BUCKET_CAPACITY: u64 = 2;

/// Which bucketing strategy a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PbcMode {
    Hash,
    Cuckoo,
}

impl PbcMode {
    /// Candidate buckets per key.
    pub fn num_choices(&self) -> u64 {
        match self {
            PbcMode::Hash => 1,
            PbcMode::Cuckoo => CUCKOO_CHOICES,
        }
    }

    /// Total buckets for a batch size.
    pub fn num_buckets(&self, batch_size: u64) -> u64 {
        match self {
            PbcMode::Hash => batch_size,
            PbcMode::Cuckoo => (batch_size as f64 * CUCKOO_EXPANSION).ceil() as u64,
        }
    }

    /// Queries (real plus dummy) sent to every bucket each round.
    pub fn num_queries_per(&self) -> u64 {
        match self {
            PbcMode::Hash => HASH_BUCKET_CAPACITY,
            PbcMode::Cuckoo => 1,
        }
    }
}

/// For one key: candidate bucket → offset of the key's record within that
/// bucket.
pub type KeyChoices = HashMap<u32, u32>;

/// Full key → bucket placement map, shipped to clients.
pub type Mapping = HashMap<u64, KeyChoices>;

/// A batch schedule: bucket → keys served by that bucket.
pub type Schedule = HashMap<u32, Vec<u64>>;

/// `SHA256(LE64(key) ‖ nonce) mod num_buckets`, with the nonce bumped until
/// `num_choices` distinct buckets come out.
pub fn get_buckets(key: u64, num_choices: u64, num_buckets: u64) -> Vec<u32> {
    let mut buf = [0u8; 9];
    buf[..8].copy_from_slice(&key.to_le_bytes());

    let modulus = BigUint::from(num_buckets);
    let mut buckets = Vec::with_capacity(num_choices as usize);
    let mut nonce = 0u8;
    while (buckets.len() as u64) < num_choices {
        buf[8] = nonce;
        nonce = nonce.wrapping_add(1);
        let digest = Sha256::digest(buf);
        let candidate = (BigUint::from_bytes_be(digest.as_slice()) % &modulus)
            .iter_u32_digits()
            .next()
            .unwrap_or(0);
        if !buckets.contains(&candidate) {
            buckets.push(candidate);
        }
    }
    buckets
}

/// Split raw records into buckets. Every record lands in each of its
/// candidate buckets; the returned mapping records its offset per bucket.
pub fn encode_db(
    items: &[u32],
    limbs: u64,
    batch_size: u64,
    mode: PbcMode,
) -> Result<(Vec<Vec<u32>>, Mapping)> {
    if items.len() as u64 % limbs != 0 {
        return Err(PirError::dims(format!(
            "{} limbs do not divide into {}-limb records",
            items.len(),
            limbs
        )));
    }
    let n = items.len() as u64 / limbs;
    let num_buckets = mode.num_buckets(batch_size);
    let num_choices = mode.num_choices();

    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); num_buckets as usize];
    let mut mapping = Mapping::with_capacity(n as usize);

    for i in 0..n {
        let item = &items[(i * limbs) as usize..((i + 1) * limbs) as usize];
        let mut choices = KeyChoices::with_capacity(num_choices as usize);
        for candidate in get_buckets(i, num_choices, num_buckets) {
            let bucket = &mut buckets[candidate as usize];
            choices.insert(candidate, (bucket.len() as u64 / limbs) as u32);
            bucket.extend_from_slice(item);
        }
        mapping.insert(i, choices);
    }
    Ok((buckets, mapping))
}

fn cuckoo_insert(
    schedule: &mut Schedule,
    choices: &HashMap<u64, Vec<u32>>,
    key: u64,
    depth: u64,
    prg: &mut Prg,
) -> bool {
    if depth >= MAX_CUCKOO_ITERS {
        return false;
    }

    // Any empty candidate bucket takes the key outright
    for &bucket in &choices[&key] {
        if !schedule.contains_key(&bucket) {
            schedule.insert(bucket, vec![key]);
            return true;
        }
    }

    // Otherwise evict a random occupant and re-insert it
    let evict_from = choices[&key][(prg.next_u64() % CUCKOO_CHOICES) as usize];
    let old_key = schedule[&evict_from][0];
    schedule.insert(evict_from, vec![key]);
    cuckoo_insert(schedule, choices, old_key, depth + 1, prg)
}

/// Schedule a batch of keys onto buckets.
///
/// Hash mode never fails: a key whose bucket is already at capacity is
/// dropped and simply absent from the recovered map. Cuckoo mode fails the
/// whole batch if any eviction chain exceeds [`MAX_CUCKOO_ITERS`]; the
/// caller may retry with a different PRG or a smaller batch.
pub fn gen_schedule(
    indices: &[u64],
    mode: PbcMode,
    num_buckets: u64,
    prg: &mut Prg,
) -> Result<Schedule> {
    let num_choices = mode.num_choices();
    let mut choices = HashMap::with_capacity(indices.len());
    for &key in indices {
        choices.insert(key, get_buckets(key, num_choices, num_buckets));
    }

    let mut schedule = Schedule::new();
    match mode {
        PbcMode::Hash => {
            for &key in indices {
                let bucket = choices[&key][0];
                let entry = schedule.entry(bucket).or_default();
                if (entry.len() as u64) < HASH_BUCKET_CAPACITY {
                    entry.push(key);
                }
            }
        }
        PbcMode::Cuckoo => {
            for &key in indices {
                if !cuckoo_insert(&mut schedule, &choices, key, 0, prg) {
                    return Err(PirError::CuckooFailure { key, iters: MAX_CUCKOO_ITERS });
                }
            }
        }
    }
    Ok(schedule)
}

/// Parameters a batch server hands to its clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct PbcParams<T: Elem> {
    pub batch_size: u64,
    pub num_buckets: u64,
    pub mode: PbcMode,
    pub mapping: Mapping,
    pub hints: Vec<Hint<T>>,
}

/// Per-batch client state: for every bucket, the keys scheduled there and
/// the underlying LHE secrets (real then dummy).
pub struct PbcSecret<T: Elem> {
    pub keys: Vec<u64>,
    pub secrets: Vec<Secret<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct PbcQuery<T: Elem> {
    pub queries: Vec<Query<T>>,
}

impl<T: Elem> PbcQuery<T> {
    pub fn size(&self) -> u64 {
        self.queries.iter().map(Query::size).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct PbcAnswer<T: Elem> {
    pub answers: Vec<Answer<T>>,
}

impl<T: Elem> PbcAnswer<T> {
    pub fn size(&self) -> u64 {
        self.answers.iter().map(Answer::size).sum()
    }
}

/// Batch server: one hybrid LHE instance per bucket.
pub struct PbcServer<T: Elem> {
    servers: Vec<SimpleServer<T>>,
    batch_size: u64,
    num_buckets: u64,
    mapping: Mapping,
    mode: PbcMode,
}

impl<T: Elem> PbcServer<T> {
    /// Bucket the raw records and stand up one LHE server per bucket, with
    /// per-bucket dimensions from the packing policy.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        items: &[u32],
        orig_rows: u64,
        orig_cols: u64,
        batch_size: u64,
        p_mod: u64,
        bits_per: u64,
        seed: PrgKey,
        packing: Packing,
        mode: PbcMode,
    ) -> Result<Self> {
        let mut prg = Prg::from_key(&seed);
        let limbs = num_limbs(bits_per);
        let (buckets, mapping) = encode_db(items, limbs, batch_size, mode)?;

        let sizes: Vec<u64> = buckets.iter().map(|b| b.len() as u64).collect();
        let (_rows, cols, pmods) =
            packing_dims::<T>(&sizes, bits_per, orig_rows, orig_cols, p_mod, packing)?;

        debug!(
            buckets = buckets.len(),
            batch_size,
            ?mode,
            "bucketed database"
        );

        let mut servers = Vec::with_capacity(buckets.len());
        for (i, bucket) in buckets.iter().enumerate() {
            let params = LweParams::new::<T>(cols[i], pmods[i]);
            servers.push(SimpleServer::new(
                bucket,
                bits_per,
                params,
                prg.gen_key(),
                Mode::Hybrid,
                false,
            )?);
        }

        Ok(Self {
            servers,
            batch_size,
            num_buckets: buckets.len() as u64,
            mapping,
            mode,
        })
    }

    pub fn params(&self) -> PbcParams<T> {
        PbcParams {
            batch_size: self.batch_size,
            num_buckets: self.num_buckets,
            mode: self.mode,
            mapping: self.mapping.clone(),
            hints: self.servers.iter().map(SimpleServer::hint).collect(),
        }
    }

    pub fn set_batch(&mut self, batch: u64) {
        for server in &mut self.servers {
            server.set_batch(batch);
        }
    }

    /// Answer one batch: the i-th query addresses the i-th bucket.
    pub fn answer(&self, queries: &[PbcQuery<T>]) -> Result<Vec<PbcAnswer<T>>> {
        if queries.len() as u64 != self.num_buckets {
            return Err(PirError::dims(format!(
                "{} bucket queries for {} buckets",
                queries.len(),
                self.num_buckets
            )));
        }
        queries
            .iter()
            .zip(self.servers.iter())
            .map(|(query, server)| Ok(PbcAnswer { answers: server.answer(&query.queries)? }))
            .collect()
    }

    pub fn state_size(&self) -> u64 {
        self.servers.iter().map(SimpleServer::state_size).sum()
    }
}

/// Batch client: schedules keys, queries every bucket (padding with dummy
/// queries so the trace is independent of the schedule), and recovers the
/// per-key records.
pub struct PbcClient<T: Elem> {
    clients: Vec<SimpleClient<T>>,
    batch_size: u64,
    num_buckets: u64,
    mapping: Mapping,
    mode: PbcMode,
    prg: Prg,
}

impl<T: Elem> PbcClient<T> {
    pub fn new(params: PbcParams<T>) -> Result<Self> {
        let mut clients = Vec::with_capacity(params.hints.len());
        for hint in params.hints {
            match hint {
                Hint::Simple(h) => clients.push(SimpleClient::new(h)?),
                Hint::Local(_) => {
                    return Err(PirError::dims("batch buckets use the simple scheme"))
                }
            }
        }
        Ok(Self {
            clients,
            batch_size: params.batch_size,
            num_buckets: params.num_buckets,
            mapping: params.mapping,
            mode: params.mode,
            prg: Prg::from_entropy(),
        })
    }

    /// Build a full round of bucket queries for a batch of keys.
    pub fn query(&mut self, indices: &[u64]) -> Result<(Vec<PbcSecret<T>>, Vec<PbcQuery<T>>)> {
        let schedule = gen_schedule(indices, self.mode, self.num_buckets, &mut self.prg)?;

        let queries_per = self.mode.num_queries_per();
        let mut secrets = Vec::with_capacity(self.num_buckets as usize);
        let mut queries = Vec::with_capacity(self.num_buckets as usize);

        for b in 0..self.num_buckets as u32 {
            let client = &mut self.clients[b as usize];
            match schedule.get(&b) {
                Some(keys) => {
                    let cols = client.db_info().m;
                    let mut inputs = Vec::with_capacity(keys.len());
                    for key in keys {
                        let offset = self
                            .mapping
                            .get(key)
                            .and_then(|choices| choices.get(&b))
                            .ok_or_else(|| {
                                PirError::dims(format!("key {} has no slot in bucket {}", key, b))
                            })?;
                        let mut input = Matrix::zeros(cols, 1);
                        input.set(*offset as u64 % cols, 0, T::from_u64(1));
                        inputs.push(input);
                    }

                    let (mut s, mut q) = client.query(&inputs)?;
                    let remaining = queries_per - inputs.len() as u64;
                    if remaining > 0 {
                        let (ds, dq) = client.dummy_query(remaining)?;
                        s.extend(ds);
                        q.extend(dq);
                    }
                    secrets.push(PbcSecret { keys: keys.clone(), secrets: s });
                    queries.push(PbcQuery { queries: q });
                }
                None => {
                    let (s, q) = client.dummy_query(queries_per)?;
                    secrets.push(PbcSecret { keys: Vec::new(), secrets: s });
                    queries.push(PbcQuery { queries: q });
                }
            }
        }
        Ok((secrets, queries))
    }

    /// Recover every scheduled key's raw record. Dropped keys (hash
    /// overflow) are simply absent.
    pub fn recover(
        &mut self,
        secrets: &mut [PbcSecret<T>],
        answers: &[PbcAnswer<T>],
    ) -> Result<HashMap<u64, Vec<u32>>> {
        let mut results = HashMap::with_capacity(self.batch_size as usize);
        for (b, (secret, answer)) in secrets.iter_mut().zip(answers.iter()).enumerate() {
            let client = &mut self.clients[b];
            let recovered = client.recover(&mut secret.secrets, &answer.answers)?;
            let info = *client.db_info();

            for (key, result) in secret.keys.iter().zip(recovered.iter()) {
                let offset = self.mapping[key][&(b as u32)] as u64;
                let start = (info.ne * (offset / info.m)) as usize;
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
        self.clients.iter().map(SimpleClient::state_size).sum()
    }
}

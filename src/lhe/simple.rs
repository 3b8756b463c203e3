//! The LWE/RLWE linearly-homomorphic retrieval scheme.
//!
//! Two query modes share one server-side pipeline:
//!
//! - **Plain**: Regev queries `q = A·s + e + Δ·u` against a seeded public
//!   matrix `A`; the hint `H = DB·A` lets the client strip `DB·A·s` from the
//!   answer.
//! - **Hybrid**: the selection vector is encrypted under the ring backend's
//!   seeded `a` polynomials; the server extracts LWE samples from the
//!   ciphertext bodies and runs the same database product. Queries shrink
//!   from `M` elements to a few ciphertext blobs.
//!
//! Answers over a batch evaluate in parallel; output order matches input
//! order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PirError, Result};
use crate::lhe::database::{Db, DbInfo};
use crate::lhe::{Answer, Hint, Mode, Query, Secret};
use crate::math::{Prg, PrgKey};
use crate::matrix::{self, Elem, Matrix};
use crate::params::LweParams;
use crate::rlwe::{APoly, CipherBlob, RingContext, RlweKey, POLY_SEED_WORDS};

/// Hint shipped to clients: the seed for the public randomness, the scheme
/// parameters, and (unless an external hint-compression service holds it)
/// the hint matrix itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct SimpleHint<T: Elem> {
    pub seed: PrgKey,
    pub params: LweParams,
    pub db_info: DbInfo,
    pub hint: Option<Matrix<T>>,
    pub mode: Mode,
    pub compress_hint: bool,
}

/// Per-query client state. Dummy queries carry no keys and recover to
/// nothing; real secrets are one-shot unless the hint-compression path keeps
/// the inner token alive across the session.
#[derive(Debug)]
pub struct SimpleSecret<T: Elem> {
    inner: Option<Matrix<T>>,
    rlwe: Option<RlweKey<T>>,
    dummy: bool,
}

impl<T: Elem> SimpleSecret<T> {
    fn dummy() -> Self {
        Self { inner: None, rlwe: None, dummy: true }
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    /// The inner LWE secret (or pre-multiplied token).
    pub fn inner(&self) -> Option<&Matrix<T>> {
        self.inner.as_ref()
    }

    /// Replace the inner state with a token returned by the external
    /// hint-compression service.
    pub fn set_inner(&mut self, token: Matrix<T>) {
        self.inner = Some(token);
    }

    /// Whether the ring key is still held (hybrid secrets before recovery).
    pub fn has_ring_key(&self) -> bool {
        self.rlwe.is_some()
    }
}

/// A query: an LWE ciphertext vector (Plain) or serialized ring ciphertexts
/// (Hybrid).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct SimpleQuery<T: Elem> {
    pub query: Option<Matrix<T>>,
    pub fast_query: Vec<CipherBlob>,
}

impl<T: Elem> SimpleQuery<T> {
    pub fn size(&self) -> u64 {
        let mut size = 0;
        if let Some(q) = &self.query {
            size += q.size_bytes();
        }
        size + self.fast_query.iter().map(|b| b.len() as u64).sum::<u64>()
    }
}

/// An answer: the database-query product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct SimpleAnswer<T: Elem> {
    pub answer: Matrix<T>,
}

impl<T: Elem> SimpleAnswer<T> {
    pub fn size(&self) -> u64 {
        self.answer.size_bytes()
    }
}

/// Generate the 512-bit seeds for the public `a` polynomials covering `m`
/// samples in blocks of the ring dimension.
pub fn gen_a_seeds(prg: &mut Prg, m: u64, ring_dim: u64) -> (Vec<u64>, usize) {
    let num = m.div_ceil(ring_dim) as usize;
    (prg.sample_poly_seeds(num), num)
}

/// Server half of the scheme. Owns the encoded (possibly squished) database
/// and the precomputed hint.
pub struct SimpleServer<T: Elem> {
    seed: PrgKey,
    mode: Mode,
    db: Db,
    hint: Matrix<T>,
    params: LweParams,
    ring: RingContext<T>,
    compress_hint: bool,
    batch: u64,
}

impl<T: Elem> SimpleServer<T> {
    /// Encode `data` and precompute the hint for `mode`.
    pub fn new(
        data: &[u32],
        bits_per: u64,
        params: LweParams,
        seed: PrgKey,
        mode: Mode,
        compress_hint: bool,
    ) -> Result<Self> {
        Self::build(data, bits_per, params, seed, mode, compress_hint, false)
    }

    /// Like [`SimpleServer::new`] but with a random hint, skipping the
    /// preprocessing cost. Only for benchmarks; recovery will not work.
    pub fn new_for_bench(
        data: &[u32],
        bits_per: u64,
        params: LweParams,
        seed: PrgKey,
        mode: Mode,
    ) -> Result<Self> {
        Self::build(data, bits_per, params, seed, mode, false, true)
    }

    fn build(
        data: &[u32],
        bits_per: u64,
        params: LweParams,
        seed: PrgKey,
        mode: Mode,
        compress_hint: bool,
        random_hint: bool,
    ) -> Result<Self> {
        params.validate()?;
        let mut db = Db::new(data, bits_per, params.m, params.p)?;
        let ring = RingContext::<T>::new(params.p);

        let hint = if random_hint {
            let mut prg = Prg::from_key(&seed);
            Matrix::random(&mut prg, db.info.l, params.n, 0)
        } else {
            let mut prg = Prg::from_key(&seed);
            match mode {
                Mode::Plain => {
                    let a = Matrix::<T>::random(&mut prg, db.info.m, params.n, 0);
                    matrix::mul_db(&db.data, &a)?
                }
                Mode::Hybrid => {
                    let (seeds, _) = gen_a_seeds(&mut prg, db.info.m, ring.n());
                    ring.compute_hint(&db.data, &seeds)?
                }
            }
        };

        db.squish();
        debug!(
            rows = db.info.l,
            cols = db.info.m,
            p = db.info.p,
            ne = db.info.ne,
            squishing = db.info.squishing,
            "simple server ready"
        );

        Ok(Self { seed, mode, db, hint, params, ring, compress_hint, batch: 1 })
    }

    pub fn hint(&self) -> Hint<T> {
        Hint::Simple(SimpleHint {
            seed: self.seed,
            params: self.params,
            db_info: self.db.info,
            hint: Some(self.hint.clone()),
            mode: self.mode,
            compress_hint: self.compress_hint,
        })
    }

    /// Declare the expected answer batch size.
    pub fn set_batch(&mut self, batch: u64) {
        self.batch = batch;
    }

    /// The declared answer batch size.
    pub fn batch(&self) -> u64 {
        self.batch
    }

    /// Answer a batch of queries; per-query products run in parallel and the
    /// output order matches the input order.
    pub fn answer(&self, queries: &[Query<T>]) -> Result<Vec<Answer<T>>> {
        queries
            .par_iter()
            .map(|query| {
                let query = match query {
                    Query::Simple(q) => q,
                    Query::Empty => {
                        return Err(PirError::dims("empty query for the simple scheme"))
                    }
                };
                let answer = match self.mode {
                    Mode::Hybrid => {
                        let n = self.ring.n();
                        let blocks = self.db.info.m.div_ceil(n);
                        if query.fast_query.len() as u64 != blocks {
                            return Err(PirError::crypto(format!(
                                "query carries {} ciphertexts, expected {}",
                                query.fast_query.len(),
                                blocks
                            )));
                        }
                        let mut ct = Matrix::zeros(0, 1);
                        for (j, blob) in query.fast_query.iter().enumerate() {
                            let samples = n.min(self.db.info.m - j as u64 * n);
                            ct.concat(&self.ring.extract_lwe_ct(blob, samples)?);
                        }
                        self.pad_to_squish(&mut ct);
                        self.db_product(&ct)?
                    }
                    Mode::Plain => {
                        let ct = query
                            .query
                            .as_ref()
                            .ok_or_else(|| PirError::crypto("plain query missing its vector"))?;
                        self.db_product(ct)?
                    }
                };
                Ok(Answer::Simple(SimpleAnswer { answer }))
            })
            .collect()
    }

    fn db_product(&self, ct: &Matrix<T>) -> Result<Matrix<T>> {
        if self.db.info.squishing != 0 {
            matrix::mul_vec_packed(&self.db.data, ct)
        } else {
            matrix::mul_db(&self.db.data, ct)
        }
    }

    fn pad_to_squish(&self, ct: &mut Matrix<T>) {
        let squishing = self.db.info.squishing;
        if squishing != 0 && self.db.info.m % squishing != 0 {
            ct.append_zeros(squishing - (self.db.info.m % squishing));
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn db_info(&self) -> &DbInfo {
        &self.db.info
    }

    pub fn state_size(&self) -> u64 {
        self.db.data.size_bytes() + self.hint.size_bytes()
    }
}

/// Client half of the scheme.
pub struct SimpleClient<T: Elem> {
    prg: Prg,
    mode: Mode,
    db_info: DbInfo,
    seed_a: PrgKey,
    hint: Option<Matrix<T>>,
    polys_a: Vec<APoly<T>>,
    params: LweParams,
    ring: RingContext<T>,
    compress_hint: bool,
}

impl<T: Elem> SimpleClient<T> {
    /// Initialize from a server hint, re-deriving the public randomness from
    /// the shared seed.
    pub fn new(hint: SimpleHint<T>) -> Result<Self> {
        let ring = RingContext::<T>::new(hint.params.p);

        let polys_a = match hint.mode {
            Mode::Hybrid => {
                let mut prg = Prg::from_key(&hint.seed);
                let (seeds, num) = gen_a_seeds(&mut prg, hint.db_info.m, ring.n());
                let mut polys = Vec::with_capacity(num);
                for seed in seeds.chunks(POLY_SEED_WORDS) {
                    polys.push(ring.new_a(seed)?);
                }
                polys
            }
            Mode::Plain => Vec::new(),
        };

        Ok(Self {
            prg: Prg::from_entropy(),
            mode: hint.mode,
            db_info: hint.db_info,
            seed_a: hint.seed,
            hint: hint.hint,
            polys_a,
            params: hint.params,
            ring,
            compress_hint: hint.compress_hint,
        })
    }

    /// Build one query per input selection vector.
    pub fn query(&mut self, inputs: &[Matrix<T>]) -> Result<(Vec<Secret<T>>, Vec<Query<T>>)> {
        let mut secrets = Vec::with_capacity(inputs.len());
        let mut queries = Vec::with_capacity(inputs.len());

        for input in inputs {
            if input.rows() != self.db_info.m || input.cols() != 1 {
                return Err(PirError::dims(format!(
                    "query input must be {}x1, got {}x{}",
                    self.db_info.m,
                    input.rows(),
                    input.cols()
                )));
            }
            match self.mode {
                Mode::Hybrid => {
                    let rlwe = self.ring.new_key(&mut self.prg);
                    let inner = self.ring.extract_lwe_key(&rlwe);

                    let mut fast_query = Vec::with_capacity(self.polys_a.len());
                    for (j, poly_a) in self.polys_a.iter().enumerate() {
                        let n = self.ring.n() as usize;
                        let start = j * n;
                        let end = (start + n).min(input.size() as usize);
                        let mut ct = self.ring.preprocess_enc(&rlwe, poly_a, &mut self.prg);
                        self.ring.encrypt_preprocessed(&mut ct, &input.data()[start..end]);
                        fast_query.push(ct.store());
                    }

                    secrets.push(Secret::Simple(SimpleSecret {
                        inner: Some(inner),
                        rlwe: Some(rlwe),
                        dummy: false,
                    }));
                    queries.push(Query::Simple(SimpleQuery { query: None, fast_query }));
                }
                Mode::Plain => {
                    let secret = Matrix::<T>::gaussian(&mut self.prg, self.params.n);
                    let err = Matrix::<T>::gaussian(&mut self.prg, self.db_info.m);

                    // A is re-expanded from the server seed rather than held
                    // in client state.
                    let mut prg_a = Prg::from_key(&self.seed_a);
                    let mut q =
                        matrix::seeded_mul(&mut prg_a, self.db_info.m, self.params.n, &secret)?;
                    q.add(&err)?;

                    let mut message = input.clone();
                    message.mul_const(T::from_u64(self.params.delta()));
                    q.add(&message)?;

                    self.pad_to_squish(&mut q);

                    secrets.push(Secret::Simple(SimpleSecret {
                        inner: Some(secret),
                        rlwe: None,
                        dummy: false,
                    }));
                    queries.push(Query::Simple(SimpleQuery { query: Some(q), fast_query: vec![] }));
                }
            }
        }
        Ok((secrets, queries))
    }

    /// Queries indistinguishable from real ones but bound to no index; used
    /// to pad batches and blind empty bucket slots.
    pub fn dummy_query(&mut self, num: u64) -> Result<(Vec<Secret<T>>, Vec<Query<T>>)> {
        let mut secrets = Vec::with_capacity(num as usize);
        let mut queries = Vec::with_capacity(num as usize);

        match self.mode {
            Mode::Hybrid => {
                let seeds = self.prg.sample_poly_seeds(num as usize);
                for seed in seeds.chunks(POLY_SEED_WORDS) {
                    let blobs = self.ring.store_random_cts(self.db_info.m, seed)?;
                    secrets.push(Secret::Simple(SimpleSecret::dummy()));
                    queries.push(Query::Simple(SimpleQuery { query: None, fast_query: blobs }));
                }
            }
            Mode::Plain => {
                for _ in 0..num {
                    let mut q = Matrix::<T>::random(&mut self.prg, self.db_info.m, 1, 0);
                    self.pad_to_squish(&mut q);
                    secrets.push(Secret::Simple(SimpleSecret::dummy()));
                    queries.push(Query::Simple(SimpleQuery { query: Some(q), fast_query: vec![] }));
                }
            }
        }
        Ok((secrets, queries))
    }

    /// Decrypt a batch of answers. Dummy secrets are skipped, so the result
    /// list lines up with the real queries in order.
    pub fn recover(
        &mut self,
        secrets: &mut [Secret<T>],
        answers: &[Answer<T>],
    ) -> Result<Vec<Matrix<T>>> {
        let mut results = Vec::with_capacity(answers.len());

        for (secret, answer) in secrets.iter_mut().zip(answers.iter()) {
            let secret = match secret {
                Secret::Simple(s) => s,
                Secret::Local(_) => {
                    return Err(PirError::dims("local secret for the simple scheme"))
                }
            };
            if secret.is_dummy() {
                continue;
            }

            let answer = match answer {
                Answer::Simple(a) => a,
                Answer::Empty => return Err(PirError::dims("empty answer for the simple scheme")),
            };

            // Real secrets are one-shot; the hint-compression path reuses the
            // pre-multiplied token until the client goes away.
            let token = if self.compress_hint {
                secret.inner.clone().ok_or(PirError::UseAfterFree)?
            } else {
                let inner = secret.inner.take().ok_or(PirError::UseAfterFree)?;
                let hint = self
                    .hint
                    .as_ref()
                    .ok_or_else(|| PirError::crypto("recover without a hint matrix"))?;
                matrix::mul(hint, &inner)?
            };
            secret.rlwe = None;

            let mut ans = answer.answer.clone();
            ans.sub(&token)?;

            let result = match self.mode {
                Mode::Hybrid => {
                    self.ring.round_lwe_inplace(&mut ans);
                    ans
                }
                Mode::Plain => {
                    let mut out = Matrix::zeros(ans.rows(), 1);
                    for (o, v) in out.data_mut().iter_mut().zip(ans.data().iter()) {
                        *o = T::from_u64(self.params.round(v.to_u64()));
                    }
                    out
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    fn pad_to_squish(&self, q: &mut Matrix<T>) {
        let squishing = self.db_info.squishing;
        if squishing != 0 && self.db_info.m % squishing != 0 {
            q.append_zeros(squishing - (self.db_info.m % squishing));
        }
    }

    pub fn db_info(&self) -> &DbInfo {
        &self.db_info
    }

    /// Client state is dominated by the hint.
    pub fn state_size(&self) -> u64 {
        self.hint.as_ref().map_or(0, Matrix::size_bytes)
    }
}

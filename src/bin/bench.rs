//! Benchmarking CLI for the retrieval engine.
//!
//! Measures query/answer/preprocessing latency for a single LHE instance,
//! full rounds of the batch and distributional layers, and communication /
//! storage sizes, over either element width.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use eyre::{bail, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dpir::batching::pbc::PbcMode;
use dpir::lhe::num_limbs;
use dpir::matrix::Matrix;
use dpir::{
    DpirClient, DpirServer, Elem, LweParams, Mode, Packing, PbcClient, PbcServer, PirType, Prg,
    PrgKey, SimpleClient, SimpleServer,
};

#[derive(Parser)]
#[command(name = "dpir-bench")]
#[command(about = "PIR benchmarking harness")]
#[command(version)]
struct Args {
    /// Raw database rows
    #[arg(long, default_value_t = 4096)]
    rows: u64,

    /// Raw database columns
    #[arg(long, default_value_t = 4096)]
    cols: u64,

    /// Element width in bits (32 or 64)
    #[arg(short = 'q', default_value_t = 32)]
    log_q: u64,

    /// Plaintext modulus
    #[arg(short = 'p', default_value_t = 1 << 9)]
    p_mod: u64,

    /// Bits per database record
    #[arg(long = "bits", default_value_t = 9)]
    bits_per: u64,

    /// Which benchmark to run
    #[arg(long, default_value = "throughput")]
    bench: BenchKind,

    /// Query mode for the LHE benchmarks
    #[arg(long, default_value = "hybrid")]
    mode: ModeArg,

    /// Bucketing strategy for the batch benchmarks
    #[arg(long = "hash", default_value = "cuckoo")]
    hash: HashArg,

    /// Bucket packing policy
    #[arg(long, default_value = "balanced")]
    packing: PackingArg,

    /// Batch size (PBC) / round load (dPIR)
    #[arg(long = "batch", default_value_t = 1)]
    batch: u64,

    /// Popularity cutoff for the dPIR benchmark
    #[arg(long, default_value_t = 0)]
    cutoff: u64,

    /// Write the state-size report to this file
    #[arg(long)]
    memprofile: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BenchKind {
    Query,
    Throughput,
    Preprocessing,
    Pbc,
    Dpir,
    Size,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Hybrid,
    None,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum HashArg {
    Cuckoo,
    Hash,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PackingArg {
    Balanced,
    Comm,
    Storage,
}

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

/// Random raw limb data with the trailing limb truncated to the record width.
fn random_raw_db(prg: &mut Prg, rows: u64, cols: u64, bits_per: u64) -> Vec<u32> {
    let limbs = num_limbs(bits_per);
    let mut data = Matrix::<u32>::random(prg, rows * limbs, cols, 0).data().to_vec();
    let tail_bits = bits_per - (limbs - 1) * 32;
    if tail_bits < 32 {
        let trunc = 1u32 << tail_bits;
        for i in 0..(rows * cols) as usize {
            data[(i + 1) * limbs as usize - 1] %= trunc;
        }
    }
    data
}

fn lhe_instance<T: Elem>(
    args: &Args,
    mode: Mode,
    random_hint: bool,
) -> Result<(SimpleClient<T>, SimpleServer<T>)> {
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, args.rows, args.cols, args.bits_per);
    let params = LweParams::new::<T>(args.cols, args.p_mod);
    let server = if random_hint {
        SimpleServer::<T>::new_for_bench(&data, args.bits_per, params, KEY, mode)?
    } else {
        SimpleServer::<T>::new(&data, args.bits_per, params, KEY, mode, false)?
    };
    let client = match server.hint() {
        dpir::lhe::Hint::Simple(h) => SimpleClient::new(h)?,
        _ => unreachable!(),
    };
    Ok((client, server))
}

fn bench_query<T: Elem>(args: &Args) -> Result<()> {
    let mode = args.mode.into();
    let (mut client, _server) = lhe_instance::<T>(args, mode, true)?;

    let mut prg = Prg::from_key(&KEY);
    let inputs: Vec<Matrix<T>> = (0..args.batch.max(1))
        .map(|_| Matrix::random(&mut prg, args.cols, 1, args.p_mod))
        .collect();

    let iters = 10;
    let start = Instant::now();
    for _ in 0..iters {
        client.query(&inputs)?;
    }
    let avg_us = start.elapsed().as_micros() as f64 / iters as f64;
    println!(
        "query({} x {}, p={}, {:?}): {:.2}us avg over {} iters",
        args.rows, args.cols, args.p_mod, mode, avg_us, iters
    );
    Ok(())
}

fn bench_throughput<T: Elem>(args: &Args) -> Result<()> {
    let mode = args.mode.into();
    let (mut client, server) = lhe_instance::<T>(args, mode, true)?;

    let mut prg = Prg::from_key(&KEY);
    let inputs: Vec<Matrix<T>> = (0..args.batch.max(1))
        .map(|_| Matrix::random(&mut prg, args.cols, 1, args.p_mod))
        .collect();
    let (_secrets, queries) = client.query(&inputs)?;

    let iters = 10;
    let start = Instant::now();
    for _ in 0..iters {
        server.answer(&queries)?;
    }
    let elapsed = start.elapsed().as_secs_f64();
    let db_bytes = (args.rows * args.cols * args.bits_per) as f64 / 8.0;
    let per_answer = elapsed / (iters as f64 * queries.len() as f64);
    println!(
        "answer({} x {}): {:.2}ms, {:.2} MB/s",
        args.rows,
        args.cols,
        per_answer * 1e3,
        db_bytes / per_answer / 1e6,
    );
    Ok(())
}

fn bench_preprocessing<T: Elem>(args: &Args) -> Result<()> {
    let mode = args.mode.into();
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, args.rows, args.cols, args.bits_per);
    let params = LweParams::new::<T>(args.cols, args.p_mod);

    let iters = 2;
    let start = Instant::now();
    for _ in 0..iters {
        SimpleServer::<T>::new(&data, args.bits_per, params, KEY, mode, false)?;
    }
    let avg = start.elapsed().as_secs_f64() / iters as f64;
    println!(
        "preprocessing({} x {}, p={}, {:?}): {:.2}s avg",
        args.rows, args.cols, args.p_mod, mode, avg
    );
    Ok(())
}

fn bench_pbc<T: Elem>(args: &Args) -> Result<()> {
    if args.batch < 2 {
        bail!("pbc benchmark needs --batch >= 2");
    }
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, args.rows, args.cols, args.bits_per);
    let limbs = num_limbs(args.bits_per);
    let n = args.rows * args.cols;

    let server = PbcServer::<T>::new(
        &data,
        args.rows * limbs,
        args.cols,
        args.batch,
        args.p_mod,
        args.bits_per,
        KEY,
        args.packing.into(),
        args.hash.into(),
    )?;
    let mut client = PbcClient::new(server.params())?;

    let indices: Vec<u64> = (0..args.batch).map(|_| prg.next_u64() % n).collect();

    let start = Instant::now();
    let (mut secrets, queries) = client.query(&indices)?;
    let query_ms = start.elapsed().as_secs_f64() * 1e3;

    let start = Instant::now();
    let answers = server.answer(&queries)?;
    let answer_ms = start.elapsed().as_secs_f64() * 1e3;

    let start = Instant::now();
    let results = client.recover(&mut secrets, &answers)?;
    let recover_ms = start.elapsed().as_secs_f64() * 1e3;

    println!(
        "pbc(batch={}, {:?}): query {:.2}ms answer {:.2}ms recover {:.2}ms, {}/{} recovered",
        args.batch,
        PbcMode::from(args.hash),
        query_ms,
        answer_ms,
        recover_ms,
        results.len(),
        indices.len(),
    );
    Ok(())
}

fn bench_dpir<T: Elem>(args: &Args) -> Result<()> {
    if args.cutoff == 0 {
        bail!("dpir benchmark needs --cutoff > 0");
    }
    if args.batch < 1 {
        bail!("dpir benchmark needs --batch >= 1");
    }
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, args.rows, args.cols, args.bits_per);
    let limbs = num_limbs(args.bits_per);
    let n = args.rows * args.cols;
    let alpha = 0.1;

    let lhe_type = match args.mode {
        ModeArg::Hybrid => PirType::SimpleHybrid,
        ModeArg::None => PirType::Simple,
    };
    let batch_type = match args.hash {
        HashArg::Cuckoo => PirType::PbcAngel,
        HashArg::Hash => PirType::Pbc,
    };

    let server = DpirServer::<T>::new(
        &data,
        args.rows * limbs,
        args.cols,
        args.cutoff,
        alpha,
        args.batch,
        args.bits_per,
        args.p_mod,
        [lhe_type, batch_type],
        args.packing.into(),
        KEY,
    )?;
    let mut client = DpirClient::new(server.params())?;

    let indices: Vec<u64> = (0..args.batch)
        .map(|_| {
            if prg.next_f64() < 1.0 - alpha {
                prg.next_u64() % args.cutoff
            } else {
                prg.next_u64() % n
            }
        })
        .collect();

    let start = Instant::now();
    let (mut secret, query) = client.query(&indices)?;
    let query_ms = start.elapsed().as_secs_f64() * 1e3;

    let start = Instant::now();
    let answer = server.answer(&query)?;
    let answer_ms = start.elapsed().as_secs_f64() * 1e3;

    let start = Instant::now();
    let results = client.recover(&mut secret, &answer)?;
    let recover_ms = start.elapsed().as_secs_f64() * 1e3;

    println!(
        "dpir(cutoff={}, load={}): query {:.2}ms answer {:.2}ms recover {:.2}ms, {}/{} recovered",
        args.cutoff,
        args.batch,
        query_ms,
        answer_ms,
        recover_ms,
        results.len(),
        indices.len(),
    );
    Ok(())
}

fn bench_size<T: Elem>(args: &Args) -> Result<()> {
    let mode = args.mode.into();
    let (mut client, server) = lhe_instance::<T>(args, mode, false)?;

    let mut prg = Prg::from_key(&KEY);
    let inputs: Vec<Matrix<T>> = (0..args.batch.max(1))
        .map(|_| Matrix::random(&mut prg, args.cols, 1, args.p_mod))
        .collect();
    let (_secrets, queries) = client.query(&inputs)?;
    let answers = server.answer(&queries)?;

    let query_bytes: u64 = queries.iter().map(|q| q.size()).sum();
    let answer_bytes: u64 = answers.iter().map(|a| a.size()).sum();
    let report = format!(
        "db: {} x {} ({} bits/record, p={})\n\
         client state: {:.2} KB\n\
         server state: {:.2} KB\n\
         query: {:.2} KB ({} queries)\n\
         answer: {:.2} KB\n",
        args.rows,
        args.cols,
        args.bits_per,
        args.p_mod,
        client.state_size() as f64 / 1024.0,
        server.state_size() as f64 / 1024.0,
        query_bytes as f64 / 1024.0,
        queries.len(),
        answer_bytes as f64 / 1024.0,
    );
    print!("{}", report);
    if let Some(path) = &args.memprofile {
        fs::write(path, report)?;
    }
    Ok(())
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Hybrid => Mode::Hybrid,
            ModeArg::None => Mode::Plain,
        }
    }
}

impl From<HashArg> for PbcMode {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Cuckoo => PbcMode::Cuckoo,
            HashArg::Hash => PbcMode::Hash,
        }
    }
}

impl From<PackingArg> for Packing {
    fn from(arg: PackingArg) -> Self {
        match arg {
            PackingArg::Balanced => Packing::Balanced,
            PackingArg::Comm => Packing::FixedComm,
            PackingArg::Storage => Packing::FixedStorage,
        }
    }
}

fn run<T: Elem>(args: &Args) -> Result<()> {
    match args.bench {
        BenchKind::Query => bench_query::<T>(args),
        BenchKind::Throughput => bench_throughput::<T>(args),
        BenchKind::Preprocessing => bench_preprocessing::<T>(args),
        BenchKind::Pbc => bench_pbc::<T>(args),
        BenchKind::Dpir => bench_dpir::<T>(args),
        BenchKind::Size => bench_size::<T>(args),
    }
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    match args.log_q {
        32 => run::<u32>(&args),
        64 => run::<u64>(&args),
        _ => bail!("element width must be 32 or 64"),
    }
}

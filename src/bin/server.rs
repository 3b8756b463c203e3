//! PIR service binary.
//!
//! Stands up a random-database PIR server with the requested shape and
//! serves the framed RPC surface. Useful for end-to-end cost measurements
//! against a real socket.

use std::net::TcpListener;

use clap::Parser;
use eyre::{bail, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dpir::lhe::num_limbs;
use dpir::matrix::Matrix;
use dpir::service::PirService;
use dpir::{Elem, LweParams, Mode, Prg, PrgKey, SimpleServer};

#[derive(Parser)]
#[command(name = "dpir-server")]
#[command(about = "PIR service over a framed stream socket")]
#[command(version)]
struct Args {
    /// Raw database rows
    #[arg(long, default_value_t = 1024)]
    rows: u64,

    /// Raw database columns
    #[arg(long, default_value_t = 1024)]
    cols: u64,

    /// Element width in bits (32 or 64)
    #[arg(short = 'q', default_value_t = 32)]
    log_q: u64,

    /// Plaintext modulus
    #[arg(short = 'p', default_value_t = 997)]
    p_mod: u64,

    /// Bits per database record
    #[arg(long = "bits", default_value_t = 1)]
    bits_per: u64,

    /// Query mode
    #[arg(long, default_value = "hybrid")]
    mode: ModeArg,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8728")]
    bind: String,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Hybrid,
    None,
}

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

fn serve<T: Elem>(args: &Args) -> Result<()> {
    let mode = match args.mode {
        ModeArg::Hybrid => Mode::Hybrid,
        ModeArg::None => Mode::Plain,
    };

    let mut prg = Prg::from_key(&KEY);
    let limbs = num_limbs(args.bits_per);
    let data = Matrix::<u32>::random(&mut prg, args.rows * limbs, args.cols, 0);

    let params = LweParams::new::<T>(args.cols, args.p_mod);
    info!(rows = args.rows, cols = args.cols, p = args.p_mod, "building server");
    let server = SimpleServer::<T>::new(data.data(), args.bits_per, params, KEY, mode, false)?;

    let listener = TcpListener::bind(&args.bind)?;
    PirService::new(server).serve(listener)?;
    Ok(())
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    match args.log_q {
        32 => serve::<u32>(&args),
        64 => serve::<u64>(&args),
        _ => bail!("element width must be 32 or 64"),
    }
}

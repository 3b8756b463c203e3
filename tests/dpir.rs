//! Distributional PIR: step-distribution rounds against a two-shard split.

use dpir::lhe::num_limbs;
use dpir::{DpirClient, DpirServer, Elem, Matrix, Packing, PirType, Prg, PrgKey};

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

fn random_raw_db(prg: &mut Prg, rows: u64, cols: u64, bits_per: u64) -> Vec<u32> {
    assert!(bits_per <= 63 && bits_per % 32 != 0, "unsupported entry bits");
    let limbs = num_limbs(bits_per);
    let mut data = Matrix::<u32>::random(prg, rows * limbs, cols, 0).data().to_vec();
    let trunc = 1u32 << (bits_per - (limbs - 1) * 32);
    for i in 0..(rows * cols) as usize {
        data[(i + 1) * limbs as usize - 1] %= trunc;
    }
    data
}

/// Run 50 rounds of step-distributed queries and require aggregate recovery
/// of at least 88%, with every returned value matching the database.
fn run_split<T: Elem>(
    cutoff: u64,
    load: u64,
    alpha: f64,
    bits_per: u64,
    rows: u64,
    cols: u64,
    p_mod: u64,
    types: [PirType; 2],
) {
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, rows, cols, bits_per);
    let limbs = num_limbs(bits_per);
    let n = rows * cols;

    let server = DpirServer::<T>::new(
        &data,
        rows * limbs,
        cols,
        cutoff,
        alpha,
        load,
        bits_per,
        p_mod,
        types,
        Packing::Balanced,
        KEY,
    )
    .unwrap();
    let mut client = DpirClient::new(server.params()).unwrap();

    let iters = 50;
    let mut correct = 0.0;
    for _ in 0..iters {
        // One fewer index than the load, exercising the dummy padding
        let indices: Vec<u64> = (0..load - 1)
            .map(|_| {
                if prg.next_f64() < 1.0 - alpha {
                    prg.next_u64() % cutoff
                } else {
                    prg.next_u64() % n
                }
            })
            .collect();

        let (mut secret, query) = client.query(&indices).unwrap();
        let answer = server.answer(&query).unwrap();
        let results = client.recover(&mut secret, &answer).unwrap();

        for (index, result) in &results {
            let at = (index * limbs) as usize;
            assert_eq!(
                result,
                &data[at..at + limbs as usize],
                "record {} mismatch",
                index
            );
        }
        correct += (results.len() + 1) as f64;
    }

    let percent = correct / (iters as f64 * load as f64);
    assert!(percent >= 0.88, "recovery rate too low: {:.3}", percent);
}

#[test]
fn test_split_plain_with_hash_batching_32() {
    run_split::<u32>(
        26215,
        10,
        0.1,
        8,
        512,
        512,
        1 << 8,
        [PirType::Simple, PirType::Pbc],
    );
}

#[test]
fn test_split_hybrid_with_cuckoo_batching_32() {
    run_split::<u32>(
        13108,
        10,
        0.1,
        24,
        256,
        512,
        1 << 8,
        [PirType::SimpleHybrid, PirType::PbcAngel],
    );
}

#[test]
fn test_split_hybrid_with_cuckoo_batching_64() {
    run_split::<u64>(
        13108,
        10,
        0.1,
        16,
        256,
        512,
        1 << 16,
        [PirType::SimpleHybrid, PirType::PbcAngel],
    );
}

#[test]
fn test_split_local_popular_shard() {
    // Popular prefix served by the trivial download scheme
    run_split::<u32>(
        26215,
        10,
        0.1,
        8,
        512,
        512,
        1 << 8,
        [PirType::Local, PirType::Pbc],
    );
}

#[test]
fn test_split_wide_records_32() {
    run_split::<u32>(
        13108,
        10,
        0.1,
        48,
        256,
        512,
        1 << 8,
        [PirType::SimpleHybrid, PirType::PbcAngel],
    );
}

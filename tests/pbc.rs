//! Batch-PIR correctness and scheduling statistics.

use std::collections::{HashMap, HashSet};

use dpir::batching::pbc::{encode_db, gen_schedule, get_buckets, PbcMode};
use dpir::lhe::num_limbs;
use dpir::{Matrix, Packing, PbcClient, PbcServer, Prg, PrgKey};

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

/// Expected hash-bucketing recovery ratio for a batch of `b` keys.
fn expected_hash_ratio(b: f64) -> f64 {
    1.0 - (1.0 - 1.0 / b).powf(b)
}

fn run_batch_round(mode: PbcMode, bits_per: u64, rows: u64, cols: u64, p_mod: u64) {
    let batch_size = 32u64;
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, rows, cols, bits_per);
    let limbs = num_limbs(bits_per);
    let n = rows * cols;

    let server = PbcServer::<u32>::new(
        &data,
        rows * limbs,
        cols,
        batch_size,
        p_mod,
        bits_per,
        prg.gen_key(),
        Packing::Balanced,
        mode,
    )
    .unwrap();
    let mut client = PbcClient::new(server.params()).unwrap();

    // Distinct random keys
    let mut indices = Vec::new();
    let mut seen = HashSet::new();
    while (indices.len() as u64) < batch_size {
        let candidate = prg.next_u64() % n;
        if seen.insert(candidate) {
            indices.push(candidate);
        }
    }
    let expected: HashMap<u64, Vec<u32>> = indices
        .iter()
        .map(|&idx| {
            let at = (idx * limbs) as usize;
            (idx, data[at..at + limbs as usize].to_vec())
        })
        .collect();

    let (mut secrets, queries) = client.query(&indices).unwrap();
    let answers = server.answer(&queries).unwrap();
    let results = client.recover(&mut secrets, &answers).unwrap();

    match mode {
        PbcMode::Hash => {
            let recovered = results.len() as f64 / batch_size as f64;
            let floor = expected_hash_ratio(batch_size as f64);
            assert!(
                recovered >= floor || (recovered - floor).abs() <= 0.1,
                "poor recovery: {:.2} vs {:.2}",
                recovered,
                floor
            );
        }
        PbcMode::Cuckoo => {
            assert_eq!(results.len(), indices.len(), "cuckoo must place every key");
        }
    }

    for (key, value) in &results {
        assert_eq!(value, &expected[key], "record {} mismatch", key);
    }
}

#[test]
fn test_batch_rounds_hash() {
    run_batch_round(PbcMode::Hash, 8, 10, 800, 1 << 8);
    run_batch_round(PbcMode::Hash, 24, 512, 256, 1 << 8);
}

#[test]
fn test_batch_rounds_cuckoo() {
    run_batch_round(PbcMode::Cuckoo, 8, 10, 800, 1 << 8);
    run_batch_round(PbcMode::Cuckoo, 24, 512, 256, 1 << 8);
}

#[test]
fn test_batch_rounds_wide_records() {
    run_batch_round(PbcMode::Hash, 48, 128, 128, 1 << 8);
    run_batch_round(PbcMode::Cuckoo, 48, 128, 128, 1 << 8);
}

/// Schedule-only statistics over many batches: the empirical hash recovery
/// ratio stays above its analytic floor.
#[test]
fn test_hash_schedule_recovery_floor() {
    let mut prg = Prg::from_key(&KEY);
    let n = 512u64 * 512;
    let batch_size = 32u64;
    let num_buckets = PbcMode::Hash.num_buckets(batch_size);

    let iters = 10_000;
    let mut recovered = 0.0;
    for _ in 0..iters {
        let mut indices = Vec::new();
        let mut seen = HashSet::new();
        while (indices.len() as u64) < batch_size {
            let candidate = prg.next_u64() % n;
            if seen.insert(candidate) {
                indices.push(candidate);
            }
        }
        let schedule = gen_schedule(&indices, PbcMode::Hash, num_buckets, &mut prg).unwrap();
        let placed: usize = schedule.values().map(Vec::len).sum();
        recovered += placed as f64 / batch_size as f64;
    }

    let avg = recovered / iters as f64;
    let floor = expected_hash_ratio(batch_size as f64) - 0.01;
    assert!(avg >= floor, "poor scheduling: {:.4} vs {:.4}", avg, floor);
}

/// Cuckoo insertion over many batches: failures are rare and every placement
/// honors the key's candidate buckets.
#[test]
fn test_cuckoo_schedule_statistics() {
    let mut prg = Prg::from_key(&KEY);
    let n = 512u64 * 512;
    let batch_size = 64u64;
    let num_buckets = PbcMode::Cuckoo.num_buckets(batch_size);

    let iters = 10_000;
    let mut failures = 0u64;
    for _ in 0..iters {
        let mut indices = Vec::new();
        let mut seen = HashSet::new();
        while (indices.len() as u64) < batch_size {
            let candidate = prg.next_u64() % n;
            if seen.insert(candidate) {
                indices.push(candidate);
            }
        }
        match gen_schedule(&indices, PbcMode::Cuckoo, num_buckets, &mut prg) {
            Ok(schedule) => {
                let placed: usize = schedule.values().map(Vec::len).sum();
                assert_eq!(placed as u64, batch_size);
                for (bucket, keys) in &schedule {
                    let choices = get_buckets(keys[0], PbcMode::Cuckoo.num_choices(), num_buckets);
                    assert!(choices.contains(bucket), "key {} outside its choices", keys[0]);
                }
            }
            Err(_) => failures += 1,
        }
    }
    assert!(
        (failures as f64) < iters as f64 * 0.01,
        "cuckoo failure rate too high: {}/{}",
        failures,
        iters
    );
}

/// The bucketed encoding places every record at the offsets its mapping
/// claims, in every candidate bucket.
#[test]
fn test_encode_db_matches_mapping() {
    let mut prg = Prg::from_key(&KEY);
    let n = 512u64 * 512;
    let limbs = 2u64;
    let items: Vec<u32> = (0..n * limbs).map(|_| prg.next_u32()).collect();

    let (buckets, mapping) = encode_db(&items, limbs, 64, PbcMode::Cuckoo).unwrap();
    for i in 0..n {
        let choices = &mapping[&i];
        assert_eq!(choices.len() as u64, PbcMode::Cuckoo.num_choices());
        let item = &items[(i * limbs) as usize..((i + 1) * limbs) as usize];
        for (bucket, idx) in choices {
            let at = (*idx as u64 * limbs) as usize;
            assert_eq!(&buckets[*bucket as usize][at..at + limbs as usize], item);
        }
    }
}

//! End-to-end correctness of the LHE core: query → answer → recover
//! round-trips the raw records for both element widths and both query modes.

use dpir::lhe::{num_limbs, Hint, Mode};
use dpir::{Elem, LweParams, Matrix, PirError, Prg, PrgKey, SimpleClient, SimpleServer};

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

/// Random raw limb data, trailing limb truncated to the record width.
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

fn rand_instance<T: Elem>(
    mode: Mode,
    bits_per: u64,
    rows: u64,
    cols: u64,
    p_mod: u64,
) -> (SimpleClient<T>, SimpleServer<T>, Vec<u32>) {
    let mut prg = Prg::from_key(&KEY);
    let data = random_raw_db(&mut prg, rows, cols, bits_per);

    let params = LweParams::new::<T>(cols, p_mod);
    let server = SimpleServer::<T>::new(&data, bits_per, params, KEY, mode, false).unwrap();
    let Hint::Simple(hint) = server.hint() else { unreachable!() };
    let client = SimpleClient::new(hint).unwrap();
    (client, server, data)
}

fn run_round_trip<T: Elem>(
    client: &mut SimpleClient<T>,
    server: &SimpleServer<T>,
    data: &[u32],
    batch_size: u64,
) {
    let info = *client.db_info();
    let limbs = num_limbs(info.bits_per);
    let mut prg = Prg::from_key(&KEY);

    let mut indices = Vec::new();
    let mut inputs = Vec::new();
    let mut expected = Vec::new();
    for _ in 0..batch_size {
        let idx = prg.next_u64() % info.n;
        let mut input = Matrix::<T>::zeros(info.m, 1);
        input.set(idx % info.m, 0, T::from_u64(1));
        indices.push(idx);
        inputs.push(input);
        let at = (idx * limbs) as usize;
        expected.push(data[at..at + limbs as usize].to_vec());
    }

    let (mut secrets, queries) = client.query(&inputs).unwrap();
    let answers = server.answer(&queries).unwrap();
    let results = client.recover(&mut secrets, &answers).unwrap();
    assert_eq!(results.len(), indices.len());

    for (i, result) in results.iter().enumerate() {
        let start = (info.ne * (indices[i] / info.m)) as usize;
        let vals: Vec<u32> = result.data()[start..start + info.ne as usize]
            .iter()
            .map(|v| v.to_u64() as u32)
            .collect();
        assert_eq!(
            info.reconstruct_elem(&vals),
            expected[i],
            "record {} mismatch",
            indices[i]
        );
    }
}

fn run_lhe<T: Elem>(bits_per: u64, p_mod: u64) {
    let db_rows = [13u64, 10, 512];
    let db_cols = [15u64, 200, 256];
    for i in 0..db_rows.len() {
        for mode in [Mode::Plain, Mode::Hybrid] {
            let (mut client, server, data) =
                rand_instance::<T>(mode, bits_per, db_rows[i], db_cols[i], p_mod);
            run_round_trip(&mut client, &server, &data, 3);
        }
    }
}

#[test]
fn test_small_entries_32() {
    run_lhe::<u32>(7, 1 << 8);
}

#[test]
fn test_small_entries_64() {
    run_lhe::<u64>(15, 1 << 16);
}

#[test]
fn test_large_entries_32() {
    run_lhe::<u32>(24, 1 << 8);
    run_lhe::<u32>(48, 1 << 8);
}

#[test]
fn test_large_entries_64() {
    run_lhe::<u64>(24, 1 << 16);
    run_lhe::<u64>(48, 1 << 16);
}

#[test]
fn test_plain_1024_square() {
    // 1 KB records packed one element per entry over a megarecord database
    let (mut client, server, data) = rand_instance::<u32>(Mode::Plain, 8, 1024, 1024, 256);
    run_round_trip(&mut client, &server, &data, 3);
}

#[test]
fn test_hybrid_64bit_wide_records() {
    let (mut client, server, data) = rand_instance::<u64>(Mode::Hybrid, 48, 512, 512, 65536);
    run_round_trip(&mut client, &server, &data, 3);
}

#[test]
fn test_secret_is_one_shot() {
    let (mut client, server, _data) = rand_instance::<u32>(Mode::Plain, 8, 64, 64, 256);
    let mut input = Matrix::<u32>::zeros(64, 1);
    input.set(0, 0, 1);

    let (mut secrets, queries) = client.query(&[input]).unwrap();
    let answers = server.answer(&queries).unwrap();
    client.recover(&mut secrets, &answers).unwrap();

    // The secret was consumed by the first recovery
    assert!(matches!(
        client.recover(&mut secrets, &answers),
        Err(PirError::UseAfterFree)
    ));
}

#[test]
fn test_batch_answer_preserves_order() {
    let (mut client, server, _data) = rand_instance::<u32>(Mode::Plain, 8, 128, 128, 256);
    let info = *client.db_info();

    // Query the same set of distinct columns twice in opposite orders; the
    // answers must line up with their queries.
    let make_input = |col: u64| {
        let mut input = Matrix::<u32>::zeros(info.m, 1);
        input.set(col, 0, 1);
        input
    };
    let forward: Vec<_> = (0..8).map(|c| make_input(c)).collect();
    let backward: Vec<_> = (0..8).rev().map(|c| make_input(c)).collect();

    let (mut s1, q1) = client.query(&forward).unwrap();
    let (mut s2, q2) = client.query(&backward).unwrap();
    let r1 = client.recover(&mut s1, &server.answer(&q1).unwrap()).unwrap();
    let r2 = client.recover(&mut s2, &server.answer(&q2).unwrap()).unwrap();

    for i in 0..8 {
        assert_eq!(r1[i], r2[7 - i]);
    }
}

#[test]
fn test_dummy_queries_blind_the_batch() {
    for mode in [Mode::Plain, Mode::Hybrid] {
        let (mut client, server, data) = rand_instance::<u32>(mode, 8, 64, 64, 256);
        let info = *client.db_info();

        let mut input = Matrix::<u32>::zeros(info.m, 1);
        input.set(5, 0, 1);
        let (mut secrets, mut queries) = client.query(&[input]).unwrap();
        let (ds, dq) = client.dummy_query(2).unwrap();
        secrets.extend(ds);
        queries.extend(dq);

        let answers = server.answer(&queries).unwrap();
        assert_eq!(answers.len(), 3);
        let results = client.recover(&mut secrets, &answers).unwrap();

        // Dummies drop out of the result list
        assert_eq!(results.len(), 1);
        let vals = vec![results[0].data()[(info.ne * (5 / info.m)) as usize].to_u64() as u32];
        assert_eq!(info.reconstruct_elem(&vals), vec![data[5]]);
    }
}

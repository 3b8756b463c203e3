use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use dpir::lhe::{num_limbs, Hint, Mode};
use dpir::{LweParams, Matrix, Prg, PrgKey, SimpleClient, SimpleServer};

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

fn instance(mode: Mode, rows: u64, cols: u64) -> (SimpleClient<u32>, SimpleServer<u32>) {
    let bits_per = 8u64;
    let p_mod = 256u64;
    let mut prg = Prg::from_key(&KEY);
    let limbs = num_limbs(bits_per);
    let data: Vec<u32> = (0..rows * limbs * cols).map(|_| prg.next_u32() % 256).collect();

    let params = LweParams::new::<u32>(cols, p_mod);
    let server = SimpleServer::new(&data, bits_per, params, KEY, mode, false).unwrap();
    let Hint::Simple(hint) = server.hint() else { unreachable!() };
    (SimpleClient::new(hint).unwrap(), server)
}

fn one_hot(m: u64, idx: u64) -> Matrix<u32> {
    let mut input = Matrix::zeros(m, 1);
    input.set(idx % m, 0, 1);
    input
}

fn lhe_benchmark(c: &mut Criterion) {
    let rows = 256u64;
    let cols = 256u64;
    let mut group = c.benchmark_group("lhe");

    for mode in [Mode::Plain, Mode::Hybrid] {
        let (mut client, server) = instance(mode, rows, cols);
        let inputs: Vec<Matrix<u32>> = (0..3).map(|i| one_hot(cols, i * 31)).collect();

        group.bench_with_input(BenchmarkId::new("query", format!("{:?}", mode)), &(), |b, _| {
            b.iter(|| client.query(&inputs).unwrap());
        });

        let (_, queries) = client.query(&inputs).unwrap();
        group.bench_with_input(BenchmarkId::new("answer", format!("{:?}", mode)), &(), |b, _| {
            b.iter(|| server.answer(&queries).unwrap());
        });

        // Secrets are one-shot, so each iteration pays for a fresh query
        // alongside the recovery; subtract the query benchmark to isolate it.
        let answers = server.answer(&queries).unwrap();
        group.bench_with_input(BenchmarkId::new("recover", format!("{:?}", mode)), &(), |b, _| {
            b.iter(|| {
                let (mut secrets, _) = client.query(&inputs).unwrap();
                client.recover(&mut secrets, &answers).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, lhe_benchmark);
criterion_main!(benches);

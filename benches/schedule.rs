use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use dpir::batching::pbc::{encode_db, gen_schedule, PbcMode};
use dpir::{Prg, PrgKey};

const KEY: PrgKey = PrgKey([
    100, 121, 60, 254, 76, 111, 7, 102, 199, 220, 220, 5, 95, 174, 252, 221,
]);

fn schedule_benchmark(c: &mut Criterion) {
    let n = 1u64 << 16;
    let batch_size = 64u64;
    let mut group = c.benchmark_group("schedule");

    for mode in [PbcMode::Hash, PbcMode::Cuckoo] {
        let num_buckets = mode.num_buckets(batch_size);
        let mut prg = Prg::from_key(&KEY);
        let indices: Vec<u64> = (0..batch_size).map(|_| prg.next_u64() % n).collect();

        group.bench_with_input(BenchmarkId::new("gen", format!("{:?}", mode)), &(), |b, _| {
            b.iter(|| gen_schedule(&indices, mode, num_buckets, &mut prg).unwrap());
        });
    }

    let items: Vec<u32> = (0..n).map(|i| i as u32).collect();
    for mode in [PbcMode::Hash, PbcMode::Cuckoo] {
        group.bench_with_input(
            BenchmarkId::new("encode_db", format!("{:?}", mode)),
            &(),
            |b, _| {
                b.iter(|| encode_db(&items, 1, batch_size, mode).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, schedule_benchmark);
criterion_main!(benches);

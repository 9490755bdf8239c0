use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use viewdb::bitmap::WahBitmap;

/// Bitmap over `len` rows with roughly `density` of them set.
fn random_bitmap(len: u32, density: f64) -> WahBitmap {
    let mut rng = rand::thread_rng();
    WahBitmap::from_positions((0..len).filter(|_| rng.gen_bool(density)))
}

/// Long runs of set rows, the shape most column indexes end up in
fn clustered_bitmap(len: u32, run: u32) -> WahBitmap {
    WahBitmap::from_positions((0..len).filter(|i| (i / run) % 2 == 0))
}

fn bench_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_algebra");

    for density in [0.001, 0.05, 0.5] {
        let a = random_bitmap(1_000_000, density);
        let b = random_bitmap(1_000_000, density);

        group.bench_with_input(BenchmarkId::new("and", density), &density, |bench, _| {
            bench.iter(|| black_box(a.and(&b)));
        });
        group.bench_with_input(BenchmarkId::new("or", density), &density, |bench, _| {
            bench.iter(|| black_box(a.or(&b)));
        });
        group.bench_with_input(BenchmarkId::new("and_not", density), &density, |bench, _| {
            bench.iter(|| black_box(a.and_not(&b)));
        });
        group.bench_with_input(BenchmarkId::new("not", density), &density, |bench, _| {
            bench.iter(|| black_box(a.not(1_000_000)));
        });
    }

    group.finish();
}

fn bench_clustered(c: &mut Criterion) {
    let a = clustered_bitmap(1_000_000, 5_000);
    let b = clustered_bitmap(1_000_000, 7_000);

    c.bench_function("clustered_and", |bench| {
        bench.iter(|| black_box(a.and(&b)));
    });
    c.bench_function("clustered_count", |bench| {
        bench.iter(|| black_box(a.count_ones()));
    });
}

fn bench_iteration(c: &mut Criterion) {
    let bits = random_bitmap(1_000_000, 0.05);

    c.bench_function("bit_indexes", |bench| {
        bench.iter(|| black_box(bits.bit_indexes().count()));
    });
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_set");

    for rows in [1_000u32, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |bench, &rows| {
            bench.iter(|| {
                let mut bits = WahBitmap::new();
                for row in (0..rows).step_by(3) {
                    bits.set(row, true);
                }
                black_box(bits)
            });
        });
    }

    group.finish();
}

fn bench_persistence(c: &mut Criterion) {
    let bits = random_bitmap(1_000_000, 0.05);
    let bytes = bits.to_file_bytes();

    c.bench_function("to_file_bytes", |bench| {
        bench.iter(|| black_box(bits.to_file_bytes()));
    });
    c.bench_function("from_file_bytes", |bench| {
        bench.iter(|| black_box(WahBitmap::from_file_bytes(&bytes, 10).unwrap()));
    });
}

criterion_group!(benches, bench_algebra, bench_clustered, bench_iteration, bench_set, bench_persistence);
criterion_main!(benches);

//! Benchmarks for segment coding
//!
//! Run with: cargo bench --package cessfs-core

use cessfs_core::{cipher, CipherKey, ErasureCoder, Layout};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Generate a test segment for `layout`
fn generate_segment(layout: &Layout) -> Vec<u8> {
    (0..layout.segment_size).map(|i| (i % 256) as u8).collect()
}

fn layouts() -> Vec<Layout> {
    vec![
        Layout::new(4 * 1024 * 1024, 4, 2).unwrap(),
        Layout::new(16 * 1024 * 1024, 4, 2).unwrap(),
        Layout::default(),
    ]
}

/// Benchmark encoding one segment at various segment sizes
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_encode");

    for layout in layouts() {
        let coder = ErasureCoder::with_layout(layout).unwrap();
        let segment = generate_segment(&layout);

        group.throughput(Throughput::Bytes(layout.segment_size as u64));
        group.bench_with_input(
            BenchmarkId::new("encode", format!("{}MB", layout.segment_size / (1024 * 1024))),
            &segment,
            |b, segment| b.iter(|| coder.encode(black_box(segment))),
        );
    }

    group.finish();
}

/// Benchmark rebuilding with 0, 1 and 2 missing fragments
fn bench_reconstruct(c: &mut Criterion) {
    let layout = Layout::new(16 * 1024 * 1024, 4, 2).unwrap();
    let coder = ErasureCoder::with_layout(layout).unwrap();
    let segment = generate_segment(&layout);
    let fragments = coder.encode(&segment).unwrap();

    let mut group = c.benchmark_group("segment_reconstruct");
    group.throughput(Throughput::Bytes(layout.segment_size as u64));

    for missing in [0usize, 1, 2] {
        group.bench_function(format!("{}_missing", missing), |b| {
            b.iter(|| {
                let mut shards: Vec<Option<Vec<u8>>> =
                    fragments.iter().cloned().map(Some).collect();
                for shard in shards.iter_mut().take(missing) {
                    *shard = None;
                }
                coder.reconstruct(black_box(&mut shards))
            })
        });
    }

    group.finish();
}

/// Benchmark segment encryption
fn bench_encrypt(c: &mut Criterion) {
    let layout = Layout::new(16 * 1024 * 1024, 4, 2).unwrap();
    let key = CipherKey::new(b"benchmark key").unwrap();
    let plaintext = vec![7u8; layout.effective_segment_size(true)];

    let mut group = c.benchmark_group("segment_cipher");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("aes_256_cbc_encrypt", |b| {
        b.iter(|| cipher::encrypt(black_box(&plaintext), &key))
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_reconstruct, bench_encrypt);
criterion_main!(benches);

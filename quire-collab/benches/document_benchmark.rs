use criterion::{criterion_group, criterion_main, Criterion};
use quire_collab::storage::{encode_record, RocksLogConfig, RocksLogProvider};
use quire_collab::{DocumentConfig, DocumentHandle, MemoryLogProvider, Operation};
use std::hint::black_box;
use std::sync::Arc;
use uuid::Uuid;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Append one byte at the end; the base is always current.
async fn append_byte(doc: &DocumentHandle, len: &mut usize, base: &mut Option<u64>) {
    let op = Operation::insert_at(*len, *len, "x").unwrap();
    let accepted = doc.apply(op, Uuid::nil(), *base).await.unwrap();
    *len += 1;
    *base = Some(accepted.index);
}

fn bench_apply_memory(c: &mut Criterion) {
    let rt = runtime();
    let provider = Arc::new(MemoryLogProvider::new());
    let doc = rt
        .block_on(DocumentHandle::open(provider, "bench", DocumentConfig::default()))
        .unwrap();
    let (mut len, mut base) = (0, None);

    c.bench_function("apply_memory_log", |b| {
        b.iter(|| rt.block_on(append_byte(&doc, &mut len, &mut base)))
    });
    rt.block_on(doc.close());
}

fn bench_apply_rocks(c: &mut Criterion) {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksLogProvider::open(RocksLogConfig::for_testing(dir.path())).unwrap());
    let doc = rt
        .block_on(DocumentHandle::open(store, "bench", DocumentConfig::default()))
        .unwrap();
    let (mut len, mut base) = (0, None);

    c.bench_function("apply_rocks_log", |b| {
        b.iter(|| rt.block_on(append_byte(&doc, &mut len, &mut base)))
    });
    rt.block_on(doc.close());
}

fn bench_stale_rebase(c: &mut Criterion) {
    let rt = runtime();
    let provider = Arc::new(MemoryLogProvider::new());
    let doc = rt
        .block_on(DocumentHandle::open(provider, "bench", DocumentConfig::default()))
        .unwrap();
    let (mut len, mut base) = (0, None);
    rt.block_on(async {
        for _ in 0..256 {
            append_byte(&doc, &mut len, &mut base).await;
        }
    });

    // Each iteration rebases a fresh edit past 256+ entries.
    c.bench_function("apply_stale_256", |b| {
        b.iter(|| {
            rt.block_on(async {
                let op = Operation::insert_at(1, 0, "s").unwrap();
                black_box(doc.apply(op, Uuid::new_v4(), Some(0)).await.unwrap())
            })
        })
    });
    rt.block_on(doc.close());
}

fn bench_encode_record(c: &mut Criterion) {
    let doc = vec![b'x'; 4096];
    let op = Operation::delete_at(&doc, 1024, 512).unwrap();

    c.bench_function("encode_record_512B_delete", |b| {
        b.iter(|| black_box(encode_record(black_box(&op)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_apply_memory,
    bench_apply_rocks,
    bench_stale_rebase,
    bench_encode_record
);
criterion_main!(benches);

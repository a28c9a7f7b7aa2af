//! Data manager and transaction benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use txstore::{Config, DataManager, Database, IsolationLevel, Xid, PAGE_SIZE};

const MEMORY: u64 = PAGE_SIZE as u64 * 256;

fn record(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Logged inserts straight into the data manager.
fn bench_dm_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("dm_insert");
    group.sample_size(20);

    for size in [32, 256, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let dm = DataManager::create(&temp_dir.path().join("bench"), MEMORY).unwrap();
            let data = record(size);

            b.iter(|| {
                let uid = dm.insert(Xid::SUPER, black_box(&data)).unwrap();
                black_box(uid);
            });

            dm.close().unwrap();
        });
    }

    group.finish();
}

/// Reads of a resident item.
fn bench_dm_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("dm_read");

    for size in [32, 256, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let dm = DataManager::create(&temp_dir.path().join("bench"), MEMORY).unwrap();
            let uid = dm.insert(Xid::SUPER, &record(size)).unwrap();

            b.iter(|| {
                let item = dm.read(black_box(uid)).unwrap().unwrap();
                black_box(item.data());
                dm.release(&item).unwrap();
            });

            dm.close().unwrap();
        });
    }

    group.finish();
}

/// Begin, insert, commit through the full stack.
fn bench_txn_insert_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn_insert_commit");
    group.sample_size(20);

    for level in [IsolationLevel::ReadCommitted, IsolationLevel::RepeatableRead] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            let temp_dir = TempDir::new().unwrap();
            let config = Config::new().memory(MEMORY);
            let db = Database::create(temp_dir.path().join("bench"), &config).unwrap();
            let data = record(128);

            b.iter(|| {
                let xid = db.begin_with(level).unwrap();
                black_box(db.insert(xid, &data).unwrap());
                db.commit(xid).unwrap();
            });

            db.close().unwrap();
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dm_insert, bench_dm_read, bench_txn_insert_commit);
criterion_main!(benches);

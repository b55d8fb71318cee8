use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use tempfile::TempDir;

use simpledbm::index::btree::{IntKeyFactory, RowLocationFactory, INT_KEY_TYPE, ROW_LOCATION_TYPE};
use simpledbm::{BTreeIndex, Database, DatabaseConfig, IsolationMode, LockMode};

const INDEX: i32 = 1;

// Create a database with one integer index in a temporary directory
fn create_test_environment(buffer_pool_size: usize) -> (TempDir, Database, BTreeIndex) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(DatabaseConfig::in_dir(dir.path()).with_buffer_pool_size(buffer_pool_size)).unwrap();
    let trx = db.begin(IsolationMode::default()).unwrap();
    let index = db
        .btree()
        .create_index(&trx, INDEX, INT_KEY_TYPE, ROW_LOCATION_TYPE, false)
        .unwrap();
    trx.commit().unwrap();
    (dir, db, index)
}

fn load(db: &Database, index: &BTreeIndex, keys: &[i64]) {
    let trx = db.begin(IsolationMode::default()).unwrap();
    for (row, key) in keys.iter().enumerate() {
        index
            .insert(&trx, &IntKeyFactory::encode(*key), &RowLocationFactory::encode(row as u64))
            .unwrap();
    }
    trx.commit().unwrap();
}

fn btree_benchmark(c: &mut Criterion) {
    let buffer_pool_size = 1000;
    let mut group = c.benchmark_group("BTreeIndex");

    for size in [100, 1000, 5000].iter() {
        // Each iteration inserts one new key in its own transaction
        group.bench_with_input(BenchmarkId::new("insert", size), size, |b, &size| {
            let (_dir, db, index) = create_test_environment(buffer_pool_size);
            let mut rng = StdRng::seed_from_u64(7);
            let preload: Vec<i64> = (0..size).map(|_| rng.r#gen()).collect();
            load(&db, &index, &preload);

            let mut row = size as u64;
            b.iter(|| {
                let trx = db.begin(IsolationMode::default()).unwrap();
                index
                    .insert(&trx, &IntKeyFactory::encode(rng.r#gen()), &RowLocationFactory::encode(row))
                    .unwrap();
                trx.commit().unwrap();
                row += 1;
            });
        });

        // Positioned fetch of a random existing key
        group.bench_with_input(BenchmarkId::new("lookup", size), size, |b, &size| {
            let (_dir, db, index) = create_test_environment(buffer_pool_size);
            let keys: Vec<i64> = (0..size as i64).collect();
            load(&db, &index, &keys);
            let mut rng = StdRng::seed_from_u64(11);

            b.iter(|| {
                let trx = db.begin(IsolationMode::ReadCommitted).unwrap();
                let key = IntKeyFactory::encode(rng.gen_range(0..size as i64));
                let mut scan = index.open_scan(Some(&key), None, LockMode::Shared);
                assert!(scan.fetch_next(&trx).unwrap());
                scan.close(&trx).unwrap();
                trx.commit().unwrap();
            });
        });

        // Full scan under cursor stability
        group.bench_with_input(BenchmarkId::new("scan", size), size, |b, &size| {
            let (_dir, db, index) = create_test_environment(buffer_pool_size);
            let keys: Vec<i64> = (0..size as i64).collect();
            load(&db, &index, &keys);

            b.iter(|| {
                let trx = db.begin(IsolationMode::CursorStability).unwrap();
                let mut scan = index.open_scan(None, None, LockMode::Shared);
                let mut count = 0;
                while scan.fetch_next(&trx).unwrap() {
                    count += 1;
                }
                scan.close(&trx).unwrap();
                trx.commit().unwrap();
                assert_eq!(count, size);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, btree_benchmark);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

use simpledbm::common::registry::ObjectRegistry;
use simpledbm::common::types::PageId;
use simpledbm::storage::buffer::{BufferManager, BufferManagerConfig, FixHint};
use simpledbm::storage::disk::{FileStorageContainerFactory, StorageManager};
use simpledbm::storage::page::RAW_PAGE_TYPE;
use simpledbm::transaction::wal::{LogManager, LogManagerConfig};
use simpledbm::Lsn;

const CONTAINER: i32 = 1;
const OWNER: u64 = 1;

// Buffer manager over a fresh container holding `pages` written pages
fn create_test_buffer_pool(pool_size: usize, pages: i32) -> (TempDir, Arc<BufferManager>) {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(FileStorageContainerFactory::new(dir.path().join("data")).unwrap());
    let storage = Arc::new(StorageManager::new(factory));
    storage.create_container(CONTAINER).unwrap();
    let log = Arc::new(LogManager::open(LogManagerConfig::in_dir(dir.path())).unwrap());
    let config = BufferManagerConfig {
        pool_size,
        ..BufferManagerConfig::default()
    };
    let buffers = Arc::new(BufferManager::new(config, storage, log, Arc::new(ObjectRegistry::new())));
    for page_number in 0..pages {
        let bab = buffers
            .fix_exclusive(OWNER, PageId::new(CONTAINER, page_number), true, RAW_PAGE_TYPE, FixHint::Normal)
            .unwrap();
        bab.page_mut().unwrap().data[100] = page_number as u8;
        bab.set_dirty(Lsn::NULL).unwrap();
    }
    buffers.write_buffers().unwrap();
    (dir, buffers)
}

fn buffer_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");
    let pages = 500;

    for size in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("sequential_access", size), size, |b, &size| {
            let (_dir, buffers) = create_test_buffer_pool(size, pages);
            let mut page_number = 0;
            b.iter(|| {
                let bab = buffers
                    .fix_shared(OWNER, PageId::new(CONTAINER, page_number), FixHint::Normal)
                    .unwrap();
                let _ = bab.page().data[100];
                page_number = (page_number + 1) % pages;
            });
        });

        group.bench_with_input(BenchmarkId::new("random_access", size), size, |b, &size| {
            let (_dir, buffers) = create_test_buffer_pool(size, pages);
            let mut rng = StdRng::seed_from_u64(3);
            b.iter(|| {
                let page_id = PageId::new(CONTAINER, rng.gen_range(0..pages));
                let bab = buffers.fix_shared(OWNER, page_id, FixHint::Normal).unwrap();
                let _ = bab.page().data[100];
            });
        });

        group.bench_with_input(BenchmarkId::new("update_and_write", size), size, |b, &size| {
            let (_dir, buffers) = create_test_buffer_pool(size, pages);
            let mut page_number = 0;
            b.iter(|| {
                let bab = buffers
                    .fix_exclusive(OWNER, PageId::new(CONTAINER, page_number), false, RAW_PAGE_TYPE, FixHint::Normal)
                    .unwrap();
                bab.page_mut().unwrap().data[101] ^= 1;
                bab.set_dirty(Lsn::NULL).unwrap();
                page_number = (page_number + 1) % pages;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, buffer_pool_benchmark);
criterion_main!(benches);

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tempfile::TempDir;

use crate::common::registry::ObjectRegistry;
use crate::common::types::{Lsn, PageId};
use crate::concurrency::LockMode;
use crate::storage::buffer::{BufferManager, BufferManagerConfig, BufferPoolError, DirtyPageInfo, FixHint};
use crate::storage::disk::{
    ContainerError, FileStorageContainerFactory, StorageContainer, StorageContainerFactory, StorageManager,
};
use crate::storage::page::RAW_PAGE_TYPE;
use crate::transaction::wal::{LogManager, LogManagerConfig, LogRecord, LogRecordKind};

struct Fixture {
    _dir: TempDir,
    log: Arc<LogManager>,
    buffers: BufferManager,
}

fn fixture(pool_size: usize) -> Fixture {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(FileStorageContainerFactory::new(dir.path().join("data")).unwrap());
    let storage = Arc::new(StorageManager::new(factory));
    storage.create_container(1).unwrap();
    let log = Arc::new(LogManager::open(LogManagerConfig::in_dir(dir.path())).unwrap());
    let config = BufferManagerConfig {
        pool_size,
        ..BufferManagerConfig::default()
    };
    let buffers = BufferManager::new(config, storage, log.clone(), Arc::new(ObjectRegistry::new()));
    Fixture { _dir: dir, log, buffers }
}

fn write_byte(buffers: &BufferManager, page_id: PageId, value: u8, lsn: Lsn) {
    let bab = buffers.fix_exclusive(1, page_id, true, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
    {
        let mut page = bab.page_mut().unwrap();
        page.data[100] = value;
        page.set_lsn(lsn);
    }
    bab.set_dirty(lsn).unwrap();
}

#[test]
fn test_evicted_page_is_written_and_reloaded() {
    let f = fixture(2);
    for n in 0..4 {
        write_byte(&f.buffers, PageId::new(1, n), n as u8 + 10, Lsn::NULL);
    }
    // Pages 0 and 1 were evicted to make room and must come back intact.
    for n in 0..4 {
        let bab = f.buffers.fix_shared(2, PageId::new(1, n), FixHint::Normal).unwrap();
        assert_eq!(bab.page().data[100], n as u8 + 10);
        assert_eq!(bab.mode(), LockMode::Shared);
    }
    let stats = f.buffers.statistics();
    let evictions = stats.iter().find(|s| s.name == "buffer.evictions").unwrap();
    assert!(evictions.value >= 2);
}

#[test]
fn test_page_write_forces_log() {
    let f = fixture(4);
    let lsn = f.log.insert(&mut LogRecord::new(1, Lsn::NULL, LogRecordKind::Begin)).unwrap();
    assert!(f.log.durable_lsn() < lsn);

    write_byte(&f.buffers, PageId::new(1, 0), 1, lsn);
    assert_eq!(f.buffers.get_dirty_pages().len(), 1);
    assert_eq!(f.buffers.write_buffers().unwrap(), 1);
    assert!(f.log.durable_lsn() >= lsn);
    assert!(f.buffers.get_dirty_pages().is_empty());
}

#[test]
fn test_pinned_pages_are_never_evicted() {
    let f = fixture(2);
    let a = f.buffers.fix_exclusive(1, PageId::new(1, 0), true, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
    let b = f.buffers.fix_exclusive(1, PageId::new(1, 1), true, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
    let result = f.buffers.fix_exclusive(1, PageId::new(1, 2), true, RAW_PAGE_TYPE, FixHint::Normal);
    assert!(matches!(result, Err(BufferPoolError::NoFreeFrames)));

    drop(b);
    assert!(f.buffers.fix_exclusive(1, PageId::new(1, 2), true, RAW_PAGE_TYPE, FixHint::Normal).is_ok());
    assert_eq!(a.page_id(), PageId::new(1, 0));
}

#[test]
fn test_discarded_frames_are_replaced_first() {
    let f = fixture(2);
    write_byte(&f.buffers, PageId::new(1, 0), 1, Lsn::NULL);
    {
        let mut bab = f.buffers.fix_exclusive(1, PageId::new(1, 1), true, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
        bab.set_hint(FixHint::Discard);
    }
    // Page 1 goes first even though page 0 was used less recently.
    write_byte(&f.buffers, PageId::new(1, 2), 3, Lsn::NULL);
    let state = f.buffers.state.lock();
    assert!(state.page_table.contains_key(&PageId::new(1, 0)));
    assert!(!state.page_table.contains_key(&PageId::new(1, 1)));
}

#[test]
fn test_missing_page_is_reported() {
    let f = fixture(2);
    let result = f.buffers.fix_shared(1, PageId::new(1, 5), FixHint::Normal);
    assert!(matches!(result, Err(BufferPoolError::PageNotFound(p)) if p == PageId::new(1, 5)));
    // The failed load leaves the frame usable.
    assert!(f.buffers.fix_exclusive(1, PageId::new(1, 5), true, RAW_PAGE_TYPE, FixHint::Normal).is_ok());
}

#[test]
fn test_recovery_lsn_is_first_dirtying_lsn() {
    let f = fixture(2);
    let page_id = PageId::new(1, 0);
    write_byte(&f.buffers, page_id, 1, Lsn::new(1, 100));
    {
        let bab = f.buffers.fix_exclusive(1, page_id, false, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
        bab.set_dirty(Lsn::new(1, 200)).unwrap();
    }
    let dirty = f.buffers.get_dirty_pages();
    assert_eq!(dirty[0].recovery_lsn, Lsn::new(1, 100));

    let mut older = dirty[0];
    older.recovery_lsn = Lsn::new(1, 50);
    f.buffers.update_recovery_lsns(&[older]);
    assert_eq!(f.buffers.get_dirty_pages()[0].recovery_lsn, Lsn::new(1, 50));
}

#[test]
fn test_latch_upgrade_through_handle() {
    let f = fixture(2);
    write_byte(&f.buffers, PageId::new(1, 0), 1, Lsn::NULL);
    let mut bab = f.buffers.fix_for_update(1, PageId::new(1, 0), FixHint::Normal).unwrap();
    assert!(bab.page_mut().is_err());
    bab.upgrade_update().unwrap();
    bab.page_mut().unwrap().data[100] = 9;
    bab.downgrade_exclusive().unwrap();
    bab.downgrade_update().unwrap();
    assert_eq!(bab.mode(), LockMode::Shared);
    bab.unfix();

    assert!(f.buffers.invalidate_container(1).is_ok());
    let _held = f.buffers.fix_exclusive(1, PageId::new(1, 3), true, RAW_PAGE_TYPE, FixHint::Normal).unwrap();
    assert!(f.buffers.invalidate_container(1).is_err());
}

/// Holds the next write, once armed, until the test lets it through
struct WriteGate {
    armed: AtomicBool,
    entered: Sender<()>,
    release: Receiver<()>,
}

struct GatedContainer {
    inner: Arc<dyn StorageContainer>,
    gate: Arc<WriteGate>,
}

impl StorageContainer for GatedContainer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<usize, ContainerError> {
        self.inner.read_at(position, buf)
    }

    fn write_at(&self, position: u64, buf: &[u8]) -> Result<(), ContainerError> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.send(()).unwrap();
            self.gate.release.recv().unwrap();
        }
        self.inner.write_at(position, buf)
    }

    fn flush(&self) -> Result<(), ContainerError> {
        self.inner.flush()
    }

    fn len(&self) -> Result<u64, ContainerError> {
        self.inner.len()
    }
}

struct GatedFactory {
    inner: FileStorageContainerFactory,
    gate: Arc<WriteGate>,
}

impl GatedFactory {
    fn wrap(&self, inner: Arc<dyn StorageContainer>) -> Arc<dyn StorageContainer> {
        Arc::new(GatedContainer {
            inner,
            gate: self.gate.clone(),
        })
    }
}

impl StorageContainerFactory for GatedFactory {
    fn create(&self, name: &str) -> Result<Arc<dyn StorageContainer>, ContainerError> {
        Ok(self.wrap(self.inner.create(name)?))
    }

    fn open(&self, name: &str) -> Result<Arc<dyn StorageContainer>, ContainerError> {
        Ok(self.wrap(self.inner.open(name)?))
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn delete(&self, name: &str) -> Result<(), ContainerError> {
        self.inner.delete(name)
    }

    fn list(&self) -> Result<Vec<String>, ContainerError> {
        self.inner.list()
    }
}

#[test]
fn test_dirty_page_table_keeps_page_while_eviction_writes_it() {
    let dir = TempDir::new().unwrap();
    let (entered_tx, entered_rx) = channel::unbounded();
    let (release_tx, release_rx) = channel::unbounded();
    let gate = Arc::new(WriteGate {
        armed: AtomicBool::new(false),
        entered: entered_tx,
        release: release_rx,
    });
    let factory = Arc::new(GatedFactory {
        inner: FileStorageContainerFactory::new(dir.path().join("data")).unwrap(),
        gate: gate.clone(),
    });
    let storage = Arc::new(StorageManager::new(factory));
    storage.create_container(1).unwrap();
    let log = Arc::new(LogManager::open(LogManagerConfig::in_dir(dir.path())).unwrap());
    let config = BufferManagerConfig {
        pool_size: 1,
        ..BufferManagerConfig::default()
    };
    let buffers = BufferManager::new(config, storage, log.clone(), Arc::new(ObjectRegistry::new()));

    let lsn = log.insert(&mut LogRecord::new(1, Lsn::NULL, LogRecordKind::Begin)).unwrap();
    let victim = PageId::new(1, 0);
    write_byte(&buffers, victim, 7, lsn);

    gate.armed.store(true, Ordering::SeqCst);
    let during = thread::scope(|s| {
        let evictor = s.spawn(|| {
            buffers
                .fix_exclusive(2, PageId::new(1, 1), true, RAW_PAGE_TYPE, FixHint::Normal)
                .map(|_| ())
        });
        // The only frame now belongs to page 1 while page 0 is still in flight
        entered_rx.recv().unwrap();
        let during = buffers.get_dirty_pages();
        release_tx.send(()).unwrap();
        evictor.join().unwrap().unwrap();
        during
    });

    assert_eq!(
        during,
        vec![DirtyPageInfo {
            page_id: victim,
            recovery_lsn: lsn,
        }]
    );
    assert!(buffers.get_dirty_pages().is_empty());
}

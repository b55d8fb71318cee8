// SimpleDBM Log Handlers
//
// Each module that writes log records registers a handler under its module
// id. Redo and undo dispatch through this table during normal rollback and
// restart.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::Page;
use crate::transaction::error::{Result, TransactionError};
use crate::transaction::transaction::Transaction;
use crate::transaction::wal::LogRecord;

/// Interprets the records written by one module
pub trait LogHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply a page record to `page`. Must be idempotent with respect to the
    /// page LSN check done by the caller.
    fn redo(&self, page: &mut Page, record: &LogRecord) -> Result<()>;

    /// Apply a record that is not tied to a page
    fn redo_global(&self, _record: &LogRecord) -> Result<()> {
        Ok(())
    }

    /// Undo an undoable record on behalf of `trx`, logging a compensation
    /// record whose undo-next LSN is the record's `prev_lsn`.
    fn undo(&self, trx: &Transaction, record: &LogRecord) -> Result<()>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<u16, Arc<dyn LogHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module_id: u16, handler: Arc<dyn LogHandler>) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&module_id) {
            return Err(TransactionError::DuplicateModule(module_id));
        }
        handlers.insert(module_id, handler);
        Ok(())
    }

    pub fn get(&self, module_id: u16) -> Result<Arc<dyn LogHandler>> {
        self.handlers
            .read()
            .get(&module_id)
            .cloned()
            .ok_or(TransactionError::UnknownModule(module_id))
    }

    pub fn is_registered(&self, module_id: u16) -> bool {
        self.handlers.read().contains_key(&module_id)
    }

    pub fn module_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.handlers.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    impl LogHandler for NoopHandler {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn redo(&self, _page: &mut Page, _record: &LogRecord) -> Result<()> {
            Ok(())
        }

        fn undo(&self, _trx: &Transaction, _record: &LogRecord) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register(7, Arc::new(NoopHandler)).unwrap();
        assert!(registry.is_registered(7));
        assert_eq!(registry.get(7).unwrap().name(), "noop");
        assert!(matches!(
            registry.register(7, Arc::new(NoopHandler)),
            Err(TransactionError::DuplicateModule(7))
        ));
        assert!(matches!(registry.get(8), Err(TransactionError::UnknownModule(8))));
        assert_eq!(registry.module_ids(), vec![7]);
    }
}

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use stockledger_core::{ExpectedVersion, ProductId};
use stockledger_inventory::StockRecord;

use super::r#trait::{StockStore, StockStoreError};

/// In-memory stock record store.
///
/// Intended for tests/dev and single-process deployments. Records are replaced
/// whole, so readers never observe a half-written `(on_hand, reserved)` pair.
#[derive(Debug)]
pub struct InMemoryStockStore {
    records: RwLock<HashMap<ProductId, StockRecord>>,
    available: AtomicBool,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: while unavailable, every call fails with
    /// `StockStoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StockStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StockStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl StockStore for InMemoryStockStore {
    fn get(&self, product_id: &ProductId) -> Result<Option<StockRecord>, StockStoreError> {
        self.ensure_available()?;

        let records = self
            .records
            .read()
            .map_err(|_| StockStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(records.get(product_id).cloned())
    }

    fn insert(&self, record: StockRecord) -> Result<StockRecord, StockStoreError> {
        self.ensure_available()?;

        let mut records = self
            .records
            .write()
            .map_err(|_| StockStoreError::Unavailable("lock poisoned".to_string()))?;

        if records.contains_key(record.product_id()) {
            return Err(StockStoreError::AlreadyExists(format!(
                "product {}",
                record.product_id()
            )));
        }

        let stored = record.with_version(1);
        records.insert(stored.product_id().clone(), stored.clone());
        Ok(stored)
    }

    fn compare_and_write(
        &self,
        record: StockRecord,
        expected: ExpectedVersion,
    ) -> Result<StockRecord, StockStoreError> {
        self.ensure_available()?;

        let mut records = self
            .records
            .write()
            .map_err(|_| StockStoreError::Unavailable("lock poisoned".to_string()))?;

        let current = records.get(record.product_id()).ok_or_else(|| {
            StockStoreError::Conflict(format!("product {} has no stored record", record.product_id()))
        })?;

        if current.id() != record.id() {
            return Err(StockStoreError::Conflict(format!(
                "record id mismatch for product {}",
                record.product_id()
            )));
        }

        if !expected.matches(current.version()) {
            return Err(StockStoreError::Conflict(format!(
                "expected {expected:?}, found {}",
                current.version()
            )));
        }

        let stored = record.with_version(current.version() + 1);
        records.insert(stored.product_id().clone(), stored.clone());
        Ok(stored)
    }

    fn list(&self) -> Result<Vec<StockRecord>, StockStoreError> {
        self.ensure_available()?;

        let records = self
            .records
            .read()
            .map_err(|_| StockStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(records.values().cloned().collect())
    }
}

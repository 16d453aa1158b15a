use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{ExpectedVersion, ProductId};
use stockledger_inventory::StockRecord;

/// Stock store operation error.
///
/// These are **infrastructure errors** (availability, write races) as opposed to
/// domain errors (validation, invariants).
///
/// ## Error Categories
///
/// - **Unavailable**: Transient backend failure; the whole operation may be retried
/// - **Conflict**: Compare-and-write lost against a concurrent writer (version mismatch)
/// - **AlreadyExists**: Put-if-absent found an existing record for the product
#[derive(Debug, Error)]
pub enum StockStoreError {
    #[error("stock store unavailable: {0}")]
    Unavailable(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("stock record already exists: {0}")]
    AlreadyExists(String),
}

/// Durable, product-keyed storage of stock records.
///
/// The store is the **persistence layer** only: it knows nothing about stock
/// invariants. The ledger is the only component allowed to write through it.
///
/// ## Contract
///
/// - `get`: whole-record snapshot or `None` (never a torn read)
/// - `insert`: put-if-absent keyed by `product_id`; stored with version 1
/// - `compare_and_write`: replace the record only if the stored version matches
///   the expectation; the written record is stamped with `stored + 1`
/// - `list`: every record, each one a consistent snapshot, no cross-record atomicity
///
/// Implementations must be safe to share across threads.
pub trait StockStore: Send + Sync {
    /// Load the record of a product, if one exists.
    fn get(&self, product_id: &ProductId) -> Result<Option<StockRecord>, StockStoreError>;

    /// Store a new record unless the product already has one.
    fn insert(&self, record: StockRecord) -> Result<StockRecord, StockStoreError>;

    /// Replace a record if its stored version matches `expected`.
    fn compare_and_write(
        &self,
        record: StockRecord,
        expected: ExpectedVersion,
    ) -> Result<StockRecord, StockStoreError>;

    /// Snapshot of every stored record, in unspecified order.
    fn list(&self) -> Result<Vec<StockRecord>, StockStoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn get(&self, product_id: &ProductId) -> Result<Option<StockRecord>, StockStoreError> {
        (**self).get(product_id)
    }

    fn insert(&self, record: StockRecord) -> Result<StockRecord, StockStoreError> {
        (**self).insert(record)
    }

    fn compare_and_write(
        &self,
        record: StockRecord,
        expected: ExpectedVersion,
    ) -> Result<StockRecord, StockStoreError> {
        (**self).compare_and_write(record, expected)
    }

    fn list(&self) -> Result<Vec<StockRecord>, StockStoreError> {
        (**self).list()
    }
}

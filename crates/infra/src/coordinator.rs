//! Per-product mutual exclusion for ledger mutations.
//!
//! Every read-validate-write on a product runs inside that product's exclusive
//! scope, so two reservations racing for the same units are serialized and the
//! second one observes the first one's write. Different products never share a
//! scope, so there is no global lock on the write path.
//!
//! Scopes are created on first use and pruned as soon as nobody holds or waits
//! on them, keeping the table proportional to in-flight products rather than to
//! the catalog size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stockledger_core::ProductId;

type Scope = Arc<Mutex<()>>;

/// Keyed exclusive-access scopes, one per product.
///
/// Acquisition is first-come-first-served with no fairness guarantee. Scopes
/// are only ever held for a single bounded read-modify-write, never across
/// caller-controlled work.
#[derive(Debug, Default)]
pub struct ReservationCoordinator {
    scopes: Mutex<HashMap<ProductId, Scope>>,
}

impl ReservationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive scope of `product_id`.
    ///
    /// A scope poisoned by a panicking holder is recovered: it guards no data of
    /// its own, and the store only ever sees whole-record writes.
    pub fn with_product<T, F>(&self, product_id: &ProductId, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let scope = self.acquire_scope(product_id);

        let result = {
            let _guard = scope.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        self.prune(product_id, scope);
        result
    }

    /// Number of products that currently have a live scope.
    pub fn active_scopes(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ProductId, Scope>> {
        // Table mutations are single insert/remove calls; a poisoned table is still consistent.
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire_scope(&self, product_id: &ProductId) -> Scope {
        self.table()
            .entry(product_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn prune(&self, product_id: &ProductId, scope: Scope) {
        let mut table = self.table();
        // One reference in the table plus ours means nobody else is waiting.
        if Arc::strong_count(&scope) == 2 {
            if let Some(current) = table.get(product_id) {
                if Arc::ptr_eq(current, &scope) {
                    table.remove(product_id);
                }
            }
        }
    }
}

//! Inventory stock-accounting rules.
//!
//! This crate contains the per-record business rules for stock levels,
//! implemented purely as deterministic domain logic (no IO, no locking, no
//! storage). Serializing concurrent access is the ledger's job.

pub mod record;

pub use record::{NewStockRecord, ReorderDefaults, StockRecord, StockStatus};

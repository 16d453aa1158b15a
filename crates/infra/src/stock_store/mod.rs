//! Stock record store boundary.
//!
//! This module defines an infrastructure-facing abstraction for durable,
//! product-keyed stock records without making any storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use r#trait::{StockStore, StockStoreError};

//! Infrastructure layer: stock ledger, reservation coordination, record storage
//! and configuration.

pub mod config;
pub mod coordinator;
pub mod ledger;
pub mod stock_store;

pub use config::LedgerConfig;
pub use coordinator::ReservationCoordinator;
pub use ledger::{LedgerError, LedgerResult, StockLedger};
pub use stock_store::{InMemoryStockStore, StockStore, StockStoreError};

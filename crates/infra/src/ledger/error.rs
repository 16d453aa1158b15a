use thiserror::Error;

use stockledger_core::DomainError;

use crate::stock_store::StockStoreError;

/// Result type returned by every ledger operation.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger operation error.
///
/// A declined reservation is **not** an error: `StockLedger::reserve` returns
/// `Ok(false)` for that.
///
/// ## Error Semantics
///
/// - `NotFound`, `AlreadyExists`, `InvalidArgument` → caller mistakes (client errors)
/// - `InvariantViolation` → the mutation would break `reserved <= on_hand` (server error)
/// - `StoreUnavailable` → transient infrastructure failure; always retryable
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no stock record: {0}")]
    NotFound(String),

    #[error("stock record already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("stock store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_) | LedgerError::AlreadyExists(_) | LedgerError::InvalidArgument(_)
        )
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InvalidId(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::NotFound => LedgerError::NotFound("record not found".to_string()),
            DomainError::AlreadyExists(msg) => LedgerError::AlreadyExists(msg),
        }
    }
}

impl From<StockStoreError> for LedgerError {
    fn from(value: StockStoreError) -> Self {
        match value {
            StockStoreError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
            // A lost compare-and-write is resolved by re-running the whole operation.
            StockStoreError::Conflict(msg) => LedgerError::StoreUnavailable(msg),
            StockStoreError::AlreadyExists(msg) => LedgerError::AlreadyExists(msg),
        }
    }
}

//! Configuration loading and representation.

use std::str::FromStr;

use stockledger_inventory::ReorderDefaults;

pub const ENV_DEFAULT_REORDER_LEVEL: &str = "STOCK_DEFAULT_REORDER_LEVEL";
pub const ENV_DEFAULT_REORDER_QUANTITY: &str = "STOCK_DEFAULT_REORDER_QUANTITY";
pub const ENV_MAX_WRITE_ATTEMPTS: &str = "STOCK_MAX_WRITE_ATTEMPTS";

/// Stock ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Reorder level given to records created without one.
    pub default_reorder_level: i64,
    /// Reorder quantity given to records created without one.
    pub default_reorder_quantity: i64,
    /// Read-validate-write attempts before a lost compare-and-write is reported
    /// as `StoreUnavailable`.
    pub max_write_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let defaults = ReorderDefaults::default();
        Self {
            default_reorder_level: defaults.reorder_level,
            default_reorder_quantity: defaults.reorder_quantity,
            max_write_attempts: 3,
        }
    }
}

impl LedgerConfig {
    /// Load from process environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_reorder_level = parse_or(
            &lookup,
            ENV_DEFAULT_REORDER_LEVEL,
            defaults.default_reorder_level,
            |v: &i64| *v >= 0,
        );
        let default_reorder_quantity = parse_or(
            &lookup,
            ENV_DEFAULT_REORDER_QUANTITY,
            defaults.default_reorder_quantity,
            |v: &i64| *v >= 0,
        );
        let max_write_attempts = parse_or(
            &lookup,
            ENV_MAX_WRITE_ATTEMPTS,
            defaults.max_write_attempts,
            |v: &u32| *v >= 1,
        );

        Self {
            default_reorder_level,
            default_reorder_quantity,
            max_write_attempts,
        }
    }

    pub fn with_default_reorder_level(mut self, level: i64) -> Self {
        self.default_reorder_level = level;
        self
    }

    pub fn with_default_reorder_quantity(mut self, quantity: i64) -> Self {
        self.default_reorder_quantity = quantity;
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn reorder_defaults(&self) -> ReorderDefaults {
        ReorderDefaults {
            reorder_level: self.default_reorder_level,
            reorder_quantity: self.default_reorder_quantity,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + Copy + core::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            tracing::warn!("{key}={raw:?} is not valid; using default {default:?}");
            default
        }
    }
}

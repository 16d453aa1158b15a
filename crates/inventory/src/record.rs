use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ProductId, RecordId};

/// Threshold defaults applied when a record is created without explicit values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderDefaults {
    pub reorder_level: i64,
    pub reorder_quantity: i64,
}

impl Default for ReorderDefaults {
    fn default() -> Self {
        Self {
            reorder_level: 10,
            reorder_quantity: 50,
        }
    }
}

/// Stock level classification of a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    /// Above the reorder level with units available.
    InStock,
    /// At or below the reorder level.
    Low,
    /// Nothing available for new reservations.
    OutOfStock,
}

/// Command: create the stock record of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStockRecord {
    pub product_id: ProductId,
    pub initial_on_hand: i64,
    pub sku: Option<String>,
    pub reorder_level: Option<i64>,
    pub reorder_quantity: Option<i64>,
    pub location: Option<String>,
}

impl NewStockRecord {
    pub fn new(product_id: ProductId, initial_on_hand: i64) -> Self {
        Self {
            product_id,
            initial_on_hand,
            sku: None,
            reorder_level: None,
            reorder_quantity: None,
            location: None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_reorder_level(mut self, level: i64) -> Self {
        self.reorder_level = Some(level);
        self
    }

    pub fn with_reorder_quantity(mut self, quantity: i64) -> Self {
        self.reorder_quantity = Some(quantity);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Stock record of one product.
///
/// Invariants, checked by every mutation before anything is changed:
/// - `0 <= reserved <= on_hand`
/// - `available() == on_hand - reserved >= 0`
///
/// Mutations are all-or-nothing: a rejected call leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    id: RecordId,
    product_id: ProductId,
    sku: Option<String>,
    on_hand: i64,
    reserved: i64,
    reorder_level: i64,
    reorder_quantity: i64,
    location: Option<String>,
    last_restocked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Write counter used for compare-and-write; 0 until first stored.
    version: u64,
}

impl StockRecord {
    /// Build a fresh record from a creation command, filling unset thresholds
    /// from `defaults`.
    pub fn create(
        id: RecordId,
        cmd: NewStockRecord,
        defaults: ReorderDefaults,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if cmd.initial_on_hand < 0 {
            return Err(DomainError::invalid_argument(
                "initial on-hand quantity cannot be negative",
            ));
        }

        let reorder_level = cmd.reorder_level.unwrap_or(defaults.reorder_level);
        if reorder_level < 0 {
            return Err(DomainError::invalid_argument(
                "reorder level cannot be negative",
            ));
        }

        let reorder_quantity = cmd.reorder_quantity.unwrap_or(defaults.reorder_quantity);
        if reorder_quantity < 0 {
            return Err(DomainError::invalid_argument(
                "reorder quantity cannot be negative",
            ));
        }

        Ok(Self {
            id,
            product_id: cmd.product_id,
            sku: cmd.sku,
            on_hand: cmd.initial_on_hand,
            reserved: 0,
            reorder_level,
            reorder_quantity,
            location: cmd.location,
            last_restocked_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    /// Units a new reservation may draw from.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    pub fn reorder_level(&self) -> i64 {
        self.reorder_level
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.reorder_quantity
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn last_restocked_at(&self) -> Option<DateTime<Utc>> {
        self.last_restocked_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Return the record stamped with a new store version.
    ///
    /// Only store implementations should call this, as part of a successful write.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.reorder_level
    }

    pub fn status(&self) -> StockStatus {
        if self.available() <= 0 {
            StockStatus::OutOfStock
        } else if self.is_low_stock() {
            StockStatus::Low
        } else {
            StockStatus::InStock
        }
    }

    /// Verify `0 <= reserved <= on_hand`.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.reserved < 0 {
            return Err(DomainError::invariant(format!(
                "reserved quantity is negative ({})",
                self.reserved
            )));
        }
        if self.reserved > self.on_hand {
            return Err(DomainError::invariant(format!(
                "reserved quantity {} exceeds on-hand {}",
                self.reserved, self.on_hand
            )));
        }
        Ok(())
    }

    /// Apply a signed change to on-hand stock.
    ///
    /// Rejected with `InvariantViolation` if the result would fall below the
    /// reserved quantity. A positive delta refreshes `last_restocked_at`.
    pub fn restock(&mut self, delta: i64, now: DateTime<Utc>) -> DomainResult<()> {
        let on_hand = self
            .on_hand
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_argument("on-hand quantity overflow"))?;

        if on_hand < self.reserved {
            return Err(DomainError::invariant(format!(
                "restock by {delta} would leave on-hand {on_hand} below reserved {}",
                self.reserved
            )));
        }

        self.on_hand = on_hand;
        if delta > 0 {
            self.last_restocked_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Move `quantity` units from available to reserved.
    ///
    /// Returns `Ok(false)` without touching the record when fewer than
    /// `quantity` units are available.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<bool> {
        ensure_positive(quantity)?;

        if self.available() < quantity {
            return Ok(false);
        }

        self.reserved += quantity;
        self.updated_at = now;
        Ok(true)
    }

    /// Undo up to `quantity` reserved units, clamping at zero.
    pub fn release(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;

        self.reserved = self.reserved.saturating_sub(quantity).max(0);
        self.updated_at = now;
        Ok(())
    }

    /// Convert units into a permanent stock decrease (fulfillment).
    ///
    /// On-hand and reserved both drop by `quantity`; reserved clamps at zero.
    /// Deducting more than is on hand is rejected with `InvariantViolation`.
    pub fn deduct(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;

        if quantity > self.on_hand {
            return Err(DomainError::invariant(format!(
                "cannot deduct {quantity} with only {} on hand",
                self.on_hand
            )));
        }

        self.on_hand -= quantity;
        self.reserved = self.reserved.saturating_sub(quantity).max(0);
        self.updated_at = now;
        Ok(())
    }
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_argument(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

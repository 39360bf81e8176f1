use chrono::{DateTime, Utc};
use common::ProductId;
use thiserror::Error;

/// Attempted to reserve more units than are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient stock: requested {requested}, available {available}")]
pub struct InsufficientStock {
    pub requested: u32,
    pub available: u32,
}

/// A ledger row: the durable stock counts for one product.
///
/// `stock_available` is sellable now; `stock_reserved` is held against
/// in-flight orders. Both counts are unsigned, so the non-negativity
/// invariant is structural. Rows are mutated only by the saga, under the
/// row lock taken by `StockStore::lock_and_fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_id: ProductId,
    pub stock_available: u32,
    pub stock_reserved: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new ledger row with the given starting stock.
    pub fn new(product_id: ProductId, stock_available: u32) -> Self {
        let now = Utc::now();
        Self {
            product_id,
            stock_available,
            stock_reserved: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves `quantity` units from available into reserved.
    ///
    /// The row is left untouched when fewer than `quantity` units are
    /// available.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), InsufficientStock> {
        if self.stock_available < quantity {
            return Err(InsufficientStock {
                requested: quantity,
                available: self.stock_available,
            });
        }
        self.stock_available -= quantity;
        self.stock_reserved += quantity;
        self.touch();
        Ok(())
    }

    /// Permanently removes up to `quantity` units from reserved stock.
    ///
    /// Returns the units actually consumed; a value below `quantity` means
    /// the reservation accounting has drifted.
    pub fn consume(&mut self, quantity: u32) -> u32 {
        let consumed = quantity.min(self.stock_reserved);
        self.stock_reserved -= consumed;
        self.touch();
        consumed
    }

    /// Returns up to `quantity` reserved units back to available stock.
    ///
    /// The clamp keeps `stock_reserved` from underflowing even when the
    /// ledger has drifted; the caller learns how many units actually came
    /// back.
    pub fn release(&mut self, quantity: u32) -> u32 {
        let released = quantity.min(self.stock_reserved);
        self.stock_reserved -= released;
        self.stock_available += released;
        self.touch();
        released
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

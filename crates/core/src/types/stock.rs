//! Quantities and stock levels.
//!
//! [`StockLevel`] is the in-process form of the stock ledger rule: stock is
//! never negative, and a reservation either takes the full requested quantity
//! or fails without changing anything. Postgres enforces the same rule with a
//! conditional `UPDATE` and a `CHECK (stock >= 0)` constraint.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantities must be at least one.
    #[error("quantity must be at least 1")]
    Zero,
    /// Quantity does not fit the storage column.
    #[error("quantity must be at most {max}")]
    TooLarge {
        /// Maximum allowed quantity.
        max: u32,
    },
}

/// A positive number of units on an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity that fits an `INTEGER` column.
    pub const MAX: u32 = i32::MAX as u32;

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::Zero` for zero and `QuantityError::TooLarge`
    /// for values above [`Quantity::MAX`].
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 {
            return Err(QuantityError::Zero);
        }
        if value > Self::MAX {
            return Err(QuantityError::TooLarge { max: Self::MAX });
        }
        Ok(Self(value))
    }

    /// Returns the number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the quantity as a database integer.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_i32(self) -> i32 {
        // Bounded by `Quantity::MAX`.
        self.0 as i32
    }

    /// Sum two quantities, saturating at [`Quantity::MAX`].
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0).min(Self::MAX))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u32::try_from(value).map_or(Err(QuantityError::Zero), Self::new)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by stock reservations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Not enough units left to satisfy the reservation.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Insufficient {
        /// Product whose stock ran short.
        product_id: ProductId,
        /// Units requested.
        requested: u32,
        /// Units available when the reservation was attempted.
        available: u32,
    },
    /// The product does not exist.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),
    /// A stock value read from storage was negative.
    #[error("negative stock {value} for product {product_id}")]
    Negative {
        /// Product with the corrupt value.
        product_id: ProductId,
        /// The stored value.
        value: i64,
    },
}

/// Available units for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockLevel(u32);

impl StockLevel {
    /// Create a stock level.
    #[must_use]
    pub const fn new(units: u32) -> Self {
        Self(units)
    }

    /// Convert a stored integer, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Negative` if `value` is below zero.
    pub fn from_stored(product_id: ProductId, value: i64) -> Result<Self, StockError> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| StockError::Negative { product_id, value })
    }

    /// Returns the number of units.
    #[must_use]
    pub const fn units(self) -> u32 {
        self.0
    }

    /// Whether `quantity` units can be taken.
    #[must_use]
    pub const fn covers(self, quantity: Quantity) -> bool {
        self.0 >= quantity.0
    }

    /// Take `quantity` units, returning the new level.
    ///
    /// Leaves `self` untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Insufficient` if fewer than `quantity` units remain.
    pub fn reserve(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Self, StockError> {
        let remaining = self
            .0
            .checked_sub(quantity.0)
            .ok_or(StockError::Insufficient {
                product_id,
                requested: quantity.0,
                available: self.0,
            })?;
        self.0 = remaining;
        Ok(*self)
    }

    /// Return `quantity` units to stock, returning the new level.
    pub fn release(&mut self, quantity: Quantity) -> Self {
        self.0 = self.0.saturating_add(quantity.0);
        *self
    }
}

impl fmt::Display for StockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PRODUCT: ProductId = ProductId::new(7);

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::try_from(-3_i32), Err(QuantityError::Zero));
    }

    #[test]
    fn test_quantity_rejects_values_beyond_integer_column() {
        assert!(matches!(
            Quantity::new(u32::MAX),
            Err(QuantityError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_reserve_decrements() {
        let mut stock = StockLevel::new(10);
        let after = stock.reserve(PRODUCT, qty(4)).unwrap();
        assert_eq!(after.units(), 6);
        assert_eq!(stock.units(), 6);
    }

    #[test]
    fn test_reserve_exact_amount_reaches_zero() {
        let mut stock = StockLevel::new(3);
        assert_eq!(stock.reserve(PRODUCT, qty(3)).unwrap().units(), 0);
    }

    #[test]
    fn test_reserve_insufficient_leaves_stock_untouched() {
        let mut stock = StockLevel::new(3);
        let err = stock.reserve(PRODUCT, qty(5)).unwrap_err();
        assert_eq!(
            err,
            StockError::Insufficient {
                product_id: PRODUCT,
                requested: 5,
                available: 3,
            }
        );
        assert_eq!(stock.units(), 3);
    }

    #[test]
    fn test_release_restores_units() {
        let mut stock = StockLevel::new(1);
        assert_eq!(stock.release(qty(4)).units(), 5);
    }

    #[test]
    fn test_from_stored_rejects_negative() {
        assert!(matches!(
            StockLevel::from_stored(PRODUCT, -1),
            Err(StockError::Negative { value: -1, .. })
        ));
        assert_eq!(StockLevel::from_stored(PRODUCT, 12).unwrap().units(), 12);
    }

    #[test]
    fn test_covers() {
        assert!(StockLevel::new(5).covers(qty(5)));
        assert!(!StockLevel::new(4).covers(qty(5)));
    }
}

//! Order types and the pure rules behind order placement and revision.
//!
//! Both stores (Postgres and in-memory) derive their stock movements from the
//! helpers here, so the diff between an order's current lines and its revised
//! lines is computed the same way everywhere.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{
    DeliveryAddress, OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId,
};

/// A placed order with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    /// Sum of `unit_price × quantity` over `items`, fixed when the lines were written.
    pub total_amount: Price,
    pub delivery_address: DeliveryAddress,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of the line subtotals.
    #[must_use]
    pub fn lines_total(&self) -> Price {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    /// The persisted lines in the shape used for revision planning.
    #[must_use]
    pub fn priced_lines(&self) -> Vec<PricedLine> {
        self.items
            .iter()
            .map(|item| PricedLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect()
    }

    /// Quantity of `product_id` on this order, if present.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> Option<Quantity> {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
    }
}

/// One line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price the product had when the line was added.
    pub unit_price: Price,
    /// Current catalog data for the product.
    pub product: Option<ProductSnapshot>,
}

impl OrderItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Catalog fields shown alongside an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub price: Price,
}

/// A requested `(product, quantity)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Collapse repeated products into one line, summing quantities.
///
/// Lines keep the position of the product's first occurrence.
#[must_use]
pub fn merge_lines(lines: &[OrderLine]) -> Vec<OrderLine> {
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    let mut positions: HashMap<ProductId, usize> = HashMap::with_capacity(lines.len());

    for line in lines {
        if let Some(&pos) = positions.get(&line.product_id) {
            if let Some(existing) = merged.get_mut(pos) {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
        } else {
            positions.insert(line.product_id, merged.len());
            merged.push(*line);
        }
    }

    merged
}

/// A line with its unit price fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl PricedLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Everything needed to write a new order in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub delivery_address: DeliveryAddress,
    pub status: OrderStatus,
    pub lines: Vec<PricedLine>,
}

impl NewOrder {
    /// Order total over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(PricedLine::subtotal).sum()
    }

    /// One reservation per line, in ascending product order.
    #[must_use]
    pub fn reservations(&self) -> Vec<StockAdjustment> {
        let mut adjustments: Vec<StockAdjustment> = self
            .lines
            .iter()
            .map(|line| StockAdjustment::Reserve {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();
        adjustments.sort_by_key(StockAdjustment::product_id);
        adjustments
    }
}

/// A requested line for a full order update, with the product's current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisedLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub current_price: Price,
}

/// Full replacement of an order's lines, address and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRevision {
    pub order_id: OrderId,
    pub delivery_address: DeliveryAddress,
    pub status: OrderStatus,
    pub lines: Vec<RevisedLine>,
}

/// A single stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Take units out of stock.
    Reserve {
        product_id: ProductId,
        quantity: Quantity,
    },
    /// Put units back into stock.
    Release {
        product_id: ProductId,
        quantity: Quantity,
    },
}

impl StockAdjustment {
    /// Product the movement applies to.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        match self {
            Self::Reserve { product_id, .. } | Self::Release { product_id, .. } => *product_id,
        }
    }
}

/// Result of diffing an order's current lines against a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionPlan {
    /// Lines the order will have afterwards, in request order.
    pub lines: Vec<PricedLine>,
    /// Lines present before but absent from the revision.
    pub removed: Vec<ProductId>,
    /// Stock movements, in ascending product order.
    pub adjustments: Vec<StockAdjustment>,
    /// New order total.
    pub total: Price,
}

/// Diff `current` against `requested`.
///
/// Products already on the order keep their original price snapshot; newly
/// added products take `current_price`. A higher quantity reserves only the
/// difference, a lower one releases the difference, and a removed line
/// releases its full quantity.
#[must_use]
pub fn plan_revision(current: &[PricedLine], requested: &[RevisedLine]) -> RevisionPlan {
    let existing: HashMap<ProductId, &PricedLine> =
        current.iter().map(|line| (line.product_id, line)).collect();
    let mut deltas: BTreeMap<ProductId, i64> = BTreeMap::new();

    let lines: Vec<PricedLine> = requested
        .iter()
        .map(|line| {
            let previous = existing.get(&line.product_id);
            let previous_qty = previous.map_or(0, |p| i64::from(p.quantity.get()));
            *deltas.entry(line.product_id).or_default() +=
                i64::from(line.quantity.get()) - previous_qty;

            PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: previous.map_or(line.current_price, |p| p.unit_price),
            }
        })
        .collect();

    let mut removed = Vec::new();
    for line in current {
        if !requested.iter().any(|r| r.product_id == line.product_id) {
            removed.push(line.product_id);
            *deltas.entry(line.product_id).or_default() -= i64::from(line.quantity.get());
        }
    }

    let adjustments = deltas
        .into_iter()
        .filter_map(|(product_id, delta)| {
            let units = u32::try_from(delta.unsigned_abs()).ok()?;
            let quantity = Quantity::new(units).ok()?;
            Some(if delta > 0 {
                StockAdjustment::Reserve {
                    product_id,
                    quantity,
                }
            } else {
                StockAdjustment::Release {
                    product_id,
                    quantity,
                }
            })
        })
        .collect();

    let total = lines.iter().map(PricedLine::subtotal).sum();

    RevisionPlan {
        lines,
        removed,
        adjustments,
        total,
    }
}

//! Order placement and changes.
//!
//! Placement validates the cart against current prices and stock, then hands
//! the whole order to [`OrderStore::create`], which writes the header and the
//! lines and reserves stock in one transaction. A stock race lost between the
//! check here and the reservation surfaces exactly like a failed check.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use orchard_core::{
    AddressError, DeliveryAddress, OrderId, OrderStatus, ProductId, StockError, UserId,
};

use crate::models::{
    NewOrder, Order, OrderLine, OrderRevision, PricedLine, Principal, Product, RevisedLine,
    merge_lines,
};
use crate::services::notifications::StatusNotifier;
use crate::store::{OrderStore, ProductStore, StoreError};

/// Errors raised by order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("An order must contain at least one item")]
    EmptyOrder,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// Requested more units than are available. Nothing was written.
    #[error("Not enough stock for {product}. Available: {available}")]
    InsufficientStock { product: String, available: u32 },

    #[error("Order {0} not found")]
    NotFound(OrderId),

    #[error("You can only access your own orders")]
    Forbidden,

    #[error(transparent)]
    Store(StoreError),
}

/// Places, reads and changes orders.
#[derive(Clone)]
pub struct OrderService {
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    notifier: StatusNotifier,
}

impl OrderService {
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
        notifier: StatusNotifier,
    ) -> Self {
        Self {
            products,
            orders,
            notifier,
        }
    }

    /// Place an order for `user_id`.
    ///
    /// Repeated products are merged into one line. Prices are snapshotted
    /// from the catalog, the total is the sum of the line subtotals, and each
    /// product's stock drops by exactly its ordered quantity. Any failure
    /// leaves no order, no lines and no stock change behind.
    ///
    /// # Errors
    ///
    /// - `OrderError::EmptyOrder` / `OrderError::Address` for invalid input
    /// - `OrderError::ProductNotFound` for an unknown product
    /// - `OrderError::InsufficientStock` if any line exceeds available stock
    /// - `OrderError::Store` if the store fails
    #[instrument(
        skip(self, lines, delivery_address),
        fields(user_id = %user_id, lines = lines.len())
    )]
    pub async fn place_order(
        &self,
        user_id: UserId,
        lines: &[OrderLine],
        delivery_address: DeliveryAddress,
    ) -> Result<Order, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        delivery_address.validate()?;

        let lines = merge_lines(lines);
        let catalog = self.load_products(&lines).await?;

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = catalog
                .get(&line.product_id)
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            if !product.stock.covers(line.quantity) {
                return Err(OrderError::InsufficientStock {
                    product: product.name.clone(),
                    available: product.stock.units(),
                });
            }
            priced.push(PricedLine {
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }

        let new_order = NewOrder {
            user_id,
            delivery_address,
            status: OrderStatus::Processing,
            lines: priced,
        };
        let total = new_order.total();

        let order_id = self
            .orders
            .create(new_order)
            .await
            .map_err(|e| stock_error(e, &catalog))?;

        info!(order_id = %order_id, total = %total, "Order placed");
        self.reload(order_id).await
    }

    /// Set an order's status and notify its owner.
    ///
    /// The notice is sent even when the status did not change; its failure
    /// never fails the update.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    #[instrument(skip(self), fields(order_id = %order_id, status = %status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let found = self
            .orders
            .set_status(order_id, status)
            .await
            .map_err(OrderError::Store)?;
        if !found {
            return Err(OrderError::NotFound(order_id));
        }

        let order = self.reload(order_id).await?;
        info!("Order status updated");
        self.notifier.notify(&order).await;
        Ok(order)
    }

    /// Replace an order's lines, address and status.
    ///
    /// Stock moves only by the difference between the old and new lines.
    /// Lines already on the order keep their price snapshot; new products
    /// are priced from the catalog. The owner is notified only if the status
    /// changed.
    ///
    /// # Errors
    ///
    /// Same as [`OrderService::place_order`], plus `OrderError::NotFound` and
    /// `OrderError::Forbidden` when `caller` does not own the order.
    #[instrument(
        skip(self, lines, delivery_address),
        fields(order_id = %order_id, user_id = %caller.user_id)
    )]
    pub async fn update_order(
        &self,
        caller: &Principal,
        order_id: OrderId,
        lines: &[OrderLine],
        delivery_address: DeliveryAddress,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let existing = self.get(caller, order_id).await?;

        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        delivery_address.validate()?;

        let lines = merge_lines(lines);
        let catalog = self.load_products(&lines).await?;

        let revised = lines
            .iter()
            .map(|line| {
                catalog
                    .get(&line.product_id)
                    .map(|product| RevisedLine {
                        product_id: product.id,
                        quantity: line.quantity,
                        current_price: product.price,
                    })
                    .ok_or(OrderError::ProductNotFound(line.product_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let revision = OrderRevision {
            order_id,
            delivery_address,
            status,
            lines: revised,
        };
        let previous = self.orders.revise(&revision).await.map_err(|e| match e {
            StoreError::OrderNotFound(id) => OrderError::NotFound(id),
            other => stock_error(other, &catalog),
        })?;

        let order = self.reload(order_id).await?;
        info!(
            previous_total = %existing.total_amount,
            total = %order.total_amount,
            "Order updated"
        );

        if previous != order.status {
            self.notifier.notify(&order).await;
        }
        Ok(order)
    }

    /// Load one order for its owner.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` or `OrderError::Forbidden`.
    pub async fn get(&self, caller: &Principal, order_id: OrderId) -> Result<Order, OrderError> {
        let order = self.reload(order_id).await?;
        if !caller.is(order.user_id) {
            warn!(order_id = %order_id, user_id = %caller.user_id, "Order access denied");
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    /// Orders visible to `caller`, newest first: all orders for admins,
    /// otherwise the caller's own.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Store` if the store fails.
    pub async fn list(&self, caller: &Principal) -> Result<Vec<Order>, OrderError> {
        let owner = (!caller.is_admin()).then_some(caller.user_id);
        self.orders.list(owner).await.map_err(OrderError::Store)
    }

    async fn load_products(
        &self,
        lines: &[OrderLine],
    ) -> Result<HashMap<ProductId, Product>, OrderError> {
        let ids: Vec<ProductId> = lines.iter().map(|line| line.product_id).collect();
        let products = self
            .products
            .find_many(&ids)
            .await
            .map_err(OrderError::Store)?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn reload(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.orders
            .find(order_id)
            .await
            .map_err(OrderError::Store)?
            .ok_or(OrderError::NotFound(order_id))
    }
}

/// Translate a store failure, naming the product for stock shortfalls.
fn stock_error(err: StoreError, catalog: &HashMap<ProductId, Product>) -> OrderError {
    match err {
        StoreError::Stock(StockError::Insufficient {
            product_id,
            available,
            ..
        }) => OrderError::InsufficientStock {
            product: catalog
                .get(&product_id)
                .map_or_else(|| format!("product {product_id}"), |p| p.name.clone()),
            available,
        },
        StoreError::Stock(StockError::UnknownProduct(product_id)) => {
            OrderError::ProductNotFound(product_id)
        }
        StoreError::OrderNotFound(order_id) => OrderError::NotFound(order_id),
        other => OrderError::Store(other),
    }
}

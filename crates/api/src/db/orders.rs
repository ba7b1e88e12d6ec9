//! Order repository.
//!
//! Placement and revision run in one transaction each: the header, the lines
//! and every stock movement commit together or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use orchard_core::{
    DeliveryAddress, OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId,
};

use super::{RepositoryError, corrupt, stock};
use crate::models::{
    NewOrder, Order, OrderItem, OrderRevision, PricedLine, ProductSnapshot, plan_revision,
};
use crate::store::{OrderStore, StoreError};

const ORDER_COLUMNS: &str = "id, user_id, total_amount, delivery_street, delivery_city, \
     delivery_postal_code, status, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    total_amount: Decimal,
    delivery_street: String,
    delivery_city: String,
    delivery_postal_code: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: OrderId::new(self.id),
            user_id: UserId::new(self.user_id),
            items,
            total_amount: Price::new(self.total_amount).map_err(|e| corrupt("order total", e))?,
            delivery_address: DeliveryAddress {
                street: self.delivery_street,
                city: self.delivery_city,
                postal_code: self.delivery_postal_code,
            },
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// An order line joined with the product it refers to.
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    product_name: String,
    product_category: String,
    product_image_url: Option<String>,
    product_price: Decimal,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let product_id = ProductId::new(row.product_id);
        Ok(Self {
            id: OrderItemId::new(row.id),
            product_id,
            quantity: Quantity::try_from(row.quantity).map_err(|e| corrupt("quantity", e))?,
            unit_price: Price::new(row.unit_price).map_err(|e| corrupt("unit price", e))?,
            product: Some(ProductSnapshot {
                id: product_id,
                name: row.product_name,
                category: row.product_category,
                image_url: row.product_image_url,
                price: Price::new(row.product_price).map_err(|e| corrupt("price", e))?,
            }),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<LineRow> for PricedLine {
    type Error = RepositoryError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: ProductId::new(row.product_id),
            quantity: Quantity::try_from(row.quantity).map_err(|e| corrupt("quantity", e))?,
            unit_price: Price::new(row.unit_price).map_err(|e| corrupt("unit price", e))?,
        })
    }
}

/// Repository for orders and their lines.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load lines for `order_ids`, grouped by order.
    async fn items_for(
        &self,
        order_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.unit_price,
                   p.name AS product_name, p.category AS product_category,
                   p.image_url AS product_image_url, p.price AS product_price
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.order_id, oi.id
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped
                .entry(order_id)
                .or_default()
                .push(OrderItem::try_from(row)?);
        }
        Ok(grouped)
    }

    async fn assemble(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut items = self.items_for(&ids).await?;
        let orders = rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }
}

/// Insert or overwrite the line for `line.product_id` on `order_id`.
async fn upsert_line(
    conn: &mut PgConnection,
    order_id: OrderId,
    line: &PricedLine,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO order_items (order_id, product_id, quantity, unit_price)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (order_id, product_id)
        DO UPDATE SET quantity = EXCLUDED.quantity,
                      unit_price = EXCLUDED.unit_price,
                      updated_at = NOW()
        ",
    )
    .bind(order_id)
    .bind(line.product_id)
    .bind(line.quantity.as_i32())
    .bind(line.unit_price)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn create(&self, order: NewOrder) -> Result<OrderId, StoreError> {
        let mut tx = self.pool.begin().await?;

        stock::apply(&mut tx, &order.reservations()).await?;

        let order_id: OrderId = sqlx::query_scalar(
            r"
            INSERT INTO orders (user_id, total_amount, delivery_street, delivery_city,
                                delivery_postal_code, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(order.user_id)
        .bind(order.total())
        .bind(&order.delivery_address.street)
        .bind(&order.delivery_address.city)
        .bind(&order.delivery_address.postal_code)
        .bind(order.status)
        .fetch_one(&mut *tx)
        .await?;

        for line in &order.lines {
            upsert_line(&mut tx, order_id, line).await?;
        }

        tx.commit().await?;
        Ok(order_id)
    }

    async fn revise(&self, revision: &OrderRevision) -> Result<OrderStatus, StoreError> {
        let mut tx = self.pool.begin().await?;

        let previous: OrderStatus =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(revision.order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::OrderNotFound(revision.order_id))?;

        let current = sqlx::query_as::<_, LineRow>(
            "SELECT product_id, quantity, unit_price FROM order_items WHERE order_id = $1",
        )
        .bind(revision.order_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(PricedLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let plan = plan_revision(&current, &revision.lines);
        stock::apply(&mut tx, &plan.adjustments).await?;

        if !plan.removed.is_empty() {
            sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND product_id = ANY($2)")
                .bind(revision.order_id)
                .bind(&plan.removed)
                .execute(&mut *tx)
                .await?;
        }
        for line in &plan.lines {
            upsert_line(&mut tx, revision.order_id, line).await?;
        }

        sqlx::query(
            r"
            UPDATE orders
            SET total_amount = $2,
                delivery_street = $3,
                delivery_city = $4,
                delivery_postal_code = $5,
                status = $6,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(revision.order_id)
        .bind(plan.total)
        .bind(&revision.delivery_address.street)
        .bind(&revision.delivery_address.city)
        .bind(&revision.delivery_address.postal_code)
        .bind(revision.status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }
}

//! Stock ledger on Postgres.
//!
//! Every change to `products.stock` made on behalf of an order goes through
//! these functions, on the caller's transaction. A reservation is a single
//! compare-and-decrement: the row is only updated if it still holds enough
//! units, so two concurrent orders can never both take the last units.

use sqlx::PgConnection;

use orchard_core::{ProductId, Quantity, StockError, StockLevel};

use crate::models::StockAdjustment;
use crate::store::StoreError;

/// Take `quantity` units of `product_id`.
///
/// # Errors
///
/// Returns `StockError::Insufficient` (with the level seen inside the
/// transaction) or `StockError::UnknownProduct`, wrapped in `StoreError`.
pub async fn reserve(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: Quantity,
) -> Result<StockLevel, StoreError> {
    let remaining: Option<i32> = sqlx::query_scalar(
        r"
        UPDATE products
        SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND stock >= $2
        RETURNING stock
        ",
    )
    .bind(product_id)
    .bind(quantity.as_i32())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = remaining {
        return Ok(StockLevel::from_stored(product_id, i64::from(stock))?);
    }

    let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    Err(match available {
        None => StockError::UnknownProduct(product_id),
        Some(stock) => StockError::Insufficient {
            product_id,
            requested: quantity.get(),
            available: u32::try_from(stock).unwrap_or(0),
        },
    }
    .into())
}

/// Return `quantity` units of `product_id` to stock.
///
/// # Errors
///
/// Returns `StockError::UnknownProduct` if the product is gone.
pub async fn release(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: Quantity,
) -> Result<StockLevel, StoreError> {
    let stock: Option<i32> = sqlx::query_scalar(
        r"
        UPDATE products
        SET stock = stock + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING stock
        ",
    )
    .bind(product_id)
    .bind(quantity.as_i32())
    .fetch_optional(&mut *conn)
    .await?;

    let stock = stock.ok_or(StockError::UnknownProduct(product_id))?;
    Ok(StockLevel::from_stored(product_id, i64::from(stock))?)
}

/// Apply `adjustments` in the given order, stopping at the first failure.
///
/// Callers pass adjustments sorted by product id so concurrent transactions
/// lock product rows in the same order.
///
/// # Errors
///
/// Returns the first reservation or release failure.
pub async fn apply(
    conn: &mut PgConnection,
    adjustments: &[StockAdjustment],
) -> Result<(), StoreError> {
    for adjustment in adjustments {
        match *adjustment {
            StockAdjustment::Reserve {
                product_id,
                quantity,
            } => {
                reserve(conn, product_id, quantity).await?;
            }
            StockAdjustment::Release {
                product_id,
                quantity,
            } => {
                release(conn, product_id, quantity).await?;
            }
        }
    }
    Ok(())
}

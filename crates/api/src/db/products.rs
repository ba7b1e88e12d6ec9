//! Product repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use orchard_core::{Price, ProductId, StockLevel};

use super::{RepositoryError, corrupt};
use crate::models::{NewProduct, Page, Product, ProductChanges, ProductQuery};
use crate::store::{DeleteOutcome, ProductStore, StoreError};

const PRODUCT_COLUMNS: &str =
    "id, name, price, stock, category, image_url, description, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: Decimal,
    stock: i32,
    category: String,
    image_url: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = ProductId::new(row.id);
        Ok(Self {
            id,
            name: row.name,
            price: Price::new(row.price).map_err(|e| corrupt("price", e))?,
            stock: StockLevel::from_stored(id, i64::from(row.stock))
                .map_err(|e| corrupt("stock", e))?,
            category: row.category,
            image_url: row.image_url,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn stock_column(stock: StockLevel) -> Result<i32, RepositoryError> {
    i32::try_from(stock.units())
        .map_err(|_| RepositoryError::Conflict(format!("stock {stock} exceeds storage range")))
}

/// Escape `%`, `_` and `\` for use inside a `LIKE` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if let Some(category) = &query.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(search) = &query.search {
        builder
            .push(" AND name ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
}

/// Repository for catalog products.
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO products (name, price, stock, category, image_url, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(product.price)
        .bind(stock_column(product.stock)?)
        .bind(&product.category)
        .bind(&product.image_url)
        .bind(&product.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_into()?)
    }

    async fn find(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::try_from).transpose()?)
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn list(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY ")
            .push(query.sort.order_by())
            .push(" LIMIT ")
            .push_bind(i64::from(ProductQuery::PER_PAGE))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));

        let rows = select
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;
        let products = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(
            products,
            query.page.max(1),
            ProductQuery::PER_PAGE,
            u64::try_from(total).unwrap_or(0),
        ))
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        let categories =
            sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn update(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        let stock = changes.stock.map(stock_column).transpose()?;
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE products
            SET name = COALESCE($2, name),
                price = COALESCE($3, price),
                stock = COALESCE($4, stock),
                category = COALESCE($5, category),
                image_url = COALESCE($6, image_url),
                description = COALESCE($7, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.price)
        .bind(stock)
        .bind(changes.category)
        .bind(changes.image_url)
        .bind(changes.description)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::try_from).transpose()?)
    }

    async fn delete(&self, id: ProductId) -> Result<DeleteOutcome, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(DeleteOutcome::NotFound),
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                Ok(DeleteOutcome::InUse)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("apple"), "apple");
    }
}

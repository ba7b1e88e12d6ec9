//! Product route handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use rust_decimal::Decimal;
use serde::Deserialize;

use orchard_core::{Price, ProductId, StockLevel};

use super::{ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{NewProduct, Page, Product, ProductChanges, ProductQuery, ProductSort};
use crate::state::AppState;

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub page: Option<u32>,
}

impl From<ListQuery> for ProductQuery {
    fn from(query: ListQuery) -> Self {
        let non_blank = |value: Option<String>| {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        Self {
            category: non_blank(query.category),
            search: non_blank(query.search),
            sort: query
                .sort_by
                .as_deref()
                .map_or_else(ProductSort::default, ProductSort::from_param),
            page: query.page.unwrap_or(1).max(1),
        }
    }
}

/// Body of `POST /api/products`.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

/// Body of `PUT /api/products/{id}`. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

fn price(value: Decimal) -> Result<Price> {
    Price::new(value).map_err(|_| AppError::Validation("The price must be at least 0".to_owned()))
}

fn stock(value: i64) -> Result<StockLevel> {
    if value > i64::from(i32::MAX) {
        return Err(AppError::Validation("The stock is too large".to_owned()));
    }
    StockLevel::from_stored(ProductId::new(0), value)
        .map_err(|_| AppError::Validation("The stock must be at least 0".to_owned()))
}

/// GET /api/products
///
/// # Errors
///
/// Returns `AppError` if the catalog cannot be read.
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Page<Product>>> {
    let page = state.catalog().list(&query.into()).await?;
    Ok(ApiResponse::ok("Products retrieved successfully", page))
}

/// GET /api/products/categories
///
/// # Errors
///
/// Returns `AppError` if the catalog cannot be read.
pub async fn categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<String>>> {
    let categories = state.catalog().categories().await?;
    Ok(ApiResponse::ok("Categories retrieved successfully", categories))
}

/// GET /api/products/{id}
///
/// # Errors
///
/// Returns 404 for an unknown product.
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<Product>> {
    let product = state.catalog().get(ProductId::new(id)).await?;
    Ok(ApiResponse::ok("Product retrieved successfully", product))
}

/// POST /api/products
///
/// # Errors
///
/// Returns 422 for invalid fields.
pub async fn store(
    State(state): State<AppState>,
    RequireAuth(_principal): RequireAuth,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .create(NewProduct {
            name: body.name,
            price: price(body.price)?,
            stock: stock(body.stock)?,
            category: body.category,
            image_url: body.image_url,
            description: body.description,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Insert successful", product),
    ))
}

/// PUT /api/products/{id}
///
/// # Errors
///
/// Returns 404 for an unknown product and 422 for invalid fields.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(_principal): RequireAuth,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateProductRequest>,
) -> Result<ApiResponse<Product>> {
    let changes = ProductChanges {
        name: body.name,
        price: body.price.map(price).transpose()?,
        stock: body.stock.map(stock).transpose()?,
        category: body.category,
        image_url: body.image_url,
        description: body.description,
    };
    let product = state.catalog().update(ProductId::new(id), changes).await?;
    Ok(ApiResponse::ok("Product updated successfully", product))
}

/// DELETE /api/products/{id}
///
/// # Errors
///
/// Returns 404 for an unknown product and 400 if it appears on an order.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(_principal): RequireAuth,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>> {
    state.catalog().delete(ProductId::new(id)).await?;
    Ok(ApiResponse::ok("Product deleted successfully.", ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults_and_blanks() {
        let query: ProductQuery = ListQuery {
            category: Some("  ".to_owned()),
            search: Some(" Apple ".to_owned()),
            sort_by: Some("price-high".to_owned()),
            page: Some(0),
        }
        .into();

        assert_eq!(query.category, None);
        assert_eq!(query.search.as_deref(), Some("Apple"));
        assert_eq!(query.sort, ProductSort::PriceHigh);
        assert_eq!(query.page, 1);
    }

    #[test]
    fn test_stock_bounds() {
        assert!(stock(-1).is_err());
        assert!(stock(i64::from(i32::MAX) + 1).is_err());
        assert_eq!(stock(12).ok(), Some(StockLevel::new(12)));
    }
}

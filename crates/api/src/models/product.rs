//! Catalog product types.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{Price, ProductId, StockLevel};

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Current unit price.
    pub price: Price,
    /// Units available for new orders.
    pub stock: StockLevel,
    /// Catalog category (e.g., "citrus").
    pub category: String,
    /// Public image URL.
    pub image_url: Option<String>,
    /// Long-form description.
    pub description: Option<String>,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    pub stock: StockLevel,
    pub category: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

/// Partial product update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<StockLevel>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

impl ProductChanges {
    /// Whether the update touches nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
            && self.description.is_none()
    }

    /// Apply the changes to an in-memory product.
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = Some(image_url);
        }
        if let Some(description) = self.description {
            product.description = Some(description);
        }
    }
}

/// Sort orders accepted by the catalog listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    /// Alphabetical by name.
    #[default]
    Name,
    /// Cheapest first.
    PriceLow,
    /// Most expensive first.
    PriceHigh,
    /// Most units in stock first.
    Stock,
}

impl ProductSort {
    /// Parse a `sortBy` query value. Unknown values fall back to [`ProductSort::Name`].
    #[must_use]
    pub fn from_param(value: &str) -> Self {
        match value {
            "price-low" => Self::PriceLow,
            "price-high" => Self::PriceHigh,
            "stock" => Self::Stock,
            _ => Self::Name,
        }
    }

    /// `ORDER BY` clause for this sort. Ties break on id so paging is stable.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Name => "name ASC, id ASC",
            Self::PriceLow => "price ASC, id ASC",
            Self::PriceHigh => "price DESC, id ASC",
            Self::Stock => "stock DESC, id ASC",
        }
    }

    /// In-process equivalent of [`ProductSort::order_by`].
    #[must_use]
    pub fn compare(self, a: &Product, b: &Product) -> Ordering {
        let primary = match self {
            Self::Name => a.name.cmp(&b.name),
            Self::PriceLow => a.price.cmp(&b.price),
            Self::PriceHigh => b.price.cmp(&a.price),
            Self::Stock => b.stock.cmp(&a.stock),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Catalog listing filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// Exact category match.
    pub category: Option<String>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
    pub sort: ProductSort,
    /// 1-based page number.
    pub page: u32,
}

impl ProductQuery {
    /// Products per page.
    pub const PER_PAGE: u32 = 8;

    /// Rows to skip for the requested page.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(Self::PER_PAGE)
    }

    /// Whether `product` passes the category and search filters.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|category| product.category == category);
        let search_ok = self.search.as_deref().is_none_or(|needle| {
            product
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        category_ok && search_ok
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            sort: ProductSort::Name,
            page: 1,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Wrap `data` as page `current_page` of `total` rows.
    #[must_use]
    pub fn new(data: Vec<T>, current_page: u32, per_page: u32, total: u64) -> Self {
        let pages = total.div_ceil(u64::from(per_page.max(1)));
        Self {
            data,
            current_page,
            last_page: u32::try_from(pages).unwrap_or(u32::MAX).max(1),
            per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_param_fallback() {
        assert_eq!(ProductSort::from_param("price-high"), ProductSort::PriceHigh);
        assert_eq!(ProductSort::from_param("bogus"), ProductSort::Name);
    }

    #[test]
    fn test_query_offset() {
        let query = ProductQuery {
            page: 3,
            ..ProductQuery::default()
        };
        assert_eq!(query.offset(), 16);
        let first = ProductQuery {
            page: 0,
            ..ProductQuery::default()
        };
        assert_eq!(first.offset(), 0);
    }

    #[test]
    fn test_page_counts() {
        let page: Page<u8> = Page::new(vec![], 1, 8, 17);
        assert_eq!(page.last_page, 3);
        let empty: Page<u8> = Page::new(vec![], 1, 8, 0);
        assert_eq!(empty.last_page, 1);
    }
}

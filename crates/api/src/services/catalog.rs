//! Catalog management.

use std::sync::Arc;

use tracing::{error, info, instrument};

use orchard_core::ProductId;

use crate::models::{NewProduct, Page, Product, ProductChanges, ProductQuery};
use crate::services::queue::{FAN_OUT_DELAY, Task, TaskQueue};
use crate::store::{DeleteOutcome, ProductStore, StoreError};

/// Longest accepted name or category.
const MAX_TEXT_LENGTH: usize = 255;

/// Why a catalog operation was refused.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("Product {0} not found")]
    NotFound(ProductId),

    /// The product is referenced by order lines.
    #[error("Product {0} appears in existing orders and cannot be deleted")]
    InUse(ProductId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, lists, changes and removes products.
#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductStore>,
    queue: Arc<dyn TaskQueue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(products: Arc<dyn ProductStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { products, queue }
    }

    /// Add a product and queue the new product fan-out.
    ///
    /// The fan-out runs a few seconds later on the `notifications` queue.
    /// Failing to queue it is logged and does not undo the product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for a blank or overlong name or
    /// category, or `CatalogError::Store` if the insert fails.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, mut product: NewProduct) -> Result<Product, CatalogError> {
        product.name = required_text("name", &product.name)?;
        product.category = required_text("category", &product.category)?;

        let created = self.products.create(product).await?;
        info!(product_id = %created.id, "Product created");

        let task = Task::NewProductFanOut {
            product_id: created.id,
        };
        if let Err(e) = self.queue.schedule(task, task.queue(), FAN_OUT_DELAY).await {
            error!(
                product_id = %created.id,
                error = %e,
                "Failed to queue new product notifications"
            );
        }

        Ok(created)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no product has `id`.
    pub async fn get(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.products
            .find(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    /// One page of products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Store` if the store fails.
    pub async fn list(&self, query: &ProductQuery) -> Result<Page<Product>, CatalogError> {
        Ok(self.products.list(query).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Store` if the store fails.
    pub async fn categories(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.products.categories().await?)
    }

    /// Apply `changes` to a product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for blank text fields or an empty
    /// update, and `CatalogError::NotFound` for an unknown product.
    #[instrument(skip(self, changes), fields(product_id = %id))]
    pub async fn update(
        &self,
        id: ProductId,
        mut changes: ProductChanges,
    ) -> Result<Product, CatalogError> {
        if changes.is_empty() {
            return Err(CatalogError::Validation("Nothing to update".to_owned()));
        }
        if let Some(name) = changes.name.as_deref() {
            changes.name = Some(required_text("name", name)?);
        }
        if let Some(category) = changes.category.as_deref() {
            changes.category = Some(required_text("category", category)?);
        }

        let updated = self
            .products
            .update(id, changes)
            .await?
            .ok_or(CatalogError::NotFound(id))?;
        info!("Product updated");
        Ok(updated)
    }

    /// Remove a product that no order references.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` or `CatalogError::InUse`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<(), CatalogError> {
        match self.products.delete(id).await? {
            DeleteOutcome::Deleted => {
                info!("Product deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(CatalogError::NotFound(id)),
            DeleteOutcome::InUse => Err(CatalogError::InUse(id)),
        }
    }
}

fn required_text(field: &str, value: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation(format!("The {field} field is required")));
    }
    if trimmed.chars().count() > MAX_TEXT_LENGTH {
        return Err(CatalogError::Validation(format!(
            "The {field} field must be at most {MAX_TEXT_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("name", "  Fig ").ok().as_deref(), Some("Fig"));
        assert!(matches!(
            required_text("name", "   "),
            Err(CatalogError::Validation(msg)) if msg == "The name field is required"
        ));
        assert!(required_text("category", &"x".repeat(256)).is_err());
    }
}

//! Single new product delivery.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use orchard_core::{ProductId, UserId};

use crate::models::NewNotification;
use crate::services::email::{EmailError, MailMessage, Mailer};
use crate::store::{NotificationStore, ProductStore, StoreError, UserStore};

/// A delivery attempt failed; the task should be retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// What a successful attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Inbox record written and email sent.
    Delivered,
    /// The product or user no longer exists.
    SkippedMissing,
    /// The user has no email address.
    SkippedNoEmail,
}

/// Notifies one user about one new product.
#[derive(Clone)]
pub struct DeliveryWorker {
    products: Arc<dyn ProductStore>,
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
    shop_url: String,
}

impl DeliveryWorker {
    /// `shop_url` is the public front-end base used for product links.
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductStore>,
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationStore>,
        mailer: Arc<dyn Mailer>,
        shop_url: impl Into<String>,
    ) -> Self {
        Self {
            products,
            users,
            notifications,
            mailer,
            shop_url: shop_url.into(),
        }
    }

    /// Re-read the product and user, then write the inbox record and send the
    /// email.
    ///
    /// Missing rows and users without an email are logged and treated as
    /// done. Every other failure is returned so the attempt is retried; a
    /// retry reuses the inbox record an earlier attempt wrote.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the store or the mailer fails.
    #[instrument(skip(self), fields(product_id = %product_id, user_id = %user_id))]
    pub async fn deliver(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let result = self.try_deliver(product_id, user_id).await;
        if let Err(e) = &result {
            error!(error = %e, "Failed to notify user");
        }
        result
    }

    async fn try_deliver(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let product = self.products.find(product_id).await?;
        let user = self.users.find(user_id).await?;
        let (Some(product), Some(user)) = (product, user) else {
            warn!("Product or user not found");
            return Ok(DeliveryOutcome::SkippedMissing);
        };
        let Some(email) = user.email.clone() else {
            warn!("User has no email");
            return Ok(DeliveryOutcome::SkippedNoEmail);
        };

        info!("Processing notification for user");

        // A retry after a failed send finds the record from the first attempt.
        if self
            .notifications
            .has_new_product_notice(user.id, product.id)
            .await?
        {
            info!("Inbox record already written");
        } else {
            self.notifications
                .create(NewNotification::new_product(user.id, &product))
                .await?;
        }

        let message = MailMessage::NewProduct {
            recipient_name: user.display_name(),
            product_url: format!("{}/products/{}", self.shop_url, product.id),
            product,
        };
        self.mailer.send(&email, &message).await?;

        info!("Successfully notified user");
        Ok(DeliveryOutcome::Delivered)
    }
}

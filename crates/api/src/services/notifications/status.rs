//! Order status notice.
//!
//! Runs inline after a status change is committed. Best effort: nothing here
//! can fail the status update.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::models::{NewNotification, Order};
use crate::services::email::{MailMessage, Mailer};
use crate::store::{NotificationStore, UserStore};

/// What the notifier managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotice {
    /// Inbox record written and email sent.
    Sent,
    /// Owner missing or without an email; nothing written.
    NoRecipient,
    /// Something failed; logged.
    Failed,
}

/// Tells an order's owner that its status changed.
#[derive(Clone)]
pub struct StatusNotifier {
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
}

impl StatusNotifier {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users,
            notifications,
            mailer,
        }
    }

    /// Write a `status_update` inbox record for the owner of `order` and
    /// email them the order with its lines. Errors are logged, not returned.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    pub async fn notify(&self, order: &Order) -> StatusNotice {
        let user = match self.users.find(order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id = %order.user_id, "Order owner not found; no status notice");
                return StatusNotice::NoRecipient;
            }
            Err(e) => {
                error!(error = %e, "Failed to load order owner");
                return StatusNotice::Failed;
            }
        };
        let Some(email) = user.email.clone() else {
            warn!(user_id = %user.id, "Order owner has no email; no status notice");
            return StatusNotice::NoRecipient;
        };

        if let Err(e) = self
            .notifications
            .create(NewNotification::status_update(order))
            .await
        {
            error!(error = %e, "Failed to store status notification");
            return StatusNotice::Failed;
        }

        let message = MailMessage::StatusChanged {
            recipient_name: user.display_name(),
            order: order.clone(),
        };
        if let Err(e) = self.mailer.send(&email, &message).await {
            error!(error = %e, "Failed to send status email");
            return StatusNotice::Failed;
        }

        info!(user_id = %user.id, "Status notice sent");
        StatusNotice::Sent
    }
}

//! A user's notification inbox.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use orchard_core::{NotificationId, UserId};

use crate::models::Notification;
use crate::store::{NotificationStore, StoreError};

/// Inbox lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    /// No such notification for this user.
    #[error("Notification {0} not found")]
    NotFound(NotificationId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A user's notifications and their read state.
#[derive(Clone)]
pub struct InboxService {
    store: Arc<dyn NotificationStore>,
}

impl InboxService {
    #[must_use]
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// The user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InboxError::Store` if the store fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Notification>, InboxError> {
        Ok(self.store.list_for(user_id).await?)
    }

    /// # Errors
    ///
    /// Returns `InboxError::Store` if the store fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<u64, InboxError> {
        Ok(self.store.unread_count(user_id).await?)
    }

    /// Mark one of the user's notifications as read.
    ///
    /// # Errors
    ///
    /// Returns `InboxError::NotFound` if the notification does not exist or
    /// belongs to someone else.
    #[instrument(skip(self), fields(user_id = %user_id, notification_id = %id))]
    pub async fn mark_read(&self, user_id: UserId, id: NotificationId) -> Result<(), InboxError> {
        if self.store.mark_read(user_id, id, Utc::now()).await? {
            Ok(())
        } else {
            Err(InboxError::NotFound(id))
        }
    }
}

//! In-app notification repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use orchard_core::{NotificationId, NotificationKind, ProductId, UserId};

use crate::models::{NewNotification, Notification};
use crate::store::{NotificationStore, StoreError};

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, message, data, read, read_at, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    kind: NotificationKind,
    message: String,
    data: Value,
    read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: NotificationId::new(row.id),
            user_id: UserId::new(row.user_id),
            kind: row.kind,
            message: row.message,
            data: row.data,
            read: row.read,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

/// Repository for the notification inbox.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r"
            INSERT INTO notifications (user_id, kind, message, data)
            VALUES ($1, $2, $3, $4)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(notification.user_id)
        .bind(notification.kind)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn has_new_product_notice(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE user_id = $1
                  AND kind = 'new_product'
                  AND (data ->> 'product_id')::BIGINT = $2
            )
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_for(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Re-reading keeps the first read timestamp.
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET read = TRUE, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

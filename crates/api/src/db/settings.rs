//! Notification settings repository.

use async_trait::async_trait;
use sqlx::PgPool;

use orchard_core::UserId;

use crate::models::{NotificationSettings, SettingsPatch};
use crate::store::{SettingsStore, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    user_id: i64,
    order_updates_enabled: bool,
    new_products_enabled: bool,
}

impl From<SettingsRow> for NotificationSettings {
    fn from(row: SettingsRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            order_updates_enabled: row.order_updates_enabled,
            new_products_enabled: row.new_products_enabled,
        }
    }
}

/// Repository for per-user notification opt-ins.
#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    /// Create a new settings repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SettingsRepository {
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationSettings, StoreError> {
        let defaults = NotificationSettings::defaults(user_id);

        // The no-op update makes RETURNING yield the existing row on conflict,
        // so concurrent first reads agree on a single record.
        let row = sqlx::query_as::<_, SettingsRow>(
            r"
            INSERT INTO user_notification_settings
                (user_id, order_updates_enabled, new_products_enabled)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING user_id, order_updates_enabled, new_products_enabled
            ",
        )
        .bind(user_id)
        .bind(defaults.order_updates_enabled)
        .bind(defaults.new_products_enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update(
        &self,
        user_id: UserId,
        patch: &SettingsPatch,
    ) -> Result<NotificationSettings, StoreError> {
        let defaults = NotificationSettings::defaults(user_id).patched(patch);

        let row = sqlx::query_as::<_, SettingsRow>(
            r"
            INSERT INTO user_notification_settings
                (user_id, order_updates_enabled, new_products_enabled)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET order_updates_enabled = COALESCE($4, user_notification_settings.order_updates_enabled),
                new_products_enabled = COALESCE($5, user_notification_settings.new_products_enabled),
                updated_at = NOW()
            RETURNING user_id, order_updates_enabled, new_products_enabled
            ",
        )
        .bind(user_id)
        .bind(defaults.order_updates_enabled)
        .bind(defaults.new_products_enabled)
        .bind(patch.order_updates)
        .bind(patch.new_products)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

//! Notification settings service.

use std::sync::Arc;

use tracing::instrument;

use orchard_core::UserId;

use crate::models::{NotificationSettings, SettingsPatch};
use crate::store::{SettingsStore, StoreError};

/// Settings update failures.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A setting id other than 1 or 2.
    #[error("unknown notification setting id {0}")]
    UnknownSetting(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads and updates a user's notification opt-ins.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
}

impl SettingsService {
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// The user's settings, materializing the defaults on first access.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Store` if the store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_or_create(
        &self,
        user_id: UserId,
    ) -> Result<NotificationSettings, SettingsError> {
        Ok(self.store.get_or_create(user_id).await?)
    }

    /// Apply `(setting id, enabled)` pairs. Only the addressed flags change.
    ///
    /// The whole request is rejected if any id is unknown.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::UnknownSetting` for an id outside 1..=2, or
    /// `SettingsError::Store` if the store fails.
    #[instrument(skip(self, entries), fields(user_id = %user_id))]
    pub async fn update(
        &self,
        user_id: UserId,
        entries: &[(i64, bool)],
    ) -> Result<NotificationSettings, SettingsError> {
        let patch = SettingsPatch::from_entries(entries.iter().copied())
            .map_err(SettingsError::UnknownSetting)?;
        Ok(self.store.update(user_id, &patch).await?)
    }
}

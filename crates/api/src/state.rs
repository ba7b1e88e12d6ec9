//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::notifications::{InboxService, SettingsService, StatusNotifier};
use crate::services::{CatalogService, Mailer, OrderService, PasswordResetService};
use crate::store::Stores;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and holds the services every
/// route works through.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    catalog: CatalogService,
    orders: OrderService,
    settings: SettingsService,
    inbox: InboxService,
    password_reset: PasswordResetService,
}

impl AppState {
    /// Wire the services to `stores`.
    ///
    /// # Arguments
    ///
    /// * `stores` - Storage ports and the task queue
    /// * `mailer` - Outbound mail transport
    /// * `base_url` - Public front end, used in emailed links
    /// * `pool` - Database probed by the readiness check, if any
    #[must_use]
    pub fn new(
        stores: &Stores,
        mailer: Arc<dyn Mailer>,
        base_url: &str,
        pool: Option<PgPool>,
    ) -> Self {
        let notifier = StatusNotifier::new(
            stores.users.clone(),
            stores.notifications.clone(),
            mailer.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                pool,
                catalog: CatalogService::new(stores.products.clone(), stores.queue.clone()),
                orders: OrderService::new(stores.products.clone(), stores.orders.clone(), notifier),
                settings: SettingsService::new(stores.settings.clone()),
                inbox: InboxService::new(stores.notifications.clone()),
                password_reset: PasswordResetService::new(
                    stores.users.clone(),
                    stores.reset_tokens.clone(),
                    mailer,
                    base_url,
                ),
            }),
        }
    }

    /// Get the database pool, if the state is backed by Postgres.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsService {
        &self.inner.settings
    }

    #[must_use]
    pub fn inbox(&self) -> &InboxService {
        &self.inner.inbox
    }

    #[must_use]
    pub fn password_reset(&self) -> &PasswordResetService {
        &self.inner.password_reset
    }
}

//! Storage ports.
//!
//! Services depend on these traits rather than on a connection pool, so the
//! same order, catalog and notification logic runs against Postgres in
//! production and against [`MemoryStore`] in tests.
//!
//! Implementations must uphold the stock ledger rules: a reservation either
//! takes the full quantity or changes nothing, stock never goes negative, and
//! every write made by [`OrderStore::create`] or [`OrderStore::revise`]
//! commits or rolls back as a unit.

#[cfg(feature = "test-support")]
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use orchard_core::{Email, NotificationId, OrderId, OrderStatus, ProductId, StockError, UserId};

use crate::db::{
    JobRepository, NotificationRepository, OrderRepository, PasswordResetRepository,
    ProductRepository, RepositoryError, SettingsRepository, UserRepository,
};
use crate::models::{
    NewNotification, NewOrder, NewProduct, Notification, NotificationSettings, Order,
    OrderRevision, Page, PasswordResetToken, Product, ProductChanges, ProductQuery, SettingsPatch,
    User,
};
use crate::services::queue::TaskQueue;

#[cfg(feature = "test-support")]
pub use memory::MemoryStore;

/// Errors returned by the storage ports.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A reservation could not be satisfied; nothing was written.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// The order to change does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Outcome of a product deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The product appears on at least one order line.
    InUse,
}

/// Catalog rows.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, product: NewProduct) -> Result<Product, StoreError>;

    async fn find(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Products with the given ids, in ascending id order. Unknown ids are skipped.
    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    async fn list(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError>;

    /// Distinct categories, alphabetically.
    async fn categories(&self) -> Result<Vec<String>, StoreError>;

    async fn update(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError>;

    async fn delete(&self, id: ProductId) -> Result<DeleteOutcome, StoreError>;
}

/// Orders, their lines and the stock they hold.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the order header and lines and reserve stock for every line,
    /// atomically.
    ///
    /// Reservations are applied in ascending product id order. A shortfall on
    /// any line fails with [`StoreError::Stock`] and leaves no trace.
    async fn create(&self, order: NewOrder) -> Result<OrderId, StoreError>;

    /// Replace an order's lines, address and status, moving only the stock
    /// difference between the old and new lines. Returns the status the
    /// order had before the revision.
    async fn revise(&self, revision: &OrderRevision) -> Result<OrderStatus, StoreError>;

    /// Set the status. Returns `false` if the order does not exist.
    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError>;

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders newest first, restricted to `owner` when given.
    async fn list(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError>;
}

/// Shop users, read-mostly.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    /// Users with an email address whose new-product flag is on, by ascending id.
    async fn new_product_subscribers(&self) -> Result<Vec<User>, StoreError>;

    /// Returns `false` if the user does not exist.
    async fn set_password_hash(&self, id: UserId, password_hash: &str)
    -> Result<bool, StoreError>;
}

/// Per-user inbox records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError>;

    /// A user's notifications, newest first.
    async fn list_for(&self, user_id: UserId) -> Result<Vec<Notification>, StoreError>;

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Whether `user_id` already has a new product notice for `product_id`.
    async fn has_new_product_notice(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, StoreError>;

    /// Mark one of `user_id`'s notifications as read. Returns `false` if the
    /// user has no such notification.
    async fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// One notification settings record per user.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The user's settings, creating the default record if none exists.
    /// Concurrent calls for the same user produce one record.
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationSettings, StoreError>;

    /// Apply `patch` on top of the stored (or default) settings.
    async fn update(
        &self,
        user_id: UserId,
        patch: &SettingsPatch,
    ) -> Result<NotificationSettings, StoreError>;
}

/// Password reset tokens, at most one per email.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Insert or replace the token for `token.email`.
    async fn put(&self, token: &PasswordResetToken) -> Result<(), StoreError>;

    async fn find(&self, email: &Email) -> Result<Option<PasswordResetToken>, StoreError>;

    /// Remove and return the token for `email` if its hash is `token_hash`.
    /// Of several concurrent calls with the same token, at most one gets it.
    async fn consume(
        &self,
        email: &Email,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError>;

    async fn delete(&self, email: &Email) -> Result<(), StoreError>;
}

/// Shared handles to every store, plus the task queue.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            products: Arc::new(ProductRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            notifications: Arc::new(NotificationRepository::new(pool.clone())),
            settings: Arc::new(SettingsRepository::new(pool.clone())),
            reset_tokens: Arc::new(PasswordResetRepository::new(pool.clone())),
            queue: Arc::new(JobRepository::new(pool.clone())),
        }
    }

    /// Every store backed by `store`, with `queue` as the task queue.
    #[cfg(feature = "test-support")]
    #[must_use]
    pub fn memory(store: &MemoryStore, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            products: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            notifications: Arc::new(store.clone()),
            settings: Arc::new(store.clone()),
            reset_tokens: Arc::new(store.clone()),
            queue,
        }
    }
}

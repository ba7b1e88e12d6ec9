//! Postgres repositories.
//!
//! # Tables
//!
//! - `users` - Shop users (identity, contact email, role, password hash)
//! - `products` - Catalog; `stock` is the stock ledger (`CHECK (stock >= 0)`)
//! - `orders`, `order_items` - Orders and their price-snapshotted lines
//! - `user_notification_settings` - One opt-in row per user
//! - `notifications` - In-app inbox
//! - `password_reset_tokens` - One hashed token per email
//! - `jobs` - Durable task queue
//!
//! Each repository owns a pool handle and implements one of the storage
//! ports in [`crate::store`]. Queries are checked at runtime (`query_as`
//! with `FromRow` rows), so building does not need a live database.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p orchard-cli -- migrate
//! ```

mod jobs;
mod notifications;
mod orders;
mod password_reset_tokens;
mod products;
mod settings;
pub mod stock;
mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use jobs::JobRepository;
pub use notifications::NotificationRepository;
pub use orders::OrderRepository;
pub use password_reset_tokens::PasswordResetRepository;
pub use products::ProductRepository;
pub use settings::SettingsRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a corrupt stored value to `RepositoryError::DataCorruption`.
pub(crate) fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

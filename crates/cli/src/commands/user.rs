//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! orchard user create -e admin@example.com -f Ada -l Lovelace -r admin -p "s3cret-pass"
//! ```
//!
//! Without `--password` the account has no password; the user sets one via
//! the password reset flow.

use orchard_api::services::{hash_password, password_reset::MIN_PASSWORD_LENGTH};
use orchard_core::{Email, UserRole};
use thiserror::Error;

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Invalid role: {0}. Valid roles: customer, admin")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,

    #[error("Password hashing failed")]
    PasswordHash,

    #[error("User already exists with email: {0}")]
    UserExists(String),
}

/// Create a new user with default notification settings.
///
/// # Errors
///
/// Returns an error for invalid input, an existing email, or a database failure.
pub async fn create(
    email: &str,
    first_name: &str,
    last_name: &str,
    role: &str,
    password: Option<&str>,
) -> Result<i64, Box<dyn std::error::Error>> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;

    let password_hash = match password {
        Some(p) if p.chars().count() < MIN_PASSWORD_LENGTH => {
            return Err(UserError::WeakPassword.into());
        }
        Some(p) => Some(hash_password(p).map_err(|_| UserError::PasswordHash)?),
        None => None,
    };

    let pool = super::connect().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = $1")
        .bind(email.as_str())
        .fetch_optional(&pool)
        .await?;
    if existing.is_some() {
        return Err(UserError::UserExists(email.to_string()).into());
    }

    let mut tx = pool.begin().await?;
    let user_id: i64 = sqlx::query_scalar(
        r"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(&email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_notification_settings (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user_id,
        email,
        role
    );
    if password.is_none() {
        tracing::warn!(
            "Note: User has no password. They can set one through the password reset link."
        );
    }

    Ok(user_id)
}

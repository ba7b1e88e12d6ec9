//! Password reset token repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use orchard_core::Email;

use super::{RepositoryError, corrupt};
use crate::models::PasswordResetToken;
use crate::store::{ResetTokenStore, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    email: String,
    token_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for PasswordResetToken {
    type Error = RepositoryError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            email: Email::parse(&row.email).map_err(|e| corrupt("email", e))?,
            token_hash: row.token_hash,
            created_at: row.created_at,
        })
    }
}

/// Repository for reset tokens, keyed by email.
#[derive(Clone)]
pub struct PasswordResetRepository {
    pool: PgPool,
}

impl PasswordResetRepository {
    /// Create a new password reset token repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PasswordResetRepository {
    async fn put(&self, token: &PasswordResetToken) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO password_reset_tokens (email, token_hash, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, created_at = EXCLUDED.created_at
            ",
        )
        .bind(&token.email)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, email: &Email) -> Result<Option<PasswordResetToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT email, token_hash, created_at FROM password_reset_tokens WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasswordResetToken::try_from).transpose()?)
    }

    async fn consume(
        &self,
        email: &Email,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r"
            DELETE FROM password_reset_tokens
            WHERE email = $1 AND token_hash = $2
            RETURNING email, token_hash, created_at
            ",
        )
        .bind(email)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasswordResetToken::try_from).transpose()?)
    }

    async fn delete(&self, email: &Email) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

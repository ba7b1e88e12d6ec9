//! Password reset by emailed link.
//!
//! A request stores the SHA-256 of a random URL-safe token under the user's
//! email, replacing any earlier token, and mails a link carrying the token.
//! Completing the reset checks the token against the hash and its 24 hour
//! lifetime, stores the new Argon2 hash and deletes the token.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use orchard_core::Email;

use crate::models::PasswordResetToken;
use crate::services::email::{EmailError, MailMessage, Mailer};
use crate::store::{ResetTokenStore, StoreError, UserStore};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Random bytes per token, before encoding.
const TOKEN_BYTES: usize = 32;

/// Why a reset request or completion failed.
#[derive(Debug, thiserror::Error)]
pub enum PasswordResetError {
    /// Unknown, mismatched or superseded token.
    #[error("This password reset token is invalid")]
    InvalidToken,

    #[error("This password reset token has expired")]
    ExpiredToken,

    #[error("The password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,

    #[error("password hashing error")]
    PasswordHash,

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues and redeems emailed reset tokens.
#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn ResetTokenStore>,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl PasswordResetService {
    /// `base_url` is the front end that serves `/reset-password`.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn Mailer>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            base_url: base_url.into(),
        }
    }

    /// Issue a token for `email` and mail the reset link.
    ///
    /// Unknown emails succeed silently so the endpoint does not reveal which
    /// addresses have accounts.
    ///
    /// # Errors
    ///
    /// Returns `PasswordResetError::Store` or `PasswordResetError::Email`.
    #[instrument(skip(self, email))]
    pub async fn request(&self, email: &Email) -> Result<(), PasswordResetError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token();
        self.tokens
            .put(&PasswordResetToken {
                email: email.clone(),
                token_hash: hash_token(&token),
                created_at: Utc::now(),
            })
            .await?;

        let message = MailMessage::PasswordReset {
            recipient_name: user.display_name(),
            reset_url: reset_url(&self.base_url, &token, email),
        };
        self.mailer.send(email, &message).await?;

        info!(user_id = %user.id, "Password reset link sent");
        Ok(())
    }

    /// Set a new password using a previously mailed token.
    ///
    /// # Errors
    ///
    /// - `PasswordResetError::WeakPassword` for passwords under 8 characters
    /// - `PasswordResetError::InvalidToken` for an unknown, wrong or already
    ///   used token
    /// - `PasswordResetError::ExpiredToken` for a token older than 24 hours,
    ///   which is deleted
    ///
    /// The token is consumed before the password is written, so concurrent
    /// resets with one token let exactly one through.
    #[instrument(skip(self, email, token, new_password))]
    pub async fn reset(
        &self,
        email: &Email,
        token: &str,
        new_password: &str,
    ) -> Result<(), PasswordResetError> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PasswordResetError::WeakPassword);
        }

        // Hash first so a consumed token is never lost to a hashing failure.
        let password_hash = hash_password(new_password)?;

        let Some(consumed) = self.tokens.consume(email, &hash_token(token)).await? else {
            return Err(self.rejection(email).await?);
        };
        if consumed.is_expired(Utc::now()) {
            return Err(PasswordResetError::ExpiredToken);
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(PasswordResetError::InvalidToken)?;
        if !self.users.set_password_hash(user.id, &password_hash).await? {
            return Err(PasswordResetError::InvalidToken);
        }

        info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }

    /// Why a token that could not be consumed was rejected. An expired
    /// token on file is deleted.
    async fn rejection(&self, email: &Email) -> Result<PasswordResetError, PasswordResetError> {
        match self.tokens.find(email).await? {
            Some(stored) if stored.is_expired(Utc::now()) => {
                self.tokens.delete(email).await?;
                Ok(PasswordResetError::ExpiredToken)
            }
            Some(_) => {
                warn!("Password reset token mismatch");
                Ok(PasswordResetError::InvalidToken)
            }
            None => Ok(PasswordResetError::InvalidToken),
        }
    }
}

/// Random URL-safe token.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of `token`.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// `{base_url}/reset-password?token=…&email=…` with the email form-encoded.
#[must_use]
pub fn reset_url(base_url: &str, token: &str, email: &Email) -> String {
    let email: String = url::form_urlencoded::byte_serialize(email.as_str().as_bytes())
        .collect();
    format!("{base_url}/reset-password?token={token}&email={email}")
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `PasswordResetError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, PasswordResetError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordResetError::PasswordHash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    use super::*;

    #[test]
    fn test_generate_token_is_url_safe() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reset_url_encodes_email() {
        let email = Email::parse("jane+shop@example.com").unwrap();
        assert_eq!(
            reset_url("https://orchard.example", "tok", &email),
            "https://orchard.example/reset-password?token=tok&email=jane%2Bshop%40example.com"
        );
    }

    #[test]
    fn test_hash_password_verifies() {
        let hash = hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"correct horse", &parsed)
                .is_ok()
        );
    }
}

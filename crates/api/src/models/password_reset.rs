//! Password reset token records.

use chrono::{DateTime, Duration, Utc};

use orchard_core::Email;

/// A stored reset token. Only the SHA-256 hash of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetToken {
    pub email: Email,
    /// Hex-encoded SHA-256 of the token sent to the user.
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// How long a token stays valid after it is issued.
    pub const TTL: Duration = Duration::hours(24);

    /// Whether the token is past its lifetime at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Self::TTL
    }
}

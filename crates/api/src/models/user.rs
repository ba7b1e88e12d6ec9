//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{Email, UserId, UserRole};

/// A registered shop user.
///
/// Accounts created through an OAuth provider may have no email address;
/// such users never receive mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Contact address, if the account has one.
    pub email: Option<Email>,
    pub role: UserRole,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last", or whichever half is present.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Principal {
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }

    /// Whether the caller is `owner`.
    #[must_use]
    pub fn is(&self, owner: UserId) -> bool {
        self.user_id == owner
    }
}

//! Per-user notification preferences.

use serde::Serialize;

use orchard_core::UserId;

/// A user's notification opt-ins. At most one record exists per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationSettings {
    pub user_id: UserId,
    pub order_updates_enabled: bool,
    pub new_products_enabled: bool,
}

impl NotificationSettings {
    /// Settings a user gets before choosing anything: everything on.
    #[must_use]
    pub const fn defaults(user_id: UserId) -> Self {
        Self {
            user_id,
            order_updates_enabled: true,
            new_products_enabled: true,
        }
    }

    /// Whether `kind` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, kind: SettingKind) -> bool {
        match kind {
            SettingKind::OrderUpdates => self.order_updates_enabled,
            SettingKind::NewProducts => self.new_products_enabled,
        }
    }

    /// Apply `patch`, leaving unaddressed flags as they are.
    #[must_use]
    pub fn patched(mut self, patch: &SettingsPatch) -> Self {
        if let Some(enabled) = patch.order_updates {
            self.order_updates_enabled = enabled;
        }
        if let Some(enabled) = patch.new_products {
            self.new_products_enabled = enabled;
        }
        self
    }

    /// The settings as shown in the settings screen, in id order.
    #[must_use]
    pub fn views(&self) -> Vec<SettingView> {
        SettingKind::ALL
            .iter()
            .map(|&kind| SettingView {
                id: kind.id(),
                title: kind.title(),
                description: kind.description(),
                enabled: self.is_enabled(kind),
            })
            .collect()
    }
}

/// Notification categories a user can opt in or out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKind {
    /// Order status changes.
    OrderUpdates,
    /// Catalog additions.
    NewProducts,
}

impl SettingKind {
    pub const ALL: [Self; 2] = [Self::OrderUpdates, Self::NewProducts];

    /// Stable numeric id used by clients.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::OrderUpdates => 1,
            Self::NewProducts => 2,
        }
    }

    /// Look up a category by its numeric id.
    #[must_use]
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::OrderUpdates),
            2 => Some(Self::NewProducts),
            _ => None,
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::OrderUpdates => "Order Updates",
            Self::NewProducts => "New Products",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::OrderUpdates => "Get notified about your order status",
            Self::NewProducts => "Be the first to know about new arrivals",
        }
    }
}

/// One row of the settings screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingView {
    pub id: u8,
    pub title: &'static str,
    pub description: &'static str,
    pub enabled: bool,
}

/// A partial settings update. `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub order_updates: Option<bool>,
    pub new_products: Option<bool>,
}

impl SettingsPatch {
    /// Set `kind` to `enabled`. A later call for the same kind wins.
    #[must_use]
    pub const fn with(mut self, kind: SettingKind, enabled: bool) -> Self {
        match kind {
            SettingKind::OrderUpdates => self.order_updates = Some(enabled),
            SettingKind::NewProducts => self.new_products = Some(enabled),
        }
        self
    }

    /// Build a patch from `(id, enabled)` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first id that names no setting.
    pub fn from_entries<I>(entries: I) -> Result<Self, i64>
    where
        I: IntoIterator<Item = (i64, bool)>,
    {
        entries.into_iter().try_fold(Self::default(), |patch, (id, enabled)| {
            SettingKind::from_id(id)
                .map(|kind| patch.with(kind, enabled))
                .ok_or(id)
        })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.order_updates.is_none() && self.new_products.is_none()
    }
}

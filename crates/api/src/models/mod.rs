//! Domain models for the Orchard API.
//!
//! These types are what services and stores exchange. Database row types live
//! next to the queries in [`crate::db`] and are converted into these.

pub mod notification;
pub mod order;
pub mod password_reset;
pub mod product;
pub mod settings;
pub mod user;

pub use notification::{NewNotification, Notification};
pub use order::{
    NewOrder, Order, OrderItem, OrderLine, OrderRevision, PricedLine, ProductSnapshot,
    RevisedLine, RevisionPlan, StockAdjustment, merge_lines, plan_revision,
};
pub use password_reset::PasswordResetToken;
pub use product::{NewProduct, Page, Product, ProductChanges, ProductQuery, ProductSort};
pub use settings::{NotificationSettings, SettingKind, SettingView, SettingsPatch};
pub use user::{Principal, User};

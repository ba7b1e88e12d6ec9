//! Notification pipeline.
//!
//! - [`settings`] - per-user opt-in flags
//! - [`dispatcher`] - new product fan-out: one delivery task per subscriber
//! - [`delivery`] - a single new product delivery (inbox record + email)
//! - [`status`] - inline order status notice
//! - [`inbox`] - reading and acknowledging stored notifications

pub mod delivery;
pub mod dispatcher;
pub mod inbox;
pub mod settings;
pub mod status;

pub use delivery::{DeliveryError, DeliveryOutcome, DeliveryWorker};
pub use dispatcher::{
    CHUNK_SIZE, DispatchError, FanOutDispatcher, FanOutPlan, FanOutReport, PlannedDelivery,
    STAGGER, plan_fan_out,
};
pub use inbox::{InboxError, InboxService};
pub use settings::{SettingsError, SettingsService};
pub use status::{StatusNotice, StatusNotifier};

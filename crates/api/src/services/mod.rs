//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Order placement, status changes and full updates
//! - `catalog` - Product management; queues the new product fan-out
//! - `notifications` - Settings, fan-out, delivery and status notices
//! - `queue` - Durable tasks and the job runner
//! - `email` - Transactional email (SMTP or log-only)
//! - `password_reset` - Emailed reset links

pub mod catalog;
pub mod email;
pub mod notifications;
pub mod orders;
pub mod password_reset;
pub mod queue;

pub use catalog::{CatalogError, CatalogService};
pub use email::{EmailService, LogMailer, MailMessage, Mailer, mailer_from_config};
pub use orders::{OrderError, OrderService};
pub use password_reset::{PasswordResetError, PasswordResetService, hash_password};

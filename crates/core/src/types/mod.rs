//! Core types for Orchard.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod email;
pub mod id;
pub mod price;
pub mod status;
pub mod stock;

pub use address::{AddressError, DeliveryAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{Price, PriceError};
pub use status::*;
pub use stock::{Quantity, QuantityError, StockError, StockLevel};

//! Orchard Core - Shared domain types.
//!
//! This crate provides the types shared by every Orchard component:
//! - `api` - HTTP service and background job runner
//! - `cli` - Command-line tools for migrations, seeding and workers
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Invariants that must hold no matter which store
//! backs the service (non-negative stock, positive quantities, non-negative
//! prices) are enforced here.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, quantities, stock levels, emails, statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

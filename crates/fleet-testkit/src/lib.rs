//! Test support for the fleet engine
//!
//! - [`InMemoryFleet`]: a full in-memory [`fleet_client::FleetClient`] with
//!   provider-style ids, cursor pagination, metadata merge semantics, a
//!   mutation counter for dry-run assertions, and injectable failures
//! - [`fixtures`]: ready-made fleet configurations

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod fixtures;
mod memory;

pub use memory::InMemoryFleet;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Three-way merge between desired, last-applied, and live state
//!
//! The decision core of the reconciler:
//!
//! - [`AppliedSnapshot`]: the per-agent baseline, stored in agent metadata
//!   under [`SNAPSHOT_KEY`] after each fully-successful apply
//! - [`ClassState`]: name → content-hash view of one resource class
//! - [`plan`]: pure three-way merge producing [`MergePlan`] decisions
//!   (ADD / UPDATE / KEEP / REMOVE, plus a drift conflict flag)
//!
//! Everything here is side-effect free; the apply layer executes plans.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod engine;
mod error;
mod snapshot;

pub use engine::{plan, ClassState, Decision, MergeEntry, MergePlan};
pub use error::MergeError;
pub use snapshot::{AppliedSnapshot, SNAPSHOT_KEY};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

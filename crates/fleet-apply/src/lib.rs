//! Fleet reconciliation driver
//!
//! The operational layer on top of the merge engine:
//!
//! - [`Reconciler`]: applies a [`fleet_spec::FleetConfig`] to the live
//!   fleet — create, three-way update, dry-run, template mode, and
//!   baseline recalibration
//! - [`CanaryMetadata`] and the canary deploy / promote / cleanup lifecycle
//! - [`broadcast`]: bounded-concurrency message fan-out with timeouts and
//!   fire-and-forget dispatch
//! - [`fleet_overview`], [`shared_usage`], [`orphaned`]: read-only reports
//! - [`telemetry::init`]: tracing subscriber setup for embedding binaries
//!
//! Per-agent failures are isolated inside the [`ApplyReport`]; only fatal
//! transport failures abort a running queue.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod bulk;
mod canary;
mod error;
mod options;
mod outcome;
mod reconcile;
mod report;
pub mod telemetry;

pub use bulk::{broadcast, BroadcastOptions, BULK_CONCURRENCY, DEFAULT_SEND_TIMEOUT};
pub use canary::{CanaryMetadata, CANARY_KEY};
pub use error::ApplyError;
pub use options::{ApplyOptions, DEFAULT_CANARY_PREFIX};
pub use outcome::{AgentOutcome, AgentReport, ApplyReport, ClassPlan};
pub use reconcile::{Reconciler, ResourceClass};
pub use report::{
    fleet_overview, orphaned, shared_usage, AgentOverview, OrphanReport, ResourceUsage,
    SharedUsage,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

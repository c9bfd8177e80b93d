//! Fleet configuration model
//!
//! Resolved, immutable desired-state types for the reconciliation engine:
//!
//! - [`FleetConfig`]: root value (shared resources + agent specs)
//! - [`AgentSpec`]: desired state for one agent
//! - [`MemoryBlockSpec`]: memory block with the `agent_owned` ownership flag
//! - [`ContentHash`]: SHA-256 identity for syncable sub-resource content
//!
//! The external loader parses and validates raw YAML/JSON and resolves every
//! content source; this crate only models the result.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod agent;
mod config;
mod content;
mod error;
mod hash;
mod name;

pub use agent::{AgentSpec, MemoryBlockSpec, ModelParams, ToolRef, ToolSpec};
pub use config::{FleetConfig, FolderFile, SharedBlockSpec, SharedFolderSpec, SharedResource};
pub use content::ResolvedContent;
pub use error::SpecError;
pub use hash::{ContentHash, HashError};
pub use name::{AgentName, Tag};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Fleet client contract
//!
//! The interface boundary between the reconciliation engine and the remote
//! agent-hosting service:
//!
//! - [`FleetClient`]: async CRUD trait for agents, blocks, tools and folders
//! - [`RemoteAgent`] and friends: live-state views, fetched fresh per apply
//! - [`Page`] / [`PAGE_SIZE`]: cursor pagination for list operations
//! - [`ClientConfig`]: base URL and credentials from the environment
//! - [`ClientError`]: per-resource vs fatal transport error taxonomy
//!
//! Transport-level HTTP and auth are an external concern; the engine only
//! ever holds a `dyn FleetClient`.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod client;
mod config;
mod error;
mod types;

pub use client::FleetClient;
pub use config::{ClientConfig, API_KEY_VAR, BASE_URL_VAR};
pub use error::ClientError;
pub use types::{
    AgentFilter, CreateAgent, CreateBlock, CreateFolder, CreateTool, Page, RemoteAgent,
    RemoteBlock, RemoteFolder, RemoteTool, ResourceId, PAGE_SIZE,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

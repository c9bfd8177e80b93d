//! The `FleetClient` contract
//!
//! Every reconciliation decision is executed through this trait; the engine
//! performs no I/O of its own. Implementations are expected to be HTTP
//! clients against the agent-hosting service, but the engine only sees the
//! trait object.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{
    AgentFilter, CreateAgent, CreateBlock, CreateFolder, CreateTool, Page, RemoteAgent,
    RemoteBlock, RemoteFolder, RemoteTool, ResourceId,
};

/// Async CRUD operations against the remote agent-hosting service
///
/// Resources are keyed by provider-assigned [`ResourceId`] once created and
/// by name for lookup. List operations use cursor pagination with a logical
/// page size of [`crate::PAGE_SIZE`].
#[async_trait]
pub trait FleetClient: Send + Sync {
    // ---- agents ----

    /// Create an agent
    async fn create_agent(&self, req: CreateAgent) -> Result<RemoteAgent, ClientError>;

    /// Fetch an agent with its attached sub-resources
    async fn get_agent(&self, id: &ResourceId) -> Result<RemoteAgent, ClientError>;

    /// Look up an agent by exact name
    async fn find_agent_by_name(&self, name: &str) -> Result<Option<RemoteAgent>, ClientError>;

    /// List agents matching a server-side filter
    async fn list_agents(
        &self,
        filter: &AgentFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteAgent>, ClientError>;

    /// Replace one key of the agent's opaque metadata object
    ///
    /// Sibling keys are preserved. Passing `Value::Null` clears the key.
    async fn update_agent_metadata(
        &self,
        id: &ResourceId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ClientError>;

    /// Delete an agent
    async fn delete_agent(&self, id: &ResourceId) -> Result<(), ClientError>;

    /// Send a message to an agent
    async fn send_message(&self, id: &ResourceId, text: &str) -> Result<(), ClientError>;

    // ---- blocks ----

    /// Create a standalone block
    async fn create_block(&self, req: CreateBlock) -> Result<RemoteBlock, ClientError>;

    /// Look up a standalone block by name
    async fn find_block_by_name(&self, name: &str) -> Result<Option<RemoteBlock>, ClientError>;

    /// Replace a block's content
    async fn update_block(&self, id: &ResourceId, value: &str) -> Result<(), ClientError>;

    /// Delete a block
    async fn delete_block(&self, id: &ResourceId) -> Result<(), ClientError>;

    /// Attach a block to an agent
    async fn attach_block(&self, agent: &ResourceId, block: &ResourceId)
        -> Result<(), ClientError>;

    /// Detach a block from an agent
    async fn detach_block(&self, agent: &ResourceId, block: &ResourceId)
        -> Result<(), ClientError>;

    /// List standalone blocks
    async fn list_blocks(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteBlock>, ClientError>;

    // ---- tools ----

    /// Register a tool
    async fn create_tool(&self, req: CreateTool) -> Result<RemoteTool, ClientError>;

    /// Look up a tool by name
    async fn find_tool_by_name(&self, name: &str) -> Result<Option<RemoteTool>, ClientError>;

    /// Replace a tool's source code
    async fn update_tool(&self, id: &ResourceId, source_code: &str) -> Result<(), ClientError>;

    /// Delete a tool
    async fn delete_tool(&self, id: &ResourceId) -> Result<(), ClientError>;

    /// Attach a tool to an agent
    async fn attach_tool(&self, agent: &ResourceId, tool: &ResourceId) -> Result<(), ClientError>;

    /// Detach a tool from an agent
    async fn detach_tool(&self, agent: &ResourceId, tool: &ResourceId) -> Result<(), ClientError>;

    /// List registered tools
    async fn list_tools(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteTool>, ClientError>;

    // ---- folders ----

    /// Create a folder
    async fn create_folder(&self, req: CreateFolder) -> Result<RemoteFolder, ClientError>;

    /// Look up a folder by name
    async fn find_folder_by_name(&self, name: &str) -> Result<Option<RemoteFolder>, ClientError>;

    /// Replace a folder's file set
    async fn update_folder(
        &self,
        id: &ResourceId,
        file_hashes: std::collections::BTreeMap<String, fleet_spec::ContentHash>,
    ) -> Result<(), ClientError>;

    /// Delete a folder
    async fn delete_folder(&self, id: &ResourceId) -> Result<(), ClientError>;

    /// Attach a folder to an agent
    async fn attach_folder(&self, agent: &ResourceId, folder: &ResourceId)
        -> Result<(), ClientError>;

    /// Detach a folder from an agent
    async fn detach_folder(&self, agent: &ResourceId, folder: &ResourceId)
        -> Result<(), ClientError>;

    /// List folders
    async fn list_folders(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteFolder>, ClientError>;
}

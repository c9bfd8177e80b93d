//! In-memory `FleetClient`
//!
//! A faithful stand-in for the remote service: provider-assigned ids,
//! cursor-paginated listings in creation order, metadata merge semantics,
//! and injectable failures. Every mutating trait call bumps a counter so
//! dry-run tests can assert that nothing was written.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use fleet_client::{
    AgentFilter, ClientError, CreateAgent, CreateBlock, CreateFolder, CreateTool, FleetClient,
    Page, RemoteAgent, RemoteBlock, RemoteFolder, RemoteTool, ResourceId, PAGE_SIZE,
};
use fleet_spec::{ContentHash, Tag};

#[derive(Debug, Clone)]
struct AgentRecord {
    seq: u64,
    id: ResourceId,
    name: String,
    tags: Vec<Tag>,
    metadata: serde_json::Value,
    block_ids: Vec<ResourceId>,
    tool_ids: Vec<ResourceId>,
    folder_ids: Vec<ResourceId>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Row<T> {
    seq: u64,
    item: T,
}

/// In-memory fleet service
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    agents: DashMap<ResourceId, AgentRecord>,
    blocks: DashMap<ResourceId, Row<RemoteBlock>>,
    tools: DashMap<ResourceId, Row<RemoteTool>>,
    folders: DashMap<ResourceId, Row<RemoteFolder>>,
    seq: AtomicU64,
    page_size: AtomicUsize,
    mutations: AtomicUsize,
    sent_messages: Mutex<Vec<(String, String)>>,
    fail_messages_to: DashSet<String>,
    fail_block_updates: DashSet<String>,
    fail_all_transport: DashSet<&'static str>,
}

impl InMemoryFleet {
    /// Create an empty fleet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn new_id(prefix: &str) -> ResourceId {
        ResourceId(format!("{prefix}-{}", Uuid::new_v4()))
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    fn effective_page_size(&self, limit: usize) -> usize {
        let configured = self.page_size.load(Ordering::Relaxed);
        let cap = if configured == 0 { PAGE_SIZE } else { configured };
        limit.min(cap).max(1)
    }

    /// Mutating trait calls observed so far
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::Relaxed)
    }

    /// Messages delivered via `send_message`, as (agent name, text)
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Cap listing pages at `n` items (exercises cursor pagination)
    pub fn set_page_size(&self, n: usize) {
        self.page_size.store(n, Ordering::Relaxed);
    }

    /// Make `send_message` to the named agent fail with a transport error
    pub fn fail_messages_to(&self, agent_name: impl Into<String>) {
        self.fail_messages_to.insert(agent_name.into());
    }

    /// Make `update_block` on the named block fail with an API error
    pub fn fail_block_updates(&self, block_name: impl Into<String>) {
        self.fail_block_updates.insert(block_name.into());
    }

    /// Make every call fail with a transport error (service down)
    pub fn go_offline(&self) {
        self.fail_all_transport.insert("offline");
    }

    fn check_online(&self) -> Result<(), ClientError> {
        if self.fail_all_transport.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Transport("service unavailable".to_string()))
        }
    }

    /// Seed an agent directly, bypassing the mutation counter
    pub async fn seed_agent(&self, name: impl Into<String>, tags: Vec<Tag>) -> RemoteAgent {
        let id = Self::new_id("agent");
        let record = AgentRecord {
            seq: self.next_seq(),
            id: id.clone(),
            name: name.into(),
            tags,
            metadata: serde_json::json!({}),
            block_ids: Vec::new(),
            tool_ids: Vec::new(),
            folder_ids: Vec::new(),
            created_at: Utc::now(),
        };
        let view = self.view(&record);
        self.agents.insert(id, record);
        view
    }

    /// Seed a standalone block directly, bypassing the mutation counter
    pub async fn seed_block(&self, name: impl Into<String>, value: impl Into<String>) -> RemoteBlock {
        let id = Self::new_id("block");
        let block = RemoteBlock {
            id: id.clone(),
            name: name.into(),
            value: value.into(),
            description: String::new(),
            limit: 20_000,
        };
        self.blocks.insert(
            id,
            Row {
                seq: self.next_seq(),
                item: block.clone(),
            },
        );
        block
    }

    /// Seed a registered tool directly, bypassing the mutation counter
    pub async fn seed_tool(&self, name: impl Into<String>, source: impl Into<String>) -> RemoteTool {
        let id = Self::new_id("tool");
        let tool = RemoteTool {
            id: id.clone(),
            name: name.into(),
            source_code: Some(source.into()),
        };
        self.tools.insert(
            id,
            Row {
                seq: self.next_seq(),
                item: tool.clone(),
            },
        );
        tool
    }

    /// Attach an already-seeded block to an already-seeded agent
    pub async fn seed_attach_block(&self, agent: &ResourceId, block: &ResourceId) {
        if let Some(mut record) = self.agents.get_mut(agent) {
            record.block_ids.push(block.clone());
        }
    }

    /// Attach an already-seeded tool to an already-seeded agent
    pub async fn seed_attach_tool(&self, agent: &ResourceId, tool: &ResourceId) {
        if let Some(mut record) = self.agents.get_mut(agent) {
            record.tool_ids.push(tool.clone());
        }
    }

    /// Overwrite one metadata key directly, bypassing the mutation counter
    pub async fn seed_metadata(&self, agent: &ResourceId, key: &str, value: serde_json::Value) {
        if let Some(mut record) = self.agents.get_mut(agent) {
            merge_metadata(&mut record.metadata, key, value);
        }
    }

    fn view(&self, record: &AgentRecord) -> RemoteAgent {
        RemoteAgent {
            id: record.id.clone(),
            name: record.name.clone(),
            tags: record.tags.clone(),
            metadata: record.metadata.clone(),
            blocks: record
                .block_ids
                .iter()
                .filter_map(|id| self.blocks.get(id).map(|r| r.item.clone()))
                .collect(),
            tools: record
                .tool_ids
                .iter()
                .filter_map(|id| self.tools.get(id).map(|r| r.item.clone()))
                .collect(),
            folders: record
                .folder_ids
                .iter()
                .filter_map(|id| self.folders.get(id).map(|r| r.item.clone()))
                .collect(),
            created_at: record.created_at,
        }
    }
}

fn merge_metadata(metadata: &mut serde_json::Value, key: &str, value: serde_json::Value) {
    if !metadata.is_object() {
        *metadata = serde_json::json!({});
    }
    if let Some(object) = metadata.as_object_mut() {
        if value.is_null() {
            object.remove(key);
        } else {
            object.insert(key.to_string(), value);
        }
    }
}

/// Creation-order cursor pagination shared by every list endpoint
fn paginate<T: Clone>(
    mut rows: Vec<(u64, String, T)>,
    cursor: Option<String>,
    limit: usize,
) -> Page<T> {
    rows.sort_by_key(|(seq, _, _)| *seq);
    let start = match cursor {
        Some(cursor) => rows
            .iter()
            .position(|(_, id, _)| *id == cursor)
            .map_or(rows.len(), |i| i + 1),
        None => 0,
    };
    let window = &rows[start..];
    let items: Vec<T> = window.iter().take(limit).map(|(_, _, t)| t.clone()).collect();
    let next_cursor = if window.len() > limit {
        window.get(limit - 1).map(|(_, id, _)| id.clone())
    } else {
        None
    };
    Page { items, next_cursor }
}

#[async_trait]
impl FleetClient for InMemoryFleet {
    async fn create_agent(&self, req: CreateAgent) -> Result<RemoteAgent, ClientError> {
        self.check_online()?;
        self.bump();
        let id = Self::new_id("agent");
        let record = AgentRecord {
            seq: self.next_seq(),
            id: id.clone(),
            name: req.name,
            tags: req.tags,
            metadata: req.metadata,
            block_ids: Vec::new(),
            tool_ids: Vec::new(),
            folder_ids: Vec::new(),
            created_at: Utc::now(),
        };
        let view = self.view(&record);
        self.agents.insert(id, record);
        Ok(view)
    }

    async fn get_agent(&self, id: &ResourceId) -> Result<RemoteAgent, ClientError> {
        self.check_online()?;
        let record = self
            .agents
            .get(id)
            .ok_or_else(|| ClientError::not_found("agent", id.as_str()))?;
        Ok(self.view(&record))
    }

    async fn find_agent_by_name(&self, name: &str) -> Result<Option<RemoteAgent>, ClientError> {
        self.check_online()?;
        let mut hits: Vec<AgentRecord> = self
            .agents
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.value().clone())
            .collect();
        hits.sort_by_key(|r| r.seq);
        Ok(hits.first().map(|r| self.view(r)))
    }

    async fn list_agents(
        &self,
        filter: &AgentFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteAgent>, ClientError> {
        self.check_online()?;
        let rows = self
            .agents
            .iter()
            .filter(|r| filter.name.as_ref().map_or(true, |n| r.name == *n))
            .filter(|r| filter.tags.iter().all(|t| r.tags.contains(t)))
            .map(|r| (r.seq, r.id.0.clone(), self.view(&r)))
            .collect();
        Ok(paginate(rows, cursor, self.effective_page_size(limit)))
    }

    async fn update_agent_metadata(
        &self,
        id: &ResourceId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut record = self
            .agents
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found("agent", id.as_str()))?;
        merge_metadata(&mut record.metadata, key, value);
        Ok(())
    }

    async fn delete_agent(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        self.agents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("agent", id.as_str()))
    }

    async fn send_message(&self, id: &ResourceId, text: &str) -> Result<(), ClientError> {
        self.check_online()?;
        let record = self
            .agents
            .get(id)
            .ok_or_else(|| ClientError::not_found("agent", id.as_str()))?;
        if self.fail_messages_to.contains(&record.name) {
            return Err(ClientError::Transport(format!(
                "message delivery to {} failed",
                record.name
            )));
        }
        if let Ok(mut messages) = self.sent_messages.lock() {
            messages.push((record.name.clone(), text.to_string()));
        }
        Ok(())
    }

    async fn create_block(&self, req: CreateBlock) -> Result<RemoteBlock, ClientError> {
        self.check_online()?;
        self.bump();
        let id = Self::new_id("block");
        let block = RemoteBlock {
            id: id.clone(),
            name: req.name,
            value: req.value,
            description: req.description,
            limit: req.limit,
        };
        self.blocks.insert(
            id,
            Row {
                seq: self.next_seq(),
                item: block.clone(),
            },
        );
        Ok(block)
    }

    async fn find_block_by_name(&self, name: &str) -> Result<Option<RemoteBlock>, ClientError> {
        self.check_online()?;
        let mut hits: Vec<Row<RemoteBlock>> = self
            .blocks
            .iter()
            .filter(|r| r.item.name == name)
            .map(|r| r.value().clone())
            .collect();
        hits.sort_by_key(|r| r.seq);
        Ok(hits.into_iter().next().map(|r| r.item))
    }

    async fn update_block(&self, id: &ResourceId, value: &str) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut row = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found("block", id.as_str()))?;
        if self.fail_block_updates.contains(&row.item.name) {
            return Err(ClientError::Api {
                status: 500,
                message: format!("injected failure updating block {}", row.item.name),
            });
        }
        row.item.value = value.to_string();
        Ok(())
    }

    async fn delete_block(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        self.blocks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("block", id.as_str()))
    }

    async fn attach_block(
        &self,
        agent: &ResourceId,
        block: &ResourceId,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        if !self.blocks.contains_key(block) {
            return Err(ClientError::not_found("block", block.as_str()));
        }
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        if !record.block_ids.contains(block) {
            record.block_ids.push(block.clone());
        }
        Ok(())
    }

    async fn detach_block(
        &self,
        agent: &ResourceId,
        block: &ResourceId,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        record.block_ids.retain(|id| id != block);
        Ok(())
    }

    async fn list_blocks(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteBlock>, ClientError> {
        self.check_online()?;
        let rows = self
            .blocks
            .iter()
            .map(|r| (r.seq, r.item.id.0.clone(), r.item.clone()))
            .collect();
        Ok(paginate(rows, cursor, self.effective_page_size(limit)))
    }

    async fn create_tool(&self, req: CreateTool) -> Result<RemoteTool, ClientError> {
        self.check_online()?;
        self.bump();
        let id = Self::new_id("tool");
        let tool = RemoteTool {
            id: id.clone(),
            name: req.name,
            source_code: Some(req.source_code),
        };
        self.tools.insert(
            id,
            Row {
                seq: self.next_seq(),
                item: tool.clone(),
            },
        );
        Ok(tool)
    }

    async fn find_tool_by_name(&self, name: &str) -> Result<Option<RemoteTool>, ClientError> {
        self.check_online()?;
        let mut hits: Vec<Row<RemoteTool>> = self
            .tools
            .iter()
            .filter(|r| r.item.name == name)
            .map(|r| r.value().clone())
            .collect();
        hits.sort_by_key(|r| r.seq);
        Ok(hits.into_iter().next().map(|r| r.item))
    }

    async fn update_tool(&self, id: &ResourceId, source_code: &str) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut row = self
            .tools
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found("tool", id.as_str()))?;
        row.item.source_code = Some(source_code.to_string());
        Ok(())
    }

    async fn delete_tool(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        self.tools
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("tool", id.as_str()))
    }

    async fn attach_tool(&self, agent: &ResourceId, tool: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        if !self.tools.contains_key(tool) {
            return Err(ClientError::not_found("tool", tool.as_str()));
        }
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        if !record.tool_ids.contains(tool) {
            record.tool_ids.push(tool.clone());
        }
        Ok(())
    }

    async fn detach_tool(&self, agent: &ResourceId, tool: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        record.tool_ids.retain(|id| id != tool);
        Ok(())
    }

    async fn list_tools(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteTool>, ClientError> {
        self.check_online()?;
        let rows = self
            .tools
            .iter()
            .map(|r| (r.seq, r.item.id.0.clone(), r.item.clone()))
            .collect();
        Ok(paginate(rows, cursor, self.effective_page_size(limit)))
    }

    async fn create_folder(&self, req: CreateFolder) -> Result<RemoteFolder, ClientError> {
        self.check_online()?;
        self.bump();
        let id = Self::new_id("folder");
        let folder = RemoteFolder {
            id: id.clone(),
            name: req.name,
            file_hashes: req.file_hashes,
        };
        self.folders.insert(
            id,
            Row {
                seq: self.next_seq(),
                item: folder.clone(),
            },
        );
        Ok(folder)
    }

    async fn find_folder_by_name(&self, name: &str) -> Result<Option<RemoteFolder>, ClientError> {
        self.check_online()?;
        let mut hits: Vec<Row<RemoteFolder>> = self
            .folders
            .iter()
            .filter(|r| r.item.name == name)
            .map(|r| r.value().clone())
            .collect();
        hits.sort_by_key(|r| r.seq);
        Ok(hits.into_iter().next().map(|r| r.item))
    }

    async fn update_folder(
        &self,
        id: &ResourceId,
        file_hashes: BTreeMap<String, ContentHash>,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut row = self
            .folders
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found("folder", id.as_str()))?;
        row.item.file_hashes = file_hashes;
        Ok(())
    }

    async fn delete_folder(&self, id: &ResourceId) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        self.folders
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("folder", id.as_str()))
    }

    async fn attach_folder(
        &self,
        agent: &ResourceId,
        folder: &ResourceId,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        if !self.folders.contains_key(folder) {
            return Err(ClientError::not_found("folder", folder.as_str()));
        }
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        if !record.folder_ids.contains(folder) {
            record.folder_ids.push(folder.clone());
        }
        Ok(())
    }

    async fn detach_folder(
        &self,
        agent: &ResourceId,
        folder: &ResourceId,
    ) -> Result<(), ClientError> {
        self.check_online()?;
        self.bump();
        let mut record = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| ClientError::not_found("agent", agent.as_str()))?;
        record.folder_ids.retain(|id| id != folder);
        Ok(())
    }

    async fn list_folders(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<Page<RemoteFolder>, ClientError> {
        self.check_online()?;
        let rows = self
            .folders
            .iter()
            .map(|r| (r.seq, r.item.id.0.clone(), r.item.clone()))
            .collect();
        Ok(paginate(rows, cursor, self.effective_page_size(limit)))
    }
}

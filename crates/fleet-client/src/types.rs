//! Remote resource types
//!
//! Live-state views of agents, blocks, tools and folders as the remote
//! service reports them. Live state is fetched fresh on every apply and is
//! never cached across applies.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_spec::{ContentHash, Tag};

/// Logical page size for list operations
pub const PAGE_SIZE: usize = 1000;

/// Provider-assigned resource identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Get the id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One page of a cursor-paginated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Cursor for the next page, if any
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A page with no items and no continuation
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Whether another page follows
    #[inline]
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Server-side list filter for agents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFilter {
    /// Exact name match
    pub name: Option<String>,
    /// Tags the agent must carry (AND logic)
    pub tags: Vec<Tag>,
}

impl AgentFilter {
    /// Filter matching every agent
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter by exact name
    #[inline]
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            tags: Vec::new(),
        }
    }

    /// Filter by required tags
    #[inline]
    #[must_use]
    pub fn by_tags(tags: Vec<Tag>) -> Self {
        Self { name: None, tags }
    }
}

/// Live memory block attached to an agent (or standalone)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBlock {
    /// Provider-assigned id
    pub id: ResourceId,
    /// Block name (label)
    pub name: String,
    /// Current content
    pub value: String,
    /// Description
    pub description: String,
    /// Content size limit
    pub limit: usize,
}

impl RemoteBlock {
    /// Identity hash of the current content
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.value.as_bytes())
    }
}

/// Live tool registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTool {
    /// Provider-assigned id
    pub id: ResourceId,
    /// Tool name
    pub name: String,
    /// Tool source, when the server exposes it
    pub source_code: Option<String>,
}

impl RemoteTool {
    /// Identity hash of the current source, if available
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.source_code
            .as_deref()
            .map(|src| ContentHash::compute(src.as_bytes()))
    }
}

/// Live folder (named file set)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// Provider-assigned id
    pub id: ResourceId,
    /// Folder name
    pub name: String,
    /// Per-file content hashes
    pub file_hashes: BTreeMap<String, ContentHash>,
}

impl RemoteFolder {
    /// Identity hash over the folder's file list
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute_file_set(
            self.file_hashes.iter().map(|(name, hash)| (name.as_str(), *hash)),
        )
    }
}

/// Live agent state, including currently-attached sub-resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgent {
    /// Provider-assigned id
    pub id: ResourceId,
    /// Agent name
    pub name: String,
    /// Tags on the agent
    pub tags: Vec<Tag>,
    /// Opaque metadata object (snapshot and canary records live here)
    pub metadata: serde_json::Value,
    /// Attached memory blocks (per-agent and shared)
    pub blocks: Vec<RemoteBlock>,
    /// Attached tools
    pub tools: Vec<RemoteTool>,
    /// Attached folders
    pub folders: Vec<RemoteFolder>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl RemoteAgent {
    /// Whether the agent carries every given tag
    #[must_use]
    pub fn has_all_tags(&self, tags: &[Tag]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }

    /// Look up an attached block by name
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&RemoteBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Look up an attached tool by name
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&RemoteTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Look up an attached folder by name
    #[must_use]
    pub fn folder(&self, name: &str) -> Option<&RemoteFolder> {
        self.folders.iter().find(|f| f.name == name)
    }

    /// Read a metadata value under a well-known key
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// Agent creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgent {
    /// Agent name
    pub name: String,
    /// System prompt
    pub system: String,
    /// Model handle
    pub model: String,
    /// Embedding handle
    pub embedding: String,
    /// Tags
    pub tags: Vec<Tag>,
    /// Initial opaque metadata object
    pub metadata: serde_json::Value,
}

/// Block creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlock {
    /// Block name (label)
    pub name: String,
    /// Initial content
    pub value: String,
    /// Description
    pub description: String,
    /// Content size limit
    pub limit: usize,
}

/// Tool creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTool {
    /// Tool name
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// Tool source code
    pub source_code: String,
    /// JSON schema of the parameters
    pub parameters: serde_json::Value,
}

/// Folder creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolder {
    /// Folder name
    pub name: String,
    /// Per-file content hashes
    pub file_hashes: BTreeMap<String, ContentHash>,
}

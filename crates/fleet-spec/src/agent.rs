//! Agent specifications
//!
//! Defines the desired state for a single agent:
//! - prompt and model parameters
//! - memory blocks with the `agent_owned` ownership flag
//! - shared resource references (by name, never duplicated)
//! - tool references (by name, inline definition, or glob)
//! - tags and an optional first message

use serde::{Deserialize, Serialize};

use crate::content::ResolvedContent;
use crate::hash::ContentHash;
use crate::name::{AgentName, Tag};

/// Model and context parameters for an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Model handle (e.g. `anthropic/claude-sonnet-4-5`)
    pub model: String,
    /// Embedding handle
    pub embedding: String,
    /// Context window override
    pub context_window: Option<u32>,
}

impl ModelParams {
    /// Create model parameters
    #[inline]
    #[must_use]
    pub fn new(model: impl Into<String>, embedding: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            embedding: embedding.into(),
            context_window: None,
        }
    }
}

/// Desired state of one memory block
///
/// `agent_owned` is the central ownership invariant: when true, the live
/// value is authoritative and the engine only creates the block if absent;
/// when false, desired content is authoritative and is resynced on every
/// apply. Flipping owned to unowned resyncs content on the next apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlockSpec {
    /// Block name (label)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Maximum content size in bytes
    pub limit: usize,
    /// Initial / synced content
    pub value: ResolvedContent,
    /// Whether the running agent owns this block's value
    pub agent_owned: bool,
}

impl MemoryBlockSpec {
    /// Create a config-managed (synced) block
    #[inline]
    #[must_use]
    pub fn synced(name: impl Into<String>, value: impl Into<ResolvedContent>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            limit: 5000,
            value: value.into(),
            agent_owned: false,
        }
    }

    /// Create an agent-owned block (create-if-absent, never resynced)
    #[inline]
    #[must_use]
    pub fn agent_owned(name: impl Into<String>, value: impl Into<ResolvedContent>) -> Self {
        Self {
            agent_owned: true,
            ..Self::synced(name, value)
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With size limit
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Content identity hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.value.hash()
    }
}

/// Inline tool definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// Resolved tool source code
    pub source_code: ResolvedContent,
    /// JSON schema of the tool parameters
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Create an inline tool definition
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, source_code: impl Into<ResolvedContent>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source_code: source_code.into(),
            parameters: serde_json::Value::Null,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With parameter schema
    #[inline]
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Identity hash over the tool source
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.source_code.hash()
    }
}

/// Reference to a tool in an agent spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRef {
    /// Server-registered tool referenced by name
    Name(String),
    /// Inline tool definition managed by this config
    Inline(ToolSpec),
    /// Glob over server-registered tool names (`*` wildcard)
    Glob(String),
}

/// Desired state for a single agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Unique agent identity within the fleet
    pub name: AgentName,
    /// System prompt content
    pub system_prompt: ResolvedContent,
    /// Model / context parameters
    pub model: ModelParams,
    /// Per-agent memory blocks
    pub memory_blocks: Vec<MemoryBlockSpec>,
    /// Shared block references (by name)
    pub shared_blocks: Vec<String>,
    /// Shared folder references (by name)
    pub shared_folders: Vec<String>,
    /// Tool references
    pub tools: Vec<ToolRef>,
    /// Tags for bulk targeting
    pub tags: Vec<Tag>,
    /// Message to send once, after creation
    pub first_message: Option<String>,
}

impl AgentSpec {
    /// Create a minimal agent spec
    #[inline]
    #[must_use]
    pub fn new(name: AgentName, model: ModelParams) -> Self {
        Self {
            name,
            system_prompt: ResolvedContent::new(""),
            model,
            memory_blocks: Vec::new(),
            shared_blocks: Vec::new(),
            shared_folders: Vec::new(),
            tools: Vec::new(),
            tags: Vec::new(),
            first_message: None,
        }
    }

    /// With system prompt
    #[inline]
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<ResolvedContent>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// With a memory block
    #[inline]
    #[must_use]
    pub fn with_block(mut self, block: MemoryBlockSpec) -> Self {
        self.memory_blocks.push(block);
        self
    }

    /// With a shared block reference
    #[inline]
    #[must_use]
    pub fn with_shared_block(mut self, name: impl Into<String>) -> Self {
        self.shared_blocks.push(name.into());
        self
    }

    /// With a shared folder reference
    #[inline]
    #[must_use]
    pub fn with_shared_folder(mut self, name: impl Into<String>) -> Self {
        self.shared_folders.push(name.into());
        self
    }

    /// With a tool reference
    #[inline]
    #[must_use]
    pub fn with_tool(mut self, tool: ToolRef) -> Self {
        self.tools.push(tool);
        self
    }

    /// With a tag
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// With a first message
    #[inline]
    #[must_use]
    pub fn with_first_message(mut self, message: impl Into<String>) -> Self {
        self.first_message = Some(message.into());
        self
    }

    /// Rename the spec, keeping everything else (canary derivation)
    #[inline]
    #[must_use]
    pub fn renamed(mut self, name: AgentName) -> Self {
        self.name = name;
        self
    }

    /// Whether the agent carries a given tag
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AgentName {
        AgentName::new(s).unwrap()
    }

    fn params() -> ModelParams {
        ModelParams::new("anthropic/claude-sonnet-4-5", "openai/text-embedding-3-small")
    }

    #[test]
    fn agent_spec_builder() {
        let spec = AgentSpec::new(name("support"), params())
            .with_system_prompt("You are a support agent.")
            .with_block(MemoryBlockSpec::agent_owned("scratchpad", ""))
            .with_shared_block("kb")
            .with_tool(ToolRef::Name("web_search".to_string()))
            .with_tag(Tag::new("tenant", "acme"))
            .with_first_message("Introduce yourself");

        assert_eq!(spec.name.as_str(), "support");
        assert_eq!(spec.memory_blocks.len(), 1);
        assert!(spec.memory_blocks[0].agent_owned);
        assert_eq!(spec.shared_blocks, vec!["kb"]);
        assert!(spec.has_tag(&Tag::new("tenant", "acme")));
        assert!(spec.first_message.is_some());
    }

    #[test]
    fn renamed_keeps_resources() {
        let spec = AgentSpec::new(name("prod"), params()).with_shared_block("kb");
        let canary = spec.clone().renamed(name("CANARY-prod"));

        assert_eq!(canary.name.as_str(), "CANARY-prod");
        assert_eq!(canary.shared_blocks, spec.shared_blocks);
    }

    #[test]
    fn block_ownership_constructors() {
        let synced = MemoryBlockSpec::synced("persona", "I am helpful");
        let owned = MemoryBlockSpec::agent_owned("notes", "");

        assert!(!synced.agent_owned);
        assert!(owned.agent_owned);
    }

    #[test]
    fn tool_spec_hash_tracks_source() {
        let a = ToolSpec::new("search", "def search(): ...");
        let b = ToolSpec::new("search", "def search(): pass");
        assert_ne!(a.hash(), b.hash());
    }
}

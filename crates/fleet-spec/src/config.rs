//! Root fleet configuration
//!
//! A [`FleetConfig`] is produced fully resolved by the external config
//! loader and is immutable for the lifetime of one apply invocation.

use serde::{Deserialize, Serialize};

use crate::agent::AgentSpec;
use crate::content::ResolvedContent;
use crate::error::SpecError;
use crate::hash::ContentHash;

/// Shared memory block definition
///
/// Referenced by name from agent specs; a single remote object is shared by
/// every referencing agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedBlockSpec {
    /// Block name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Maximum content size in bytes
    pub limit: usize,
    /// Synced content
    pub value: ResolvedContent,
}

impl SharedBlockSpec {
    /// Create a shared block definition
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<ResolvedContent>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            limit: 20_000,
            value: value.into(),
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Content identity hash
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.value.hash()
    }
}

/// One file inside a shared folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderFile {
    /// File name within the folder
    pub name: String,
    /// Resolved file content
    pub content: ResolvedContent,
}

impl FolderFile {
    /// Create a folder file entry
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<ResolvedContent>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Shared folder definition (a named set of files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFolderSpec {
    /// Folder name
    pub name: String,
    /// Files in the folder
    pub files: Vec<FolderFile>,
}

impl SharedFolderSpec {
    /// Create a shared folder definition
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, files: Vec<FolderFile>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// Identity hash over the sorted (name, content-hash) file list
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        ContentHash::compute_file_set(
            self.files
                .iter()
                .map(|f| (f.name.as_str(), f.content.hash())),
        )
    }
}

/// A shared resource definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedResource {
    /// Shared memory block
    Block(SharedBlockSpec),
    /// Shared folder
    Folder(SharedFolderSpec),
}

impl SharedResource {
    /// Resource name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SharedResource::Block(b) => &b.name,
            SharedResource::Folder(f) => &f.name,
        }
    }
}

/// Root configuration value: shared resources plus agent specs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Shared resource definitions
    pub shared: Vec<SharedResource>,
    /// Agent specifications
    pub agents: Vec<AgentSpec>,
}

impl FleetConfig {
    /// Build a config, enforcing name uniqueness and reference integrity
    ///
    /// # Errors
    /// Returns [`SpecError`] on duplicate agent/shared names or on an agent
    /// referencing a shared resource the config does not define.
    pub fn new(shared: Vec<SharedResource>, agents: Vec<AgentSpec>) -> Result<Self, SpecError> {
        let config = Self { shared, agents };

        let mut seen = std::collections::HashSet::new();
        for agent in &config.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(SpecError::DuplicateAgent {
                    name: agent.name.to_string(),
                });
            }
        }

        let mut seen_shared = std::collections::HashSet::new();
        for resource in &config.shared {
            if !seen_shared.insert(resource.name()) {
                return Err(SpecError::DuplicateShared {
                    name: resource.name().to_string(),
                });
            }
        }

        for agent in &config.agents {
            for name in &agent.shared_blocks {
                if config.shared_block(name).is_none() {
                    return Err(SpecError::UnknownShared {
                        agent: agent.name.to_string(),
                        kind: "block",
                        name: name.clone(),
                    });
                }
            }
            for name in &agent.shared_folders {
                if config.shared_folder(name).is_none() {
                    return Err(SpecError::UnknownShared {
                        agent: agent.name.to_string(),
                        kind: "folder",
                        name: name.clone(),
                    });
                }
            }
        }

        Ok(config)
    }

    /// Look up a shared block definition by name
    #[must_use]
    pub fn shared_block(&self, name: &str) -> Option<&SharedBlockSpec> {
        self.shared.iter().find_map(|r| match r {
            SharedResource::Block(b) if b.name == name => Some(b),
            _ => None,
        })
    }

    /// Look up a shared folder definition by name
    #[must_use]
    pub fn shared_folder(&self, name: &str) -> Option<&SharedFolderSpec> {
        self.shared.iter().find_map(|r| match r {
            SharedResource::Folder(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Look up an agent spec by name
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name.as_str() == name)
    }
}

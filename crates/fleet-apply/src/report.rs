//! Read-only fleet reports
//!
//! Operator-facing views over live state. None of these mutate anything.

use std::collections::BTreeSet;

use fleet_client::{AgentFilter, FleetClient, RemoteAgent, PAGE_SIZE};
use fleet_merge::AppliedSnapshot;
use fleet_spec::Tag;

use crate::canary::CanaryMetadata;
use crate::error::ApplyError;

/// One agent's row in the fleet overview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOverview {
    /// Agent name
    pub name: String,
    /// A readable last-applied snapshot is present
    pub managed: bool,
    /// A canary record is present
    pub canary: bool,
    /// Tags on the agent
    pub tags: Vec<Tag>,
    /// Attached block count
    pub blocks: usize,
    /// Attached tool count
    pub tools: usize,
    /// Attached folder count
    pub folders: usize,
}

/// A shared resource and the agents referencing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUsage {
    /// Resource name
    pub name: String,
    /// Names of agents the resource is attached to
    pub used_by: Vec<String>,
}

/// Shared blocks and folders with their referencing agents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedUsage {
    /// Standalone blocks
    pub blocks: Vec<ResourceUsage>,
    /// Folders
    pub folders: Vec<ResourceUsage>,
}

/// Resources nothing points at any more
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// Canary agents whose production counterpart is gone
    pub canaries: Vec<String>,
    /// Blocks attached to no agent
    pub blocks: Vec<String>,
    /// Folders attached to no agent
    pub folders: Vec<String>,
}

async fn drain_agents(
    client: &dyn FleetClient,
    filter: &AgentFilter,
) -> Result<Vec<RemoteAgent>, ApplyError> {
    let mut agents = Vec::new();
    let mut cursor = None;
    loop {
        let page = client.list_agents(filter, cursor, PAGE_SIZE).await?;
        agents.extend(page.items);
        cursor = page.next_cursor;
        if cursor.is_none() {
            return Ok(agents);
        }
    }
}

/// List agents (optionally tag-filtered) with managed/unmanaged status
///
/// # Errors
/// Returns [`ApplyError::Client`] when listing fails.
pub async fn fleet_overview(
    client: &dyn FleetClient,
    tags: &[Tag],
) -> Result<Vec<AgentOverview>, ApplyError> {
    let filter = if tags.is_empty() {
        AgentFilter::all()
    } else {
        AgentFilter::by_tags(tags.to_vec())
    };
    let agents = drain_agents(client, &filter).await?;

    Ok(agents
        .into_iter()
        .map(|agent| AgentOverview {
            managed: matches!(AppliedSnapshot::from_metadata(&agent.metadata), Ok(Some(_))),
            canary: CanaryMetadata::from_metadata(&agent.metadata).is_some(),
            name: agent.name,
            tags: agent.tags,
            blocks: agent.blocks.len(),
            tools: agent.tools.len(),
            folders: agent.folders.len(),
        })
        .collect())
}

/// Shared blocks and folders with the agents that reference them
///
/// # Errors
/// Returns [`ApplyError::Client`] when listing fails.
pub async fn shared_usage(client: &dyn FleetClient) -> Result<SharedUsage, ApplyError> {
    let agents = drain_agents(client, &AgentFilter::all()).await?;

    let mut usage = SharedUsage::default();

    let mut cursor = None;
    loop {
        let page = client.list_blocks(cursor, PAGE_SIZE).await?;
        for block in page.items {
            let used_by: Vec<String> = agents
                .iter()
                .filter(|a| a.blocks.iter().any(|b| b.id == block.id))
                .map(|a| a.name.clone())
                .collect();
            usage.blocks.push(ResourceUsage {
                name: block.name,
                used_by,
            });
        }
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    let mut cursor = None;
    loop {
        let page = client.list_folders(cursor, PAGE_SIZE).await?;
        for folder in page.items {
            let used_by: Vec<String> = agents
                .iter()
                .filter(|a| a.folders.iter().any(|f| f.id == folder.id))
                .map(|a| a.name.clone())
                .collect();
            usage.folders.push(ResourceUsage {
                name: folder.name,
                used_by,
            });
        }
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    Ok(usage)
}

/// Canaries without a production counterpart, and unattached blocks/folders
///
/// # Errors
/// Returns [`ApplyError::Client`] when listing fails.
pub async fn orphaned(client: &dyn FleetClient) -> Result<OrphanReport, ApplyError> {
    let agents = drain_agents(client, &AgentFilter::all()).await?;
    let live_names: BTreeSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();

    let mut report = OrphanReport::default();
    for agent in &agents {
        // Retired records count too: a promoted canary whose production
        // later disappears is just as abandoned.
        if let Some(record) = CanaryMetadata::from_metadata(&agent.metadata) {
            if !live_names.contains(record.production_name.as_str()) {
                report.canaries.push(agent.name.clone());
            }
        }
    }

    let usage = shared_usage(client).await?;
    report.blocks = usage
        .blocks
        .into_iter()
        .filter(|u| u.used_by.is_empty())
        .map(|u| u.name)
        .collect();
    report.folders = usage
        .folders
        .into_iter()
        .filter(|u| u.used_by.is_empty())
        .map(|u| u.name)
        .collect();

    Ok(report)
}

//! The apply driver
//!
//! Converges every targeted agent toward its spec. Per agent the driver is
//! sequential: resource classes merge and execute in a fixed dependency
//! order (shared blocks, tools, shared folders, memory blocks), and the
//! fresh last-applied snapshot is persisted only after every class
//! succeeded. Across agents the driver fans out with bounded concurrency.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;

use fleet_client::{
    CreateAgent, CreateBlock, CreateFolder, CreateTool, FleetClient, RemoteAgent, RemoteBlock,
    RemoteFolder, ResourceId, PAGE_SIZE,
};
use fleet_merge::{plan, AppliedSnapshot, ClassState, Decision, MergePlan, SNAPSHOT_KEY};
use fleet_select::{glob_to_regex, resolve, SelectError, Selector};
use fleet_spec::{
    AgentName, AgentSpec, ContentHash, FleetConfig, SharedBlockSpec, SharedFolderSpec, SpecError,
    ToolRef, ToolSpec,
};

use crate::bulk::{run_bounded, DEFAULT_SEND_TIMEOUT};
use crate::error::ApplyError;
use crate::options::ApplyOptions;
use crate::outcome::{AgentOutcome, AgentReport, ApplyReport, ClassPlan};

/// The resource classes of an agent, in apply order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Fleet-wide shared memory blocks
    SharedBlocks,
    /// Attached tools
    Tools,
    /// Fleet-wide shared folders
    SharedFolders,
    /// Per-agent memory blocks
    MemoryBlocks,
}

impl ResourceClass {
    /// Fixed dependency order: shared resources first, agent-local last
    pub const APPLY_ORDER: [ResourceClass; 4] = [
        ResourceClass::SharedBlocks,
        ResourceClass::Tools,
        ResourceClass::SharedFolders,
        ResourceClass::MemoryBlocks,
    ];

    /// Stable lowercase label for logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::SharedBlocks => "shared_blocks",
            ResourceClass::Tools => "tools",
            ResourceClass::SharedFolders => "shared_folders",
            ResourceClass::MemoryBlocks => "memory_blocks",
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool reference resolved against the live registry
///
/// `hash` is present only for inline definitions, which are the only tools
/// whose content this engine manages. `id` is present when the tool already
/// exists server-side.
#[derive(Debug, Clone)]
struct DesiredTool {
    name: String,
    id: Option<ResourceId>,
    hash: Option<ContentHash>,
    inline: Option<ToolSpec>,
}

/// Drives applies, canary deploys, and recalibration for one config
pub struct Reconciler {
    pub(crate) client: Arc<dyn FleetClient>,
    pub(crate) config: FleetConfig,
    pub(crate) options: ApplyOptions,
}

impl Reconciler {
    /// Create a reconciler with default options
    #[must_use]
    pub fn new(client: Arc<dyn FleetClient>, config: FleetConfig) -> Self {
        Self {
            client,
            config,
            options: ApplyOptions::default(),
        }
    }

    /// With apply options
    #[must_use]
    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the invocation the options describe
    ///
    /// # Errors
    /// Returns [`ApplyError`] for invocation-level failures (bad selector,
    /// nothing targeted, fatal transport). Per-agent failures are reported
    /// inside the [`ApplyReport`], not as errors.
    pub async fn run(&self) -> Result<ApplyReport, ApplyError> {
        if self.options.cleanup {
            return self.cleanup_canaries().await;
        }
        if self.options.recalibrate {
            return self.recalibrate().await;
        }
        if self.options.canary {
            return self.deploy_canaries().await;
        }
        if self.options.promote {
            return self.promote_canaries().await;
        }
        if let Some(glob) = self.options.match_pattern.clone() {
            return self.apply_template(&glob).await;
        }
        self.apply_config().await
    }

    /// The config specs this invocation targets
    pub(crate) fn target_specs(&self) -> Result<Vec<AgentSpec>, ApplyError> {
        let specs: Vec<AgentSpec> = match &self.options.agent_pattern {
            None => self.config.agents.clone(),
            Some(glob) => {
                let regex = compile_glob(glob)?;
                self.config
                    .agents
                    .iter()
                    .filter(|a| regex.is_match(a.name.as_str()))
                    .cloned()
                    .collect()
            }
        };
        if specs.is_empty() && self.options.agent_pattern.is_some() {
            return Err(ApplyError::NoTargets {
                selector: format!(
                    "pattern={}",
                    self.options.agent_pattern.as_deref().unwrap_or_default()
                ),
            });
        }
        Ok(specs)
    }

    async fn apply_config(&self) -> Result<ApplyReport, ApplyError> {
        let specs = self.target_specs()?;
        tracing::info!(agents = specs.len(), dry_run = self.options.dry_run, "apply started");

        let report = run_bounded(specs, |s| s.name.to_string(), |spec| async move {
            self.apply_agent(&spec).await
        })
        .await;

        tracing::info!(
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "apply finished"
        );
        Ok(report)
    }

    /// Template mode: one spec, many live identities
    async fn apply_template(&self, glob: &str) -> Result<ApplyReport, ApplyError> {
        let template = self.config.agents.first().ok_or_else(|| ApplyError::NoTargets {
            selector: "config agents".to_string(),
        })?;
        if self.config.agents.len() > 1 {
            tracing::warn!(
                "template mode uses the first config agent; {} others ignored",
                self.config.agents.len() - 1
            );
        }

        let selection = resolve(self.client.as_ref(), &Selector::Pattern(glob.to_string())).await?;
        if selection.is_empty() {
            if selection.fleet_was_empty {
                tracing::warn!("fleet is empty; nothing to match against");
            }
            return Err(ApplyError::NoTargets {
                selector: format!("pattern={glob}"),
            });
        }

        // Live agents may carry names the config charset rejects; those
        // cannot host the template, but they must not sink the rest.
        let mut derived = Vec::with_capacity(selection.agents.len());
        let mut unusable = Vec::new();
        for live in selection.agents {
            match AgentName::new(&live.name) {
                Ok(name) => derived.push((template.clone().renamed(name), live)),
                Err(error) => {
                    unusable.push(failed_report(&live.name, &ApplyError::from(error)));
                }
            }
        }

        let mut report = run_bounded(
            derived,
            |(spec, _)| spec.name.to_string(),
            |(spec, live)| async move {
                match self.update_agent(&spec, &live).await {
                    Ok(report) => Ok(report),
                    Err(error) if error.is_fatal() => Err(error),
                    Err(error) => Ok(failed_report(spec.name.as_str(), &error)),
                }
            },
        )
        .await;
        report.agents.extend(unusable);
        Ok(report)
    }

    /// Apply one spec: create if absent live, otherwise three-way update
    ///
    /// Non-fatal failures become a `Failed` outcome so one agent cannot
    /// sink the rest of the queue; fatal transport failures propagate so
    /// the coordinator can abort the remaining queue.
    pub(crate) async fn apply_agent(&self, spec: &AgentSpec) -> Result<AgentReport, ApplyError> {
        let result = match self.client.find_agent_by_name(spec.name.as_str()).await {
            Ok(None) => self.create_agent(spec).await,
            Ok(Some(live)) => self.update_agent(spec, &live).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(report) => Ok(report),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => Ok(failed_report(spec.name.as_str(), &error)),
        }
    }

    // ---- create path ----

    async fn create_agent(&self, spec: &AgentSpec) -> Result<AgentReport, ApplyError> {
        if self.options.dry_run {
            tracing::info!(agent = %spec.name, "dry-run: would create");
            return Ok(AgentReport::new(spec.name.as_str(), AgentOutcome::Created));
        }

        tracing::info!(agent = %spec.name, "creating");
        let agent = self
            .client
            .create_agent(CreateAgent {
                name: spec.name.to_string(),
                system: spec.system_prompt.as_str().to_string(),
                model: spec.model.model.clone(),
                embedding: spec.model.embedding.clone(),
                tags: spec.tags.clone(),
                metadata: serde_json::json!({}),
            })
            .await?;

        let mut snapshot = AppliedSnapshot::new();

        for name in &spec.shared_blocks {
            let def = self.shared_block_def(spec, name)?;
            let block = self.ensure_shared_block(def).await?;
            if block.content_hash() != def.hash() {
                self.client
                    .update_block(&block.id, def.value.as_str())
                    .await?;
            }
            self.client.attach_block(&agent.id, &block.id).await?;
            snapshot.shared_blocks.push(name.clone());
            snapshot.block_hashes.insert(name.clone(), def.hash());
        }

        let tools = self.desired_tools(spec).await?;
        for tool in &tools {
            let id = self.ensure_tool(spec.name.as_str(), tool, None).await?;
            self.client.attach_tool(&agent.id, &id).await?;
            snapshot.tools.push(tool.name.clone());
            if let Some(hash) = tool.hash {
                snapshot.tool_hashes.insert(tool.name.clone(), hash);
            }
        }

        for name in &spec.shared_folders {
            let def = self.shared_folder_def(spec, name)?;
            let folder = self.ensure_shared_folder(def).await?;
            if folder.content_hash() != def.hash() {
                self.client
                    .update_folder(&folder.id, folder_file_hashes(def))
                    .await?;
            }
            self.client.attach_folder(&agent.id, &folder.id).await?;
            snapshot.shared_folders.push(name.clone());
        }

        for block in &spec.memory_blocks {
            let created = self
                .client
                .create_block(CreateBlock {
                    name: block.name.clone(),
                    value: block.value.as_str().to_string(),
                    description: block.description.clone(),
                    limit: block.limit,
                })
                .await?;
            self.client.attach_block(&agent.id, &created.id).await?;
            snapshot.block_hashes.insert(block.name.clone(), block.hash());
        }

        self.client
            .update_agent_metadata(&agent.id, SNAPSHOT_KEY, snapshot.to_value()?)
            .await?;

        self.send_first_message(&agent.id, spec).await;

        Ok(AgentReport::new(spec.name.as_str(), AgentOutcome::Created))
    }

    /// Deliver a configured first message; failure warns, never rolls back
    async fn send_first_message(&self, id: &ResourceId, spec: &AgentSpec) {
        let Some(text) = spec.first_message.clone() else {
            return;
        };
        if self.options.skip_first_message {
            return;
        }
        let agent = spec.name.to_string();

        if self.options.no_wait {
            let client = Arc::clone(&self.client);
            let id = id.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, client.send_message(&id, &text))
                    .await
                {
                    Ok(Ok(())) => tracing::debug!(%agent, "first message delivered"),
                    Ok(Err(e)) => tracing::warn!(%agent, error = %e, "first message failed"),
                    Err(_) => tracing::warn!(%agent, "first message timed out"),
                }
            });
            return;
        }

        match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, self.client.send_message(id, &text)).await
        {
            Ok(Ok(())) => tracing::debug!(%agent, "first message delivered"),
            Ok(Err(e)) => tracing::warn!(%agent, error = %e, "first message failed"),
            Err(_) => tracing::warn!(%agent, "first message timed out"),
        }
    }

    // ---- update path ----

    pub(crate) async fn update_agent(
        &self,
        spec: &AgentSpec,
        live: &RemoteAgent,
    ) -> Result<AgentReport, ApplyError> {
        let snapshot = AppliedSnapshot::from_metadata(&live.metadata)?;
        if snapshot.is_none() {
            tracing::info!(agent = %spec.name, "no baseline; merge-only first apply");
        }
        let tools = self.desired_tools(spec).await?;

        // Names that belong to the shared-block class rather than the
        // per-agent class, from either side of the diff.
        let mut shared_names: BTreeSet<String> = spec.shared_blocks.iter().cloned().collect();
        if let Some(snap) = &snapshot {
            shared_names.extend(snap.shared_blocks.iter().cloned());
        }

        let mut plans = Vec::with_capacity(ResourceClass::APPLY_ORDER.len());
        let mut mutated = false;
        for class in ResourceClass::APPLY_ORDER {
            let class_plan = self.plan_class(class, spec, live, snapshot.as_ref(), &tools, &shared_names)?;
            tracing::debug!(
                agent = %spec.name,
                class = %class,
                add = class_plan.count(Decision::Add),
                update = class_plan.count(Decision::Update),
                remove = class_plan.count(Decision::Remove),
                "class planned"
            );
            if self.options.dry_run {
                mutated |= !class_plan.is_noop();
            } else {
                mutated |= self.execute_class(class, &class_plan, spec, live, &tools).await?;
            }
            plans.push(ClassPlan {
                class,
                plan: class_plan,
            });
        }

        // Persist the fresh baseline only when something changed or the
        // agent had none; skipping the no-op write keeps re-applies silent.
        if !self.options.dry_run && (mutated || snapshot.is_none()) {
            let fresh = self.build_snapshot(spec, &tools);
            self.client
                .update_agent_metadata(&live.id, SNAPSHOT_KEY, fresh.to_value()?)
                .await?;
        }

        let outcome = if mutated {
            AgentOutcome::Updated
        } else {
            AgentOutcome::Unchanged
        };
        Ok(AgentReport::new(spec.name.as_str(), outcome).with_plans(plans))
    }

    fn plan_class(
        &self,
        class: ResourceClass,
        spec: &AgentSpec,
        live: &RemoteAgent,
        snapshot: Option<&AppliedSnapshot>,
        tools: &[DesiredTool],
        shared_names: &BTreeSet<String>,
    ) -> Result<MergePlan, ApplyError> {
        let desired = self.desired_state(class, spec, tools)?;
        let live_state = live_state(class, live, shared_names);
        let last = snapshot.map(|snap| last_state(class, snap, spec));
        Ok(plan(last.as_ref(), &live_state, &desired))
    }

    fn desired_state(
        &self,
        class: ResourceClass,
        spec: &AgentSpec,
        tools: &[DesiredTool],
    ) -> Result<ClassState, ApplyError> {
        let mut state = ClassState::new();
        match class {
            ResourceClass::SharedBlocks => {
                for name in &spec.shared_blocks {
                    state.insert(name.clone(), self.shared_block_def(spec, name)?.hash());
                }
            }
            ResourceClass::Tools => {
                for tool in tools {
                    match tool.hash {
                        Some(hash) => state.insert(tool.name.clone(), hash),
                        None => state.insert_membership(tool.name.clone()),
                    }
                }
            }
            ResourceClass::SharedFolders => {
                for name in &spec.shared_folders {
                    state.insert(name.clone(), self.shared_folder_def(spec, name)?.hash());
                }
            }
            ResourceClass::MemoryBlocks => {
                for block in &spec.memory_blocks {
                    if block.agent_owned {
                        // The running agent owns the content; only
                        // membership is desired.
                        state.insert_membership(block.name.clone());
                    } else {
                        state.insert(block.name.clone(), block.hash());
                    }
                }
            }
        }
        Ok(state)
    }

    async fn execute_class(
        &self,
        class: ResourceClass,
        class_plan: &MergePlan,
        spec: &AgentSpec,
        live: &RemoteAgent,
        tools: &[DesiredTool],
    ) -> Result<bool, ApplyError> {
        let mut mutated = false;
        for entry in &class_plan.entries {
            if entry.decision == Decision::Keep {
                continue;
            }
            tracing::info!(
                agent = %spec.name,
                class = %class,
                resource = %entry.name,
                decision = ?entry.decision,
                "executing"
            );
            match class {
                ResourceClass::SharedBlocks => {
                    self.execute_shared_block(entry.decision, &entry.name, spec, live)
                        .await?;
                }
                ResourceClass::Tools => {
                    self.execute_tool(entry.decision, &entry.name, live, tools)
                        .await?;
                }
                ResourceClass::SharedFolders => {
                    self.execute_shared_folder(entry.decision, &entry.name, spec, live)
                        .await?;
                }
                ResourceClass::MemoryBlocks => {
                    self.execute_memory_block(entry.decision, &entry.name, spec, live)
                        .await?;
                }
            }
            mutated = true;
        }
        Ok(mutated)
    }

    async fn execute_shared_block(
        &self,
        decision: Decision,
        name: &str,
        spec: &AgentSpec,
        live: &RemoteAgent,
    ) -> Result<(), ApplyError> {
        match decision {
            Decision::Add => {
                let def = self.shared_block_def(spec, name)?;
                let block = self.ensure_shared_block(def).await?;
                if block.content_hash() != def.hash() {
                    self.client
                        .update_block(&block.id, def.value.as_str())
                        .await?;
                }
                self.client.attach_block(&live.id, &block.id).await?;
            }
            Decision::Update => {
                let def = self.shared_block_def(spec, name)?;
                let block = attached_block(live, name)?;
                self.client
                    .update_block(&block.id, def.value.as_str())
                    .await?;
            }
            Decision::Remove => {
                // Shared objects outlive any one agent: detach, never delete.
                let block = attached_block(live, name)?;
                self.client.detach_block(&live.id, &block.id).await?;
            }
            Decision::Keep => {}
        }
        Ok(())
    }

    async fn execute_tool(
        &self,
        decision: Decision,
        name: &str,
        live: &RemoteAgent,
        tools: &[DesiredTool],
    ) -> Result<(), ApplyError> {
        match decision {
            Decision::Add => {
                let tool = desired_tool(tools, name)?;
                let id = self.ensure_tool(&live.name, tool, None).await?;
                self.client.attach_tool(&live.id, &id).await?;
            }
            Decision::Update => {
                let tool = desired_tool(tools, name)?;
                let attached = live
                    .tool(name)
                    .ok_or_else(|| fleet_client::ClientError::not_found("tool", name))?;
                self.ensure_tool(&live.name, tool, Some(&attached.id)).await?;
            }
            Decision::Remove => {
                let attached = live
                    .tool(name)
                    .ok_or_else(|| fleet_client::ClientError::not_found("tool", name))?;
                self.client.detach_tool(&live.id, &attached.id).await?;
            }
            Decision::Keep => {}
        }
        Ok(())
    }

    async fn execute_shared_folder(
        &self,
        decision: Decision,
        name: &str,
        spec: &AgentSpec,
        live: &RemoteAgent,
    ) -> Result<(), ApplyError> {
        match decision {
            Decision::Add => {
                let def = self.shared_folder_def(spec, name)?;
                let folder = self.ensure_shared_folder(def).await?;
                if folder.content_hash() != def.hash() {
                    self.client
                        .update_folder(&folder.id, folder_file_hashes(def))
                        .await?;
                }
                self.client.attach_folder(&live.id, &folder.id).await?;
            }
            Decision::Update => {
                let def = self.shared_folder_def(spec, name)?;
                let folder = attached_folder(live, name)?;
                self.client
                    .update_folder(&folder.id, folder_file_hashes(def))
                    .await?;
            }
            Decision::Remove => {
                let folder = attached_folder(live, name)?;
                self.client.detach_folder(&live.id, &folder.id).await?;
            }
            Decision::Keep => {}
        }
        Ok(())
    }

    async fn execute_memory_block(
        &self,
        decision: Decision,
        name: &str,
        spec: &AgentSpec,
        live: &RemoteAgent,
    ) -> Result<(), ApplyError> {
        match decision {
            Decision::Add => {
                let block = spec
                    .memory_blocks
                    .iter()
                    .find(|b| b.name == name)
                    .ok_or_else(|| fleet_client::ClientError::not_found("block", name))?;
                let created = self
                    .client
                    .create_block(CreateBlock {
                        name: block.name.clone(),
                        value: block.value.as_str().to_string(),
                        description: block.description.clone(),
                        limit: block.limit,
                    })
                    .await?;
                self.client.attach_block(&live.id, &created.id).await?;
            }
            Decision::Update => {
                let block = spec
                    .memory_blocks
                    .iter()
                    .find(|b| b.name == name)
                    .ok_or_else(|| fleet_client::ClientError::not_found("block", name))?;
                let attached = attached_block(live, name)?;
                self.client
                    .update_block(&attached.id, block.value.as_str())
                    .await?;
            }
            Decision::Remove => {
                // Per-agent blocks have exactly one owner: detach and delete.
                let attached = attached_block(live, name)?;
                self.client.detach_block(&live.id, &attached.id).await?;
                self.client.delete_block(&attached.id).await?;
            }
            Decision::Keep => {}
        }
        Ok(())
    }

    /// The snapshot recording what this apply set
    fn build_snapshot(&self, spec: &AgentSpec, tools: &[DesiredTool]) -> AppliedSnapshot {
        let mut snapshot = AppliedSnapshot::new();
        snapshot.shared_blocks = spec.shared_blocks.clone();
        snapshot.shared_folders = spec.shared_folders.clone();
        for name in &spec.shared_blocks {
            if let Some(def) = self.config.shared_block(name) {
                snapshot.block_hashes.insert(name.clone(), def.hash());
            }
        }
        for tool in tools {
            snapshot.tools.push(tool.name.clone());
            if let Some(hash) = tool.hash {
                snapshot.tool_hashes.insert(tool.name.clone(), hash);
            }
        }
        for block in &spec.memory_blocks {
            snapshot.block_hashes.insert(block.name.clone(), block.hash());
        }
        snapshot
    }

    // ---- shared helpers ----

    fn shared_block_def<'c>(
        &'c self,
        spec: &AgentSpec,
        name: &str,
    ) -> Result<&'c SharedBlockSpec, ApplyError> {
        self.config.shared_block(name).ok_or_else(|| {
            SpecError::UnknownShared {
                agent: spec.name.to_string(),
                kind: "block",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn shared_folder_def<'c>(
        &'c self,
        spec: &AgentSpec,
        name: &str,
    ) -> Result<&'c SharedFolderSpec, ApplyError> {
        self.config.shared_folder(name).ok_or_else(|| {
            SpecError::UnknownShared {
                agent: spec.name.to_string(),
                kind: "folder",
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Create-or-reuse a shared block by name
    async fn ensure_shared_block(
        &self,
        def: &SharedBlockSpec,
    ) -> Result<RemoteBlock, ApplyError> {
        if let Some(existing) = self.client.find_block_by_name(&def.name).await? {
            return Ok(existing);
        }
        Ok(self
            .client
            .create_block(CreateBlock {
                name: def.name.clone(),
                value: def.value.as_str().to_string(),
                description: def.description.clone(),
                limit: def.limit,
            })
            .await?)
    }

    /// Create-or-reuse a shared folder by name
    async fn ensure_shared_folder(
        &self,
        def: &SharedFolderSpec,
    ) -> Result<RemoteFolder, ApplyError> {
        if let Some(existing) = self.client.find_folder_by_name(&def.name).await? {
            return Ok(existing);
        }
        Ok(self
            .client
            .create_folder(CreateFolder {
                name: def.name.clone(),
                file_hashes: folder_file_hashes(def),
            })
            .await?)
    }

    /// Make a desired tool exist server-side with the desired source
    ///
    /// `attached` short-circuits the registry lookup when the caller already
    /// holds the live id.
    async fn ensure_tool(
        &self,
        agent: &str,
        tool: &DesiredTool,
        attached: Option<&ResourceId>,
    ) -> Result<ResourceId, ApplyError> {
        if let Some(inline) = &tool.inline {
            let existing = match attached {
                Some(id) => Some(id.clone()),
                None => tool.id.clone(),
            };
            return match existing {
                Some(id) => {
                    self.client
                        .update_tool(&id, inline.source_code.as_str())
                        .await?;
                    Ok(id)
                }
                None => {
                    let created = self
                        .client
                        .create_tool(CreateTool {
                            name: inline.name.clone(),
                            description: inline.description.clone(),
                            source_code: inline.source_code.as_str().to_string(),
                            parameters: inline.parameters.clone(),
                        })
                        .await?;
                    Ok(created.id)
                }
            };
        }
        // Name and glob references point at pre-registered tools.
        tool.id
            .clone()
            .ok_or_else(|| ApplyError::UnknownTool {
                agent: agent.to_string(),
                tool: tool.name.clone(),
            })
    }

    /// Resolve the spec's tool references against the live registry
    ///
    /// Read-only: globs expand through the paginated tool listing, name
    /// references must already be registered, inline definitions carry
    /// their own content. Duplicates collapse on first occurrence.
    async fn desired_tools(&self, spec: &AgentSpec) -> Result<Vec<DesiredTool>, ApplyError> {
        let mut out: Vec<DesiredTool> = Vec::new();
        let mut seen = BTreeSet::new();
        for tool_ref in &spec.tools {
            match tool_ref {
                ToolRef::Name(name) => {
                    let found = self.client.find_tool_by_name(name).await?.ok_or_else(|| {
                        ApplyError::UnknownTool {
                            agent: spec.name.to_string(),
                            tool: name.clone(),
                        }
                    })?;
                    if seen.insert(name.clone()) {
                        out.push(DesiredTool {
                            name: name.clone(),
                            id: Some(found.id),
                            hash: None,
                            inline: None,
                        });
                    }
                }
                ToolRef::Inline(inline) => {
                    let existing = self.client.find_tool_by_name(&inline.name).await?;
                    if seen.insert(inline.name.clone()) {
                        out.push(DesiredTool {
                            name: inline.name.clone(),
                            id: existing.map(|t| t.id),
                            hash: Some(inline.hash()),
                            inline: Some(inline.clone()),
                        });
                    }
                }
                ToolRef::Glob(glob) => {
                    let regex = compile_glob(glob)?;
                    let mut cursor = None;
                    loop {
                        let page = self.client.list_tools(cursor, PAGE_SIZE).await?;
                        for tool in page.items {
                            if regex.is_match(&tool.name) && seen.insert(tool.name.clone()) {
                                out.push(DesiredTool {
                                    name: tool.name,
                                    id: Some(tool.id),
                                    hash: None,
                                    inline: None,
                                });
                            }
                        }
                        cursor = page.next_cursor;
                        if cursor.is_none() {
                            break;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    // ---- recalibrate ----

    /// Rebuild last-applied snapshots from live state, mutating nothing else
    async fn recalibrate(&self) -> Result<ApplyReport, ApplyError> {
        let targets = self.recalibrate_targets().await?;
        let mut report = ApplyReport::default();
        for agent in targets {
            let outcome = match self.recalibrate_agent(&agent).await {
                Ok(()) => AgentOutcome::Updated,
                Err(error) => {
                    tracing::warn!(agent = %agent.name, error = %error, "recalibrate failed");
                    AgentOutcome::Failed {
                        error: error.to_string(),
                    }
                }
            };
            report.agents.push(AgentReport::new(agent.name.clone(), outcome));
        }
        Ok(report)
    }

    async fn recalibrate_targets(&self) -> Result<Vec<RemoteAgent>, ApplyError> {
        if let Some(glob) = &self.options.recalibrate_match {
            let selection =
                resolve(self.client.as_ref(), &Selector::Pattern(glob.clone())).await?;
            if selection.is_empty() {
                return Err(ApplyError::NoTargets {
                    selector: format!("pattern={glob}"),
                });
            }
            return Ok(selection.agents);
        }
        if !self.options.recalibrate_tags.is_empty() {
            let selector = Selector::Tags(self.options.recalibrate_tags.clone());
            let selection = resolve(self.client.as_ref(), &selector).await?;
            if selection.is_empty() {
                return Err(ApplyError::NoTargets {
                    selector: selector.to_string(),
                });
            }
            return Ok(selection.agents);
        }
        // Default scope: the config's agents that exist live.
        let mut agents = Vec::new();
        for spec in &self.config.agents {
            match self.client.find_agent_by_name(spec.name.as_str()).await? {
                Some(agent) => agents.push(agent),
                None => tracing::warn!(agent = %spec.name, "absent live; skipping recalibrate"),
            }
        }
        Ok(agents)
    }

    async fn recalibrate_agent(&self, agent: &RemoteAgent) -> Result<(), ApplyError> {
        let snapshot = self.snapshot_from_live(agent);
        tracing::info!(
            agent = %agent.name,
            tools = snapshot.tools.len(),
            blocks = snapshot.block_hashes.len(),
            "recalibrating baseline from live state"
        );
        if self.options.dry_run {
            return Ok(());
        }
        self.client
            .update_agent_metadata(&agent.id, SNAPSHOT_KEY, snapshot.to_value()?)
            .await?;
        Ok(())
    }

    /// A baseline that adopts everything currently attached as managed
    fn snapshot_from_live(&self, agent: &RemoteAgent) -> AppliedSnapshot {
        let mut snapshot = AppliedSnapshot::new();
        for tool in &agent.tools {
            snapshot.tools.push(tool.name.clone());
            if let Some(hash) = tool.content_hash() {
                snapshot.tool_hashes.insert(tool.name.clone(), hash);
            }
        }
        for block in &agent.blocks {
            if self.config.shared_block(&block.name).is_some() {
                snapshot.shared_blocks.push(block.name.clone());
            }
            snapshot
                .block_hashes
                .insert(block.name.clone(), block.content_hash());
        }
        for folder in &agent.folders {
            snapshot.shared_folders.push(folder.name.clone());
        }
        snapshot
    }
}

// ---- state builders ----

fn live_state(class: ResourceClass, live: &RemoteAgent, shared_names: &BTreeSet<String>) -> ClassState {
    let mut state = ClassState::new();
    match class {
        ResourceClass::SharedBlocks => {
            for block in &live.blocks {
                if shared_names.contains(&block.name) {
                    state.insert(block.name.clone(), block.content_hash());
                }
            }
        }
        ResourceClass::Tools => {
            for tool in &live.tools {
                match tool.content_hash() {
                    Some(hash) => state.insert(tool.name.clone(), hash),
                    None => state.insert_membership(tool.name.clone()),
                }
            }
        }
        ResourceClass::SharedFolders => {
            for folder in &live.folders {
                state.insert(folder.name.clone(), folder.content_hash());
            }
        }
        ResourceClass::MemoryBlocks => {
            for block in &live.blocks {
                if !shared_names.contains(&block.name) {
                    state.insert(block.name.clone(), block.content_hash());
                }
            }
        }
    }
    state
}

fn last_state(class: ResourceClass, snapshot: &AppliedSnapshot, spec: &AgentSpec) -> ClassState {
    let mut state = ClassState::new();
    match class {
        ResourceClass::SharedBlocks => {
            for name in &snapshot.shared_blocks {
                match snapshot.block_hashes.get(name) {
                    Some(hash) => state.insert(name.clone(), *hash),
                    None => state.insert_membership(name.clone()),
                }
            }
        }
        ResourceClass::Tools => {
            for name in &snapshot.tools {
                match snapshot.tool_hashes.get(name) {
                    Some(hash) => state.insert(name.clone(), *hash),
                    None => state.insert_membership(name.clone()),
                }
            }
        }
        ResourceClass::SharedFolders => {
            for name in &snapshot.shared_folders {
                state.insert_membership(name.clone());
            }
        }
        ResourceClass::MemoryBlocks => {
            let shared: BTreeSet<&String> = snapshot.shared_blocks.iter().collect();
            let owned_now: BTreeSet<&str> = spec
                .memory_blocks
                .iter()
                .filter(|b| b.agent_owned)
                .map(|b| b.name.as_str())
                .collect();
            for (name, hash) in &snapshot.block_hashes {
                if shared.contains(name) {
                    continue;
                }
                if owned_now.contains(name.as_str()) {
                    // The agent owns the content now; its drift is not ours
                    // to flag or resync.
                    state.insert_membership(name.clone());
                } else {
                    state.insert(name.clone(), *hash);
                }
            }
        }
    }
    state
}

fn folder_file_hashes(
    def: &SharedFolderSpec,
) -> std::collections::BTreeMap<String, ContentHash> {
    def.files
        .iter()
        .map(|f| (f.name.clone(), f.content.hash()))
        .collect()
}

fn attached_block<'a>(live: &'a RemoteAgent, name: &str) -> Result<&'a RemoteBlock, ApplyError> {
    live.block(name)
        .ok_or_else(|| fleet_client::ClientError::not_found("block", name).into())
}

fn attached_folder<'a>(live: &'a RemoteAgent, name: &str) -> Result<&'a RemoteFolder, ApplyError> {
    live.folder(name)
        .ok_or_else(|| fleet_client::ClientError::not_found("folder", name).into())
}

fn desired_tool<'a>(tools: &'a [DesiredTool], name: &str) -> Result<&'a DesiredTool, ApplyError> {
    tools
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| fleet_client::ClientError::not_found("tool", name).into())
}

pub(crate) fn compile_glob(glob: &str) -> Result<Regex, SelectError> {
    Regex::new(&glob_to_regex(glob)).map_err(|source| SelectError::BadPattern {
        pattern: glob.to_string(),
        source,
    })
}

pub(crate) fn failed_report(name: &str, error: &ApplyError) -> AgentReport {
    tracing::warn!(agent = name, error = %error, "apply failed");
    AgentReport::new(
        name,
        AgentOutcome::Failed {
            error: error.to_string(),
        },
    )
}

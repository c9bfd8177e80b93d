//! End-to-end apply behavior against the in-memory fleet

use std::sync::Arc;

use pretty_assertions::assert_eq;

use fleet_apply::{AgentOutcome, ApplyOptions, Reconciler};
use fleet_client::FleetClient;
use fleet_merge::{AppliedSnapshot, Decision};
use fleet_spec::{
    FleetConfig, MemoryBlockSpec, SharedBlockSpec, SharedResource, Tag, ToolRef, ToolSpec,
};
use fleet_testkit::{fixtures, InMemoryFleet};

fn engine(fleet: &Arc<InMemoryFleet>, config: FleetConfig) -> Reconciler {
    Reconciler::new(fleet.clone(), config)
}

/// The fixture fleet with the shared knowledge base at a given version
fn support_fleet_with_kb(value: &str) -> FleetConfig {
    let mut config = fixtures::support_fleet();
    config.shared = vec![SharedResource::Block(
        SharedBlockSpec::new("kb", value).with_description("Shared knowledge base"),
    )];
    config
}

async fn snapshot_of(fleet: &InMemoryFleet, name: &str) -> Option<AppliedSnapshot> {
    let agent = fleet.find_agent_by_name(name).await.unwrap()?;
    AppliedSnapshot::from_metadata(&agent.metadata).unwrap()
}

#[tokio::test]
async fn apply_creates_then_converges() {
    let fleet = Arc::new(InMemoryFleet::new());
    let reconciler = engine(&fleet, fixtures::support_fleet());

    let first = reconciler.run().await.unwrap();
    assert_eq!(first.created(), 2);
    assert!(first.is_success());

    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    assert!(support.block("kb").is_some());
    assert!(support.block("persona").is_some());
    assert!(support.block("scratchpad").is_some());
    assert!(support.tool("lookup_order").is_some());
    assert!(snapshot_of(&fleet, "support").await.is_some());

    let second = reconciler.run().await.unwrap();
    assert_eq!(second.unchanged(), 2);
    assert_eq!(second.updated(), 0);
    assert!(second.is_success());
}

#[tokio::test]
async fn first_apply_to_existing_agent_removes_nothing() {
    let fleet = Arc::new(InMemoryFleet::new());
    let agent = fleet.seed_agent("support", vec![]).await;
    let handmade = fleet.seed_block("handmade", "user data").await;
    fleet.seed_attach_block(&agent.id, &handmade.id).await;

    let report = engine(&fleet, fixtures::support_fleet()).run().await.unwrap();
    assert!(report.is_success());

    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    assert!(support.block("handmade").is_some());
    assert_eq!(support.block("handmade").unwrap().value, "user data");
    assert!(support.block("kb").is_some());

    // The hand-added block never entered the baseline, so a later apply
    // still leaves it alone.
    let again = engine(&fleet, fixtures::support_fleet()).run().await.unwrap();
    assert!(again.is_success());
    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    assert!(support.block("handmade").is_some());
}

#[tokio::test]
async fn agent_owned_block_is_never_resynced() {
    let fleet = Arc::new(InMemoryFleet::new());
    engine(&fleet, fixtures::support_fleet()).run().await.unwrap();

    // The running agent writes to its scratchpad.
    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    let scratchpad = support.block("scratchpad").unwrap();
    fleet
        .update_block(&scratchpad.id, "agent notes accumulated at runtime")
        .await
        .unwrap();

    let report = engine(&fleet, fixtures::support_fleet()).run().await.unwrap();
    assert_eq!(report.agent("support").unwrap().outcome, AgentOutcome::Unchanged);

    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    assert_eq!(
        support.block("scratchpad").unwrap().value,
        "agent notes accumulated at runtime"
    );
}

#[tokio::test]
async fn block_dropped_from_template_is_removed() {
    let fleet = Arc::new(InMemoryFleet::new());

    let v1 = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("writer")
            .with_block(MemoryBlockSpec::synced("persona", "I write"))
            .with_block(MemoryBlockSpec::synced("style_guide", "short sentences"))],
    )
    .unwrap();
    engine(&fleet, v1).run().await.unwrap();

    let v2 = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("writer")
            .with_block(MemoryBlockSpec::synced("persona", "I write"))],
    )
    .unwrap();
    let report = engine(&fleet, v2).run().await.unwrap();
    assert_eq!(report.agent("writer").unwrap().outcome, AgentOutcome::Updated);

    let writer = fleet.find_agent_by_name("writer").await.unwrap().unwrap();
    assert!(writer.block("style_guide").is_none());
    assert!(writer.block("persona").is_some());
    // Per-agent blocks are deleted outright, not just detached.
    assert!(fleet.find_block_by_name("style_guide").await.unwrap().is_none());
}

#[tokio::test]
async fn shared_block_edit_propagates_then_settles() {
    let fleet = Arc::new(InMemoryFleet::new());
    engine(&fleet, support_fleet_with_kb("Product facts v1"))
        .run()
        .await
        .unwrap();

    let rollout = engine(&fleet, support_fleet_with_kb("Product facts v2"))
        .run()
        .await
        .unwrap();
    assert!(rollout.is_success());
    assert!(rollout.updated() >= 1);

    let kb = fleet.find_block_by_name("kb").await.unwrap().unwrap();
    assert_eq!(kb.value, "Product facts v2");

    let settled = engine(&fleet, support_fleet_with_kb("Product facts v2"))
        .run()
        .await
        .unwrap();
    assert_eq!(settled.unchanged(), 2);
}

#[tokio::test]
async fn dry_run_reports_decisions_without_mutating() {
    let fleet = Arc::new(InMemoryFleet::new());
    engine(&fleet, support_fleet_with_kb("v1")).run().await.unwrap();
    let before = fleet.mutation_count();

    let report = engine(&fleet, support_fleet_with_kb("v2"))
        .with_options(ApplyOptions::new().with_dry_run())
        .run()
        .await
        .unwrap();

    assert_eq!(fleet.mutation_count(), before);
    let support = report.agent("support").unwrap();
    assert_eq!(support.outcome, AgentOutcome::Updated);
    let shared_plan = &support.plans[0].plan;
    assert_eq!(shared_plan.count(Decision::Update), 1);

    // Live state is untouched.
    let kb = fleet.find_block_by_name("kb").await.unwrap().unwrap();
    assert_eq!(kb.value, "v1");
}

#[tokio::test]
async fn dry_run_create_makes_no_calls() {
    let fleet = Arc::new(InMemoryFleet::new());
    let report = engine(&fleet, fixtures::support_fleet())
        .with_options(ApplyOptions::new().with_dry_run())
        .run()
        .await
        .unwrap();

    assert_eq!(report.created(), 2);
    assert_eq!(fleet.mutation_count(), 0);
    assert!(fleet.find_agent_by_name("support").await.unwrap().is_none());
}

#[tokio::test]
async fn partial_failure_preserves_previous_snapshot() {
    let fleet = Arc::new(InMemoryFleet::new());
    engine(&fleet, support_fleet_with_kb("v1")).run().await.unwrap();
    let baseline = snapshot_of(&fleet, "support").await.unwrap();

    fleet.fail_block_updates("kb");
    let report = engine(&fleet, support_fleet_with_kb("v2")).run().await.unwrap();
    assert!(!report.is_success());
    assert!(report
        .agent("support")
        .unwrap()
        .outcome
        .is_failure());

    // The failed agent keeps its last fully-successful baseline, so the
    // next apply re-diffs from v1.
    let after = snapshot_of(&fleet, "support").await.unwrap();
    assert_eq!(after.block_hashes.get("kb"), baseline.block_hashes.get("kb"));
}

#[tokio::test]
async fn template_mode_applies_under_each_live_identity() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.seed_agent("support-eu", vec![]).await;
    fleet.seed_agent("support-us", vec![]).await;
    fleet.seed_agent("billing", vec![]).await;

    let template = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("placeholder")
            .with_block(MemoryBlockSpec::synced("persona", "regional support"))],
    )
    .unwrap();

    let report = engine(&fleet, template)
        .with_options(ApplyOptions::new().with_match_pattern("support-*"))
        .run()
        .await
        .unwrap();

    assert_eq!(report.agents.len(), 2);
    assert!(report.is_success());
    assert!(report.agent("support-eu").is_some());
    assert!(report.agent("support-us").is_some());

    for name in ["support-eu", "support-us"] {
        let agent = fleet.find_agent_by_name(name).await.unwrap().unwrap();
        assert!(agent.block("persona").is_some());
    }
    let billing = fleet.find_agent_by_name("billing").await.unwrap().unwrap();
    assert!(billing.block("persona").is_none());
    // The placeholder identity never materializes.
    assert!(fleet.find_agent_by_name("placeholder").await.unwrap().is_none());
}

#[tokio::test]
async fn template_mode_isolates_unusable_live_names() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.seed_agent("support-eu", vec![]).await;
    fleet.seed_agent("support.legacy", vec![]).await;

    let template = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("placeholder")
            .with_block(MemoryBlockSpec::synced("persona", "regional support"))],
    )
    .unwrap();

    let report = engine(&fleet, template)
        .with_options(ApplyOptions::new().with_match_pattern("support*"))
        .run()
        .await
        .unwrap();

    // The name outside the config charset fails alone; the rest proceed.
    assert_eq!(report.agents.len(), 2);
    assert!(report.agent("support.legacy").unwrap().outcome.is_failure());
    assert_eq!(
        report.agent("support-eu").unwrap().outcome,
        AgentOutcome::Updated
    );
    let eu = fleet.find_agent_by_name("support-eu").await.unwrap().unwrap();
    assert!(eu.block("persona").is_some());
}

#[tokio::test]
async fn template_mode_with_no_match_is_an_error() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.seed_agent("billing", vec![]).await;

    let template =
        FleetConfig::new(vec![], vec![fixtures::basic_agent("placeholder")]).unwrap();
    let err = engine(&fleet, template)
        .with_options(ApplyOptions::new().with_match_pattern("support-*"))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, fleet_apply::ApplyError::NoTargets { .. }));
}

#[tokio::test]
async fn name_referenced_tool_must_be_registered() {
    let fleet = Arc::new(InMemoryFleet::new());
    let config = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("runner").with_tool(ToolRef::Name("missing".to_string()))],
    )
    .unwrap();

    let report = engine(&fleet, config).run().await.unwrap();
    let AgentOutcome::Failed { error } = &report.agent("runner").unwrap().outcome else {
        panic!("expected a failed outcome");
    };
    // The failure names both the agent and the missing tool.
    assert!(error.contains("runner"), "{error}");
    assert!(error.contains("missing"), "{error}");
}

#[tokio::test]
async fn glob_tool_reference_attaches_every_match() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.seed_tool("search_web", "def search_web(): ...").await;
    fleet.seed_tool("search_docs", "def search_docs(): ...").await;
    fleet.seed_tool("summarize", "def summarize(): ...").await;

    let config = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("researcher").with_tool(ToolRef::Glob("search_*".to_string()))],
    )
    .unwrap();
    engine(&fleet, config).run().await.unwrap();

    let agent = fleet.find_agent_by_name("researcher").await.unwrap().unwrap();
    assert!(agent.tool("search_web").is_some());
    assert!(agent.tool("search_docs").is_some());
    assert!(agent.tool("summarize").is_none());
}

#[tokio::test]
async fn inline_tool_source_change_resyncs() {
    let fleet = Arc::new(InMemoryFleet::new());
    let v1 = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("runner")
            .with_tool(ToolRef::Inline(ToolSpec::new("greet", "def greet(): return 'hi'")))],
    )
    .unwrap();
    engine(&fleet, v1).run().await.unwrap();

    let v2 = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("runner")
            .with_tool(ToolRef::Inline(ToolSpec::new("greet", "def greet(): return 'hello'")))],
    )
    .unwrap();
    let report = engine(&fleet, v2).run().await.unwrap();
    assert_eq!(report.agent("runner").unwrap().outcome, AgentOutcome::Updated);

    let tool = fleet.find_tool_by_name("greet").await.unwrap().unwrap();
    assert_eq!(tool.source_code.as_deref(), Some("def greet(): return 'hello'"));
}

#[tokio::test]
async fn owned_to_synced_flip_resyncs_once() {
    let fleet = Arc::new(InMemoryFleet::new());
    let owned = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("notes")
            .with_block(MemoryBlockSpec::agent_owned("journal", "seed"))],
    )
    .unwrap();
    engine(&fleet, owned).run().await.unwrap();

    let agent = fleet.find_agent_by_name("notes").await.unwrap().unwrap();
    let journal = agent.block("journal").unwrap();
    fleet.update_block(&journal.id, "drifted by the agent").await.unwrap();

    let synced = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("notes")
            .with_block(MemoryBlockSpec::synced("journal", "canonical content"))],
    )
    .unwrap();
    let report = engine(&fleet, synced.clone()).run().await.unwrap();
    assert_eq!(report.agent("notes").unwrap().outcome, AgentOutcome::Updated);

    let agent = fleet.find_agent_by_name("notes").await.unwrap().unwrap();
    assert_eq!(agent.block("journal").unwrap().value, "canonical content");

    let settled = engine(&fleet, synced).run().await.unwrap();
    assert_eq!(settled.agent("notes").unwrap().outcome, AgentOutcome::Unchanged);
}

#[tokio::test]
async fn recalibrate_adopts_a_hand_managed_agent() {
    let fleet = Arc::new(InMemoryFleet::new());
    let agent = fleet.seed_agent("legacy", vec![]).await;
    let notes = fleet.seed_block("notes", "hand-curated").await;
    fleet.seed_attach_block(&agent.id, &notes.id).await;
    let custom = fleet.seed_tool("custom", "def custom(): ...").await;
    fleet.seed_attach_tool(&agent.id, &custom.id).await;

    let config = FleetConfig::new(vec![], vec![fixtures::basic_agent("legacy")]).unwrap();
    let report = engine(&fleet, config.clone())
        .with_options(ApplyOptions::new().with_recalibrate())
        .run()
        .await
        .unwrap();
    assert!(report.is_success());
    // Only the baseline metadata was written.
    assert_eq!(fleet.mutation_count(), 1);

    let snapshot = snapshot_of(&fleet, "legacy").await.unwrap();
    assert!(snapshot.block_hashes.contains_key("notes"));
    assert!(snapshot.tools.contains(&"custom".to_string()));

    // Adopted resources are now managed: a spec without them removes them.
    let report = engine(&fleet, config).run().await.unwrap();
    assert_eq!(report.agent("legacy").unwrap().outcome, AgentOutcome::Updated);
    let agent = fleet.find_agent_by_name("legacy").await.unwrap().unwrap();
    assert!(agent.block("notes").is_none());
    assert!(agent.tool("custom").is_none());
}

#[tokio::test]
async fn agent_pattern_scopes_the_apply() {
    let fleet = Arc::new(InMemoryFleet::new());
    let report = engine(&fleet, fixtures::support_fleet())
        .with_options(ApplyOptions::new().with_agent_pattern("sup*"))
        .run()
        .await
        .unwrap();

    assert_eq!(report.agents.len(), 1);
    assert!(fleet.find_agent_by_name("support").await.unwrap().is_some());
    assert!(fleet.find_agent_by_name("billing").await.unwrap().is_none());
}

#[tokio::test]
async fn offline_service_aborts_the_queue() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.go_offline();

    let report = engine(&fleet, fixtures::support_fleet()).run().await.unwrap();
    assert!(!report.is_success());
    assert!(report
        .agents
        .iter()
        .all(|a| matches!(a.outcome, AgentOutcome::Failed { .. } | AgentOutcome::Skipped)));
}

#[tokio::test]
async fn shared_folder_tracks_file_changes() {
    use fleet_spec::{FolderFile, SharedFolderSpec};

    let fleet = Arc::new(InMemoryFleet::new());
    let v1 = FleetConfig::new(
        vec![SharedResource::Folder(SharedFolderSpec::new(
            "docs",
            vec![FolderFile::new("faq.md", "q and a")],
        ))],
        vec![fixtures::basic_agent("support").with_shared_folder("docs")],
    )
    .unwrap();
    engine(&fleet, v1).run().await.unwrap();

    let support = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    assert!(support.folder("docs").is_some());

    let v2 = FleetConfig::new(
        vec![SharedResource::Folder(SharedFolderSpec::new(
            "docs",
            vec![
                FolderFile::new("faq.md", "q and a"),
                FolderFile::new("pricing.md", "tiers"),
            ],
        ))],
        vec![fixtures::basic_agent("support").with_shared_folder("docs")],
    )
    .unwrap();
    let report = engine(&fleet, v2.clone()).run().await.unwrap();
    assert_eq!(report.agent("support").unwrap().outcome, AgentOutcome::Updated);

    let folder = fleet.find_folder_by_name("docs").await.unwrap().unwrap();
    assert!(folder.file_hashes.contains_key("pricing.md"));

    let settled = engine(&fleet, v2).run().await.unwrap();
    assert_eq!(settled.agent("support").unwrap().outcome, AgentOutcome::Unchanged);
}

#[tokio::test]
async fn first_message_is_sent_once_on_creation() {
    let fleet = Arc::new(InMemoryFleet::new());
    let config = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("greeter").with_first_message("introduce yourself")],
    )
    .unwrap();

    engine(&fleet, config.clone()).run().await.unwrap();
    assert_eq!(
        fleet.sent_messages(),
        vec![("greeter".to_string(), "introduce yourself".to_string())]
    );

    // Re-apply does not resend.
    engine(&fleet, config).run().await.unwrap();
    assert_eq!(fleet.sent_messages().len(), 1);
}

#[tokio::test]
async fn failed_first_message_does_not_fail_the_create() {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.fail_messages_to("greeter");
    let config = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("greeter").with_first_message("hello")],
    )
    .unwrap();

    let report = engine(&fleet, config).run().await.unwrap();
    assert_eq!(report.agent("greeter").unwrap().outcome, AgentOutcome::Created);
    assert!(fleet.find_agent_by_name("greeter").await.unwrap().is_some());
}

#[tokio::test]
async fn skip_first_message_suppresses_the_send() {
    let fleet = Arc::new(InMemoryFleet::new());
    let config = FleetConfig::new(
        vec![],
        vec![fixtures::basic_agent("greeter").with_first_message("hello")],
    )
    .unwrap();

    engine(&fleet, config)
        .with_options(ApplyOptions::new().with_skip_first_message())
        .run()
        .await
        .unwrap();
    assert!(fleet.sent_messages().is_empty());
}

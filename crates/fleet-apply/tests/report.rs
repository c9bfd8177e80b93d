//! Read-only fleet reports

use std::sync::Arc;

use pretty_assertions::assert_eq;

use fleet_apply::{fleet_overview, orphaned, shared_usage, ApplyOptions, Reconciler};
use fleet_client::FleetClient;
use fleet_spec::Tag;
use fleet_testkit::{fixtures, InMemoryFleet};

async fn applied_fleet() -> Arc<InMemoryFleet> {
    let fleet = Arc::new(InMemoryFleet::new());
    Reconciler::new(fleet.clone(), fixtures::support_fleet())
        .run()
        .await
        .unwrap();
    fleet
}

#[tokio::test]
async fn overview_distinguishes_managed_from_unmanaged() {
    let fleet = applied_fleet().await;
    fleet.seed_agent("hand-rolled", vec![]).await;

    let rows = fleet_overview(fleet.as_ref(), &[]).await.unwrap();
    assert_eq!(rows.len(), 3);

    let support = rows.iter().find(|r| r.name == "support").unwrap();
    assert!(support.managed);
    assert!(!support.canary);
    assert_eq!(support.blocks, 3);

    let hand_rolled = rows.iter().find(|r| r.name == "hand-rolled").unwrap();
    assert!(!hand_rolled.managed);
}

#[tokio::test]
async fn overview_filters_by_tags() {
    let fleet = applied_fleet().await;

    let rows = fleet_overview(fleet.as_ref(), &[Tag::new("role", "billing")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "billing");
}

#[tokio::test]
async fn shared_usage_lists_referencing_agents() {
    let fleet = applied_fleet().await;

    let usage = shared_usage(fleet.as_ref()).await.unwrap();
    let kb = usage.blocks.iter().find(|u| u.name == "kb").unwrap();
    let mut users = kb.used_by.clone();
    users.sort();
    assert_eq!(users, vec!["billing", "support"]);
}

#[tokio::test]
async fn orphan_report_finds_abandoned_canaries_and_resources() {
    let fleet = applied_fleet().await;

    Reconciler::new(fleet.clone(), fixtures::support_fleet())
        .with_options(ApplyOptions::new().with_canary())
        .run()
        .await
        .unwrap();

    // Nothing orphaned while production is alive.
    let report = orphaned(fleet.as_ref()).await.unwrap();
    assert!(report.canaries.is_empty());

    // Deleting production orphans its canary.
    let production = fleet.find_agent_by_name("support").await.unwrap().unwrap();
    fleet.delete_agent(&production.id).await.unwrap();

    let report = orphaned(fleet.as_ref()).await.unwrap();
    assert_eq!(report.canaries, vec!["CANARY-support"]);

    // A block no agent references shows up as orphaned.
    fleet.seed_block("abandoned", "stale").await;
    let report = orphaned(fleet.as_ref()).await.unwrap();
    assert!(report.blocks.contains(&"abandoned".to_string()));
}

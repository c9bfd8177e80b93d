//! Ready-made spec values for engine tests

use fleet_spec::{
    AgentName, AgentSpec, FleetConfig, MemoryBlockSpec, ModelParams, SharedBlockSpec,
    SharedResource, Tag, ToolRef, ToolSpec,
};

/// Model parameters used by every fixture agent
#[must_use]
pub fn model_params() -> ModelParams {
    ModelParams::new("anthropic/claude-sonnet-4-5", "openai/text-embedding-3-small")
}

/// A minimal agent spec with the fixture model parameters
///
/// # Panics
/// Panics on an invalid name; fixtures are for tests.
#[must_use]
pub fn basic_agent(name: &str) -> AgentSpec {
    AgentSpec::new(AgentName::new(name).expect("valid fixture name"), model_params())
        .with_system_prompt("You are a helpful assistant.")
}

/// A small two-agent fleet sharing one knowledge block
///
/// - shared block `kb`
/// - `support`: synced persona, agent-owned scratchpad, inline tool, tagged
/// - `billing`: shared block only, tagged
///
/// # Panics
/// Panics if the fixture config fails validation; it never should.
#[must_use]
pub fn support_fleet() -> FleetConfig {
    let shared = vec![SharedResource::Block(
        SharedBlockSpec::new("kb", "Product facts v1").with_description("Shared knowledge base"),
    )];

    let support = basic_agent("support")
        .with_block(MemoryBlockSpec::synced("persona", "I handle support tickets."))
        .with_block(MemoryBlockSpec::agent_owned("scratchpad", ""))
        .with_shared_block("kb")
        .with_tool(ToolRef::Inline(ToolSpec::new(
            "lookup_order",
            "def lookup_order(order_id): ...",
        )))
        .with_tag(Tag::new("tenant", "acme"))
        .with_tag(Tag::new("role", "support"));

    let billing = basic_agent("billing")
        .with_shared_block("kb")
        .with_tag(Tag::new("tenant", "acme"))
        .with_tag(Tag::new("role", "billing"));

    FleetConfig::new(shared, vec![support, billing]).expect("valid fixture config")
}

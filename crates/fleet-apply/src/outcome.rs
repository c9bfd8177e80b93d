//! Apply outcomes and reports
//!
//! One `AgentReport` per targeted agent, aggregated into an `ApplyReport`.
//! The exit-code contract for embedding binaries: success if and only if
//! no agent failed.

use fleet_merge::MergePlan;

use crate::reconcile::ResourceClass;

/// What happened to one agent during an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Agent was absent live and was created
    Created,
    /// At least one sub-resource was mutated
    Updated,
    /// Every merge decision was KEEP
    Unchanged,
    /// The apply failed; the previous snapshot (if any) is untouched
    Failed {
        /// Rendered error
        error: String,
    },
    /// Agent was deleted (canary cleanup)
    Removed,
    /// The queue was aborted before this agent was attempted
    Skipped,
}

impl AgentOutcome {
    /// Whether this outcome counts as a failure
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// The merge plan computed for one resource class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPlan {
    /// Which resource class
    pub class: ResourceClass,
    /// The decisions for that class
    pub plan: MergePlan,
}

/// Per-agent apply detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    /// Agent name
    pub name: String,
    /// Final outcome
    pub outcome: AgentOutcome,
    /// Per-class decisions (empty on the create path)
    pub plans: Vec<ClassPlan>,
}

impl AgentReport {
    pub(crate) fn new(name: impl Into<String>, outcome: AgentOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            plans: Vec::new(),
        }
    }

    pub(crate) fn with_plans(mut self, plans: Vec<ClassPlan>) -> Self {
        self.plans = plans;
        self
    }
}

/// Aggregated result of one apply invocation
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Per-agent reports, in target order
    pub agents: Vec<AgentReport>,
}

impl ApplyReport {
    fn count(&self, f: impl Fn(&AgentOutcome) -> bool) -> usize {
        self.agents.iter().filter(|a| f(&a.outcome)).count()
    }

    /// Agents created
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, AgentOutcome::Created))
    }

    /// Agents updated
    #[must_use]
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, AgentOutcome::Updated))
    }

    /// Agents already converged
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, AgentOutcome::Unchanged))
    }

    /// Agents that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(AgentOutcome::is_failure)
    }

    /// Exit-code contract: success iff nothing failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Look up one agent's report
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&AgentReport> {
        self.agents.iter().find(|a| a.name == name)
    }
}

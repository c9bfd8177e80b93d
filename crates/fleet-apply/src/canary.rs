//! Canary lifecycle
//!
//! A canary is a prefixed copy of a production agent, created from the same
//! spec: shared blocks, folders and registered tools are attached to the
//! same remote objects as production, while agent-owned blocks and message
//! history start fresh. The canary carries a metadata record linking it to
//! its production counterpart.
//!
//! Promote re-runs the ordinary apply path against the production name and
//! retires the matching canary record; nothing accumulated on the canary is
//! ever copied over, and the canary agent itself stays up until cleanup.
//! Cleanup deletes every agent whose canary record carries the active
//! prefix, with no merge logic and no confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApplyError;
use crate::outcome::{AgentOutcome, AgentReport, ApplyReport};
use crate::reconcile::Reconciler;

/// Well-known agent-metadata key for the canary record
pub const CANARY_KEY: &str = "fleet/canary";

/// Metadata linking a canary agent to its production counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryMetadata {
    /// Whether the canary is still awaiting promotion; cleared on promote
    pub is_canary: bool,
    /// Name of the production agent this canary shadows
    pub production_name: String,
    /// The prefix the canary was deployed under
    pub prefix: String,
    /// When the canary was deployed
    pub created_at: DateTime<Utc>,
}

impl CanaryMetadata {
    /// Create a canary record stamped now
    #[must_use]
    pub fn new(production_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            is_canary: true,
            production_name: production_name.into(),
            prefix: prefix.into(),
            created_at: Utc::now(),
        }
    }

    /// Read the canary record out of an agent's metadata object
    ///
    /// Absent, null, or malformed records all read as "not a canary";
    /// cleanup must never fail on a half-written record.
    #[must_use]
    pub fn from_metadata(metadata: &serde_json::Value) -> Option<Self> {
        let value = metadata.get(CANARY_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Serialize for storage under [`CANARY_KEY`]
    ///
    /// # Errors
    /// Returns [`ApplyError::Client`] if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, ApplyError> {
        serde_json::to_value(self).map_err(|e| ApplyError::Client(e.into()))
    }
}

impl Reconciler {
    /// Deploy a prefixed canary copy for every targeted config agent
    pub(crate) async fn deploy_canaries(&self) -> Result<ApplyReport, ApplyError> {
        let prefix = self.options.canary_prefix().to_string();
        let specs = self.target_specs()?;
        tracing::info!(agents = specs.len(), %prefix, "deploying canaries");

        let mut report = ApplyReport::default();
        for spec in specs {
            let canary_name = spec.name.with_prefix(&prefix)?;
            let derived = spec.clone().renamed(canary_name);

            let agent_report = match self.apply_agent(&derived).await {
                Ok(r) => r,
                Err(fatal) => return Err(fatal),
            };
            let deployed = !agent_report.outcome.is_failure();
            report.agents.push(agent_report);

            if deployed && !self.options.dry_run {
                self.tag_canary(derived.name.as_str(), spec.name.as_str(), &prefix)
                    .await?;
            }
        }
        Ok(report)
    }

    /// Promote: re-apply the production specs, then retire matching records
    pub(crate) async fn promote_canaries(&self) -> Result<ApplyReport, ApplyError> {
        let prefix = self.options.canary_prefix().to_string();
        let specs = self.target_specs()?;
        tracing::info!(agents = specs.len(), %prefix, "promoting");

        let mut report = ApplyReport::default();
        for spec in specs {
            let agent_report = self.apply_agent(&spec).await?;
            let promoted = !agent_report.outcome.is_failure();
            report.agents.push(agent_report);

            if promoted && !self.options.dry_run {
                self.retire_canary_record(spec.name.as_str(), &prefix).await?;
            }
        }
        Ok(report)
    }

    /// Clear the record's active flag once its config has shipped
    ///
    /// The record keeps its prefix so cleanup can still find the agent;
    /// the canary itself is left running and deletion stays cleanup's job.
    async fn retire_canary_record(
        &self,
        production_name: &str,
        prefix: &str,
    ) -> Result<(), ApplyError> {
        let canary_name = format!("{prefix}{production_name}");
        let Some(agent) = self.client.find_agent_by_name(&canary_name).await? else {
            tracing::warn!(production = production_name, "no canary to promote from");
            return Ok(());
        };
        match CanaryMetadata::from_metadata(&agent.metadata) {
            Some(mut record) if record.prefix == prefix => {
                record.is_canary = false;
                tracing::info!(canary = %agent.name, "retiring canary record");
                self.client
                    .update_agent_metadata(&agent.id, CANARY_KEY, record.to_value()?)
                    .await?;
            }
            _ => tracing::warn!(canary = %agent.name, "agent carries no matching canary record"),
        }
        Ok(())
    }

    async fn tag_canary(
        &self,
        canary_name: &str,
        production_name: &str,
        prefix: &str,
    ) -> Result<(), ApplyError> {
        let Some(agent) = self.client.find_agent_by_name(canary_name).await? else {
            return Ok(());
        };
        let record = CanaryMetadata::new(production_name, prefix);
        self.client
            .update_agent_metadata(&agent.id, CANARY_KEY, record.to_value()?)
            .await?;
        Ok(())
    }

    /// Delete every agent whose canary record carries the active prefix
    pub(crate) async fn cleanup_canaries(&self) -> Result<ApplyReport, ApplyError> {
        let prefix = self.options.canary_prefix();
        let selection = fleet_select::resolve(
            self.client.as_ref(),
            &fleet_select::Selector::Pattern("*".to_string()),
        )
        .await?;

        let mut report = ApplyReport::default();
        for agent in selection.agents {
            let Some(record) = CanaryMetadata::from_metadata(&agent.metadata) else {
                continue;
            };
            // Retired records (promoted canaries) are still cleaned up.
            if record.prefix != prefix {
                continue;
            }
            tracing::info!(
                canary = %agent.name,
                production = %record.production_name,
                "deleting canary"
            );
            let outcome = if self.options.dry_run {
                AgentOutcome::Removed
            } else {
                match self.client.delete_agent(&agent.id).await {
                    Ok(()) => AgentOutcome::Removed,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => AgentOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            };
            report.agents.push(AgentReport::new(agent.name, outcome));
        }

        if report.agents.is_empty() {
            tracing::info!(%prefix, "no canaries to clean up");
        }
        Ok(report)
    }
}

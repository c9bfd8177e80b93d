//! Apply-layer errors

use fleet_client::ClientError;
use fleet_merge::MergeError;
use fleet_select::SelectError;
use fleet_spec::SpecError;

/// Errors raised while driving an apply, canary, or bulk operation
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Spec-level validation failed while deriving a resource
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Remote operation failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Last-applied snapshot could not be read or written
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Target selection failed
    #[error(transparent)]
    Select(#[from] SelectError),

    /// The selector matched no agents where at least one was required
    #[error("no agents matched selector {selector}")]
    NoTargets { selector: String },

    /// A referenced server-side tool does not exist
    #[error("agent {agent}: referenced tool {tool:?} is not registered")]
    UnknownTool { agent: String, tool: String },

    /// A per-agent operation exceeded its deadline
    #[error("agent {agent}: operation timed out after {seconds}s")]
    Timeout { agent: String, seconds: u64 },
}

impl ApplyError {
    /// Whether this error should abort the remaining bulk queue
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_fatal())
    }
}

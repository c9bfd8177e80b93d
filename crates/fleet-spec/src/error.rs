//! Error types for the fleet configuration model

/// Errors raised while constructing the resolved configuration model
///
/// The external loader performs schema validation; these cover only the
/// invariants the types themselves enforce.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Agent name contains invalid characters
    #[error("invalid agent name: {name:?} (allowed: [A-Za-z0-9_-]+)")]
    InvalidName { name: String },

    /// Tag is not of the form `key:value`
    #[error("invalid tag: {raw:?} (expected key:value)")]
    InvalidTag { raw: String },

    /// Two agents share a name
    #[error("duplicate agent name: {name}")]
    DuplicateAgent { name: String },

    /// A shared resource defined twice
    #[error("duplicate shared resource: {name}")]
    DuplicateShared { name: String },

    /// An agent references a shared resource the config does not define
    #[error("agent {agent} references unknown shared {kind}: {name}")]
    UnknownShared {
        agent: String,
        kind: &'static str,
        name: String,
    },
}

//! Client error taxonomy
//!
//! Distinguishes per-resource failures (not found, conflict, API rejection)
//! from fatal transport failures that abort the remaining work of a bulk
//! operation.

/// Errors returned by [`crate::FleetClient`] implementations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Resource does not exist
    #[error("{resource} not found: {id}")]
    NotFound {
        resource: &'static str,
        id: String,
    },

    /// Resource already exists or a write raced another writer
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Remote service rejected the request
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Remote service unreachable
    ///
    /// Fatal for the remaining queue of a bulk operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Required connection configuration is missing
    #[error("missing connection configuration: {0}")]
    MissingConfig(&'static str),

    /// Metadata payload could not be (de)serialized
    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether this error should abort the remaining bulk queue
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MissingConfig(_))
    }

    /// Construct a not-found error
    #[inline]
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }
}

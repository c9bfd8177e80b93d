//! Merge-layer errors

/// Errors raised by the snapshot store
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Snapshot metadata exists but does not deserialize
    #[error("malformed last-applied snapshot: {source}")]
    MalformedSnapshot {
        #[source]
        source: serde_json::Error,
    },
}

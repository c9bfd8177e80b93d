//! Last-applied snapshot store
//!
//! Records exactly what the reconciler set on the previous successful apply:
//! attached tool / shared-block / shared-folder names plus a content-hash map
//! for every syncable sub-resource. Persisted as JSON under a well-known key
//! inside the live agent's opaque metadata object, so the baseline travels
//! with the resource and needs no separate datastore.
//!
//! The snapshot is written only after every sub-operation of an apply
//! succeeded; a partial failure leaves the previous baseline in place so the
//! next apply re-diffs correctly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_spec::ContentHash;

use crate::error::MergeError;

/// Well-known agent-metadata key the snapshot is stored under
pub const SNAPSHOT_KEY: &str = "fleet/last_applied";

/// Per-agent record of the previous successful apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSnapshot {
    /// Tool names the reconciler attached
    pub tools: Vec<String>,
    /// Shared block names the reconciler attached
    pub shared_blocks: Vec<String>,
    /// Shared folder names the reconciler attached
    pub shared_folders: Vec<String>,
    /// Content hash per managed tool
    pub tool_hashes: BTreeMap<String, ContentHash>,
    /// Content hash per managed block (shared and per-agent)
    pub block_hashes: BTreeMap<String, ContentHash>,
    /// When this snapshot was written
    pub applied_at: DateTime<Utc>,
}

impl AppliedSnapshot {
    /// Create an empty snapshot stamped now
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            shared_blocks: Vec::new(),
            shared_folders: Vec::new(),
            tool_hashes: BTreeMap::new(),
            block_hashes: BTreeMap::new(),
            applied_at: Utc::now(),
        }
    }

    /// Read the snapshot out of an agent's metadata object
    ///
    /// Returns `None` if the key is absent or null — the agent has never
    /// been successfully applied to, and the merge runs baseline-free.
    ///
    /// # Errors
    /// Returns [`MergeError::MalformedSnapshot`] if the key holds a value
    /// that does not deserialize.
    pub fn from_metadata(metadata: &serde_json::Value) -> Result<Option<Self>, MergeError> {
        match metadata.get(SNAPSHOT_KEY) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| MergeError::MalformedSnapshot { source }),
        }
    }

    /// Serialize for storage under [`SNAPSHOT_KEY`]
    ///
    /// # Errors
    /// Returns [`MergeError::MalformedSnapshot`] if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, MergeError> {
        serde_json::to_value(self).map_err(|source| MergeError::MalformedSnapshot { source })
    }
}

impl Default for AppliedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> AppliedSnapshot {
        let mut snapshot = AppliedSnapshot::new();
        snapshot.tools = vec!["web_search".to_string()];
        snapshot.shared_blocks = vec!["kb".to_string()];
        snapshot
            .block_hashes
            .insert("kb".to_string(), ContentHash::compute(b"facts"));
        snapshot
    }

    #[test]
    fn roundtrip_through_metadata() {
        let snapshot = sample();
        let metadata = serde_json::json!({ SNAPSHOT_KEY: snapshot.to_value().unwrap() });

        let loaded = AppliedSnapshot::from_metadata(&metadata).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn absent_key_means_never_applied() {
        let metadata = serde_json::json!({ "other": 1 });
        assert!(AppliedSnapshot::from_metadata(&metadata).unwrap().is_none());
    }

    #[test]
    fn null_key_means_never_applied() {
        let metadata = serde_json::json!({ SNAPSHOT_KEY: null });
        assert!(AppliedSnapshot::from_metadata(&metadata).unwrap().is_none());
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let metadata = serde_json::json!({ SNAPSHOT_KEY: "not an object" });
        assert!(AppliedSnapshot::from_metadata(&metadata).is_err());
    }

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let value = sample().to_value().unwrap();
        let object = value.as_object().unwrap();

        assert!(object.contains_key("tools"));
        assert!(object.contains_key("sharedBlocks"));
        assert!(object.contains_key("sharedFolders"));
        assert!(object.contains_key("toolHashes"));
        assert!(object.contains_key("blockHashes"));
    }
}

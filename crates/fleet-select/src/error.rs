//! Selection errors

use fleet_client::ClientError;

/// Errors raised while resolving a selector against the live fleet
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// Glob pattern did not translate to a valid matcher
    #[error("bad name pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Listing the fleet failed
    #[error("fleet listing failed: {0}")]
    Client(#[from] ClientError),
}

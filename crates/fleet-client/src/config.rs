//! Connection configuration from the environment
//!
//! The engine never parses CLI flags; the base URL and credentials come from
//! the environment. A missing base URL is a fatal precondition failure,
//! surfaced before any reconciliation begins.

use crate::error::ClientError;

/// Environment variable carrying the service base URL
pub const BASE_URL_VAR: &str = "LETTA_BASE_URL";

/// Environment variable carrying the API key
pub const API_KEY_VAR: &str = "LETTA_API_KEY";

/// Connection configuration for a `FleetClient` implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service base URL
    pub base_url: String,
    /// Bearer credential, if the deployment requires one
    pub api_key: Option<String>,
}

impl ClientConfig {
    /// Read configuration from process environment
    ///
    /// # Errors
    /// Returns [`ClientError::MissingConfig`] if the base URL is unset.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function (testable seam)
    ///
    /// # Errors
    /// Returns [`ClientError::MissingConfig`] if the base URL is unset or
    /// empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(BASE_URL_VAR)
            .filter(|v| !v.is_empty())
            .ok_or(ClientError::MissingConfig(BASE_URL_VAR))?;
        let api_key = lookup(API_KEY_VAR).filter(|v| !v.is_empty());

        Ok(Self { base_url, api_key })
    }
}

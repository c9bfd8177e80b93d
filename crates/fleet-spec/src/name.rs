//! Validated agent names and tags

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid name regex"));

/// Validated agent name (`[A-Za-z0-9_-]+`)
///
/// Agent identity within the fleet. Two agents never share a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    /// Create a validated agent name
    ///
    /// # Errors
    /// Returns [`SpecError::InvalidName`] if the name contains characters
    /// outside `[A-Za-z0-9_-]` or is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, SpecError> {
        let name = name.into();
        if NAME_RE.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(SpecError::InvalidName { name })
        }
    }

    /// Get the name as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a prefixed name (used for canary copies)
    ///
    /// # Errors
    /// Returns [`SpecError::InvalidName`] if the prefix introduces invalid
    /// characters.
    pub fn with_prefix(&self, prefix: &str) -> Result<Self, SpecError> {
        Self::new(format!("{prefix}{}", self.0))
    }
}

impl Display for AgentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentName {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentName {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

/// A `key:value` label attached to agents for bulk targeting
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a tag from key and value parts
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse a `key:value` string
    ///
    /// The value may itself contain `:`; only the first separator splits.
    ///
    /// # Errors
    /// Returns [`SpecError::InvalidTag`] if there is no separator or the key
    /// is empty.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        match raw.split_once(':') {
            Some((key, value)) if !key.is_empty() => Ok(Self::new(key, value)),
            _ => Err(SpecError::InvalidTag {
                raw: raw.to_string(),
            }),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

impl FromStr for Tag {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

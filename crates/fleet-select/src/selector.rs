//! Target selectors
//!
//! A selector names the set of live agents an operation acts on: one agent
//! by exact name, a glob over names, or an AND-set of tags. Name and tag
//! selectors push the filter to the server; glob selectors enumerate the
//! fleet and match client-side, since the service has no pattern search.

use std::fmt::{self, Display, Formatter};

use regex::Regex;

use fleet_spec::Tag;

use crate::error::SelectError;

/// Which live agents an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Exactly one agent, by name
    Name(String),
    /// Agents whose name matches a glob (`*` is the only metacharacter)
    Pattern(String),
    /// Agents carrying every listed tag
    Tags(Vec<Tag>),
}

impl Selector {
    /// Build the name-matching predicate for this selector
    ///
    /// # Errors
    /// Returns [`SelectError::BadPattern`] for an unparseable glob. The
    /// translated regex is always anchored, so this only fires on pathological
    /// input.
    pub(crate) fn name_matcher(&self) -> Result<Option<Regex>, SelectError> {
        match self {
            Selector::Pattern(glob) => {
                let regex = Regex::new(&glob_to_regex(glob)).map_err(|source| {
                    SelectError::BadPattern {
                        pattern: glob.clone(),
                        source,
                    }
                })?;
                Ok(Some(regex))
            }
            Selector::Name(_) | Selector::Tags(_) => Ok(None),
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => write!(f, "name={name}"),
            Selector::Pattern(glob) => write!(f, "pattern={glob}"),
            Selector::Tags(tags) => {
                write!(f, "tags=")?;
                for (i, tag) in tags.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{tag}")?;
                }
                Ok(())
            }
        }
    }
}

/// Translate a `*`-only glob into an anchored regex
///
/// Every other character is matched literally; regex metacharacters in the
/// glob are escaped.
#[must_use]
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            ch => out.push_str(&regex::escape(&ch.to_string())),
        }
    }
    out.push('$');
    out
}

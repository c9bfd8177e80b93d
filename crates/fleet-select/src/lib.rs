//! Agent selection over the live fleet
//!
//! Operations target agents through a [`Selector`]:
//!
//! - [`Selector::Name`]: exactly one agent, by validated name
//! - [`Selector::Pattern`]: glob over agent names (`*` wildcard only)
//! - [`Selector::Tags`]: agents carrying every listed tag
//!
//! [`resolve`] walks the cursor-paginated fleet listing lazily and returns a
//! [`Selection`] that distinguishes an empty match from an empty fleet.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod resolve;
mod selector;

pub use error::SelectError;
pub use resolve::{resolve, resolve_stream, Selection};
pub use selector::{glob_to_regex, Selector};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

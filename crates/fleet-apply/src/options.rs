//! Apply invocation options
//!
//! Consumed pre-parsed; the CLI layer that produces them is an external
//! concern. Exactly one top-level mode is active per invocation: plain
//! apply, template apply (`match_pattern`), canary deploy, promote,
//! cleanup, or recalibrate.

use fleet_spec::Tag;

/// Default canary name prefix
pub const DEFAULT_CANARY_PREFIX: &str = "CANARY-";

/// Options for one apply invocation
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute and report decisions without mutating anything
    pub dry_run: bool,
    /// Restrict the apply to config agents whose name matches this glob
    pub agent_pattern: Option<String>,
    /// Template mode: apply the single config spec to every live agent
    /// matching this glob, each under its own identity
    pub match_pattern: Option<String>,
    /// Deploy prefixed canary copies instead of touching production
    pub canary: bool,
    /// Canary name prefix override
    pub canary_prefix: Option<String>,
    /// Promote: re-apply the config to the production-named agents
    pub promote: bool,
    /// Delete every canary agent with the active prefix
    pub cleanup: bool,
    /// Rebuild last-applied snapshots from live state, mutating nothing else
    pub recalibrate: bool,
    /// Recalibrate scope: agents carrying every listed tag
    pub recalibrate_tags: Vec<Tag>,
    /// Recalibrate scope: agents whose name matches this glob
    pub recalibrate_match: Option<String>,
    /// Fire-and-forget message sends
    pub no_wait: bool,
    /// Suppress configured first messages
    pub skip_first_message: bool,
}

impl ApplyOptions {
    /// Plain apply with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With dry-run enabled
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// With a config-agent name filter
    #[inline]
    #[must_use]
    pub fn with_agent_pattern(mut self, glob: impl Into<String>) -> Self {
        self.agent_pattern = Some(glob.into());
        self
    }

    /// With template mode against a live-agent glob
    #[inline]
    #[must_use]
    pub fn with_match_pattern(mut self, glob: impl Into<String>) -> Self {
        self.match_pattern = Some(glob.into());
        self
    }

    /// With canary deployment enabled
    #[inline]
    #[must_use]
    pub fn with_canary(mut self) -> Self {
        self.canary = true;
        self
    }

    /// With a canary prefix override
    #[inline]
    #[must_use]
    pub fn with_canary_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.canary_prefix = Some(prefix.into());
        self
    }

    /// With promote enabled
    #[inline]
    #[must_use]
    pub fn with_promote(mut self) -> Self {
        self.promote = true;
        self
    }

    /// With canary cleanup enabled
    #[inline]
    #[must_use]
    pub fn with_cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    /// With recalibration enabled
    #[inline]
    #[must_use]
    pub fn with_recalibrate(mut self) -> Self {
        self.recalibrate = true;
        self
    }

    /// With recalibration scoped to tagged agents
    #[inline]
    #[must_use]
    pub fn with_recalibrate_tags(mut self, tags: Vec<Tag>) -> Self {
        self.recalibrate_tags = tags;
        self
    }

    /// With recalibration scoped to a live-agent glob
    #[inline]
    #[must_use]
    pub fn with_recalibrate_match(mut self, glob: impl Into<String>) -> Self {
        self.recalibrate_match = Some(glob.into());
        self
    }

    /// With fire-and-forget sends
    #[inline]
    #[must_use]
    pub fn with_no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// With first messages suppressed
    #[inline]
    #[must_use]
    pub fn with_skip_first_message(mut self) -> Self {
        self.skip_first_message = true;
        self
    }

    /// The canary prefix in effect
    #[inline]
    #[must_use]
    pub fn canary_prefix(&self) -> &str {
        self.canary_prefix.as_deref().unwrap_or(DEFAULT_CANARY_PREFIX)
    }
}

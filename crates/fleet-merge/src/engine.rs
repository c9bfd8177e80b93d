//! Three-way merge engine
//!
//! Computes per-resource decisions for one resource class on one agent,
//! given the last-applied baseline, freshly-fetched live state, and desired
//! state. The engine is pure: it never touches the client.
//!
//! The load-bearing invariant: a resource absent from the last-applied
//! baseline is never removed, regardless of desired state. Presence in the
//! baseline is what distinguishes "this template manages R" from "a user
//! added R by hand". A baseline-free merge (first apply to an unmanaged
//! agent) therefore emits no REMOVE decisions at all.

use std::collections::{BTreeMap, BTreeSet};

use fleet_spec::ContentHash;

/// Per-resource merge decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Create and attach the resource
    Add,
    /// Resync content to desired state
    Update,
    /// Leave the live resource untouched
    Keep,
    /// Detach and delete (template previously added it, no longer wants it)
    Remove,
}

/// One resource's decision within a merge plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    /// Resource name
    pub name: String,
    /// What the reconciler should do
    pub decision: Decision,
    /// Live content drifted from the last-applied hash (out-of-band edit)
    ///
    /// Informational: the documented policy is to proceed with desired
    /// state anyway. Never fatal.
    pub conflict: bool,
}

/// The full decision set for one resource class on one agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Decisions, ordered by resource name
    pub entries: Vec<MergeEntry>,
}

impl MergePlan {
    /// Entries with a given decision
    pub fn with_decision(&self, decision: Decision) -> impl Iterator<Item = &MergeEntry> {
        self.entries.iter().filter(move |e| e.decision == decision)
    }

    /// Count of entries with a given decision
    #[must_use]
    pub fn count(&self, decision: Decision) -> usize {
        self.with_decision(decision).count()
    }

    /// Whether the plan mutates anything
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.decision == Decision::Keep)
    }

    /// Names of entries flagged as conflicted
    #[must_use]
    pub fn conflicts(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.conflict)
            .map(|e| e.name.as_str())
            .collect()
    }
}

/// Name → content hash view of one resource class in one of the three legs
///
/// A `None` hash means the resource's membership is tracked but its content
/// is not (name-referenced tools, agent-owned blocks, folders in the
/// baseline). Content-unknown entries never produce hash-based updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassState {
    entries: BTreeMap<String, Option<ContentHash>>,
}

impl ClassState {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource with known content hash
    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, hash: ContentHash) {
        self.entries.insert(name.into(), Some(hash));
    }

    /// Insert a membership-only resource (content not tracked)
    #[inline]
    pub fn insert_membership(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), None);
    }

    /// Whether the resource is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Content hash for a present resource (`None` if membership-only)
    #[inline]
    #[must_use]
    pub fn hash_of(&self, name: &str) -> Option<ContentHash> {
        self.entries.get(name).copied().flatten()
    }

    /// Resource names in this state
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of resources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, ContentHash)> for ClassState {
    fn from_iter<I: IntoIterator<Item = (N, ContentHash)>>(iter: I) -> Self {
        let mut state = Self::new();
        for (name, hash) in iter {
            state.insert(name, hash);
        }
        state
    }
}

/// Compute the merge plan for one resource class
///
/// `last_applied` is `None` when the agent has never been successfully
/// applied to; the resulting plan is merge-only (no REMOVE).
#[must_use]
pub fn plan(
    last_applied: Option<&ClassState>,
    live: &ClassState,
    desired: &ClassState,
) -> MergePlan {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    if let Some(last) = last_applied {
        names.extend(last.names());
    }
    names.extend(live.names());
    names.extend(desired.names());

    let mut entries = Vec::new();
    for name in names {
        if let Some(entry) = decide(name, last_applied, live, desired) {
            entries.push(entry);
        }
    }

    let plan = MergePlan { entries };
    for conflicted in plan.conflicts() {
        tracing::warn!(
            resource = conflicted,
            "live content drifted since last apply; proceeding with desired state"
        );
    }
    plan
}

fn decide(
    name: &str,
    last_applied: Option<&ClassState>,
    live: &ClassState,
    desired: &ClassState,
) -> Option<MergeEntry> {
    let in_last = last_applied.is_some_and(|s| s.contains(name));
    let in_live = live.contains(name);
    let in_desired = desired.contains(name);

    let last_hash = last_applied.and_then(|s| s.hash_of(name));
    let live_hash = live.hash_of(name);
    let desired_hash = desired.hash_of(name);

    // Drift on a still-managed resource: live differs from what we last set.
    let conflict = in_last
        && in_live
        && matches!((last_hash, live_hash), (Some(a), Some(b)) if a != b);

    let decision = match (in_last, in_live, in_desired) {
        // New from template.
        (_, false, true) => Decision::Add,
        // Template previously added it and no longer wants it.
        (true, true, false) => Decision::Remove,
        // User-added resource; the template was never responsible for it.
        (false, true, false) => Decision::Keep,
        // Present live and desired: resync when content differs.
        (_, true, true) => {
            if content_differs(desired_hash, live_hash, last_hash) {
                Decision::Update
            } else {
                Decision::Keep
            }
        }
        // Gone everywhere but the baseline: nothing to do.
        (true, false, false) => return None,
        (false, false, false) => return None,
    };

    Some(MergeEntry {
        name: name.to_string(),
        decision,
        conflict,
    })
}

fn content_differs(
    desired: Option<ContentHash>,
    live: Option<ContentHash>,
    last_applied: Option<ContentHash>,
) -> bool {
    match (desired, live) {
        (Some(d), Some(l)) => d != l,
        // Live content not exposed: fall back to comparing against the
        // baseline so template edits still propagate.
        (Some(d), None) => last_applied.is_some_and(|la| la != d),
        // Membership-only desired entry: nothing to resync.
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hash(data: &str) -> ContentHash {
        ContentHash::compute(data.as_bytes())
    }

    fn state(entries: &[(&str, &str)]) -> ClassState {
        entries
            .iter()
            .map(|(name, content)| (name.to_string(), hash(content)))
            .collect()
    }

    fn decision_for<'a>(plan: &'a MergePlan, name: &str) -> &'a MergeEntry {
        plan.entries
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("no entry for {name}"))
    }

    #[test]
    fn new_from_template_is_add() {
        let plan = plan(
            Some(&ClassState::new()),
            &ClassState::new(),
            &state(&[("kb", "v1")]),
        );
        assert_eq!(decision_for(&plan, "kb").decision, Decision::Add);
    }

    #[test]
    fn user_added_before_any_apply_is_kept() {
        // Live has it, template wants it, baseline never saw it.
        let plan = plan(
            Some(&ClassState::new()),
            &state(&[("kb", "v1")]),
            &state(&[("kb", "v1")]),
        );
        assert_eq!(decision_for(&plan, "kb").decision, Decision::Keep);
        assert!(!decision_for(&plan, "kb").conflict);
    }

    #[test]
    fn user_added_unlisted_resource_is_never_removed() {
        let plan = plan(
            Some(&ClassState::new()),
            &state(&[("handmade", "v1")]),
            &ClassState::new(),
        );
        assert_eq!(decision_for(&plan, "handmade").decision, Decision::Keep);
    }

    #[test]
    fn managed_resource_resyncs_when_template_changed() {
        let plan = plan(
            Some(&state(&[("kb", "v1")])),
            &state(&[("kb", "v1")]),
            &state(&[("kb", "v2")]),
        );
        let entry = decision_for(&plan, "kb");
        assert_eq!(entry.decision, Decision::Update);
        assert!(!entry.conflict);
    }

    #[test]
    fn managed_unchanged_resource_is_kept() {
        let plan = plan(
            Some(&state(&[("kb", "v1")])),
            &state(&[("kb", "v1")]),
            &state(&[("kb", "v1")]),
        );
        assert_eq!(decision_for(&plan, "kb").decision, Decision::Keep);
    }

    #[test]
    fn dropped_from_template_is_removed() {
        let plan = plan(
            Some(&state(&[("a", "1"), ("b", "2")])),
            &state(&[("a", "1"), ("b", "2")]),
            &state(&[("a", "1")]),
        );
        assert_eq!(decision_for(&plan, "a").decision, Decision::Keep);
        assert_eq!(decision_for(&plan, "b").decision, Decision::Remove);
    }

    #[test]
    fn externally_deleted_managed_resource_is_recreated() {
        let plan = plan(
            Some(&state(&[("kb", "v1")])),
            &ClassState::new(),
            &state(&[("kb", "v1")]),
        );
        assert_eq!(decision_for(&plan, "kb").decision, Decision::Add);
    }

    #[test]
    fn gone_everywhere_is_a_noop() {
        let plan = plan(
            Some(&state(&[("kb", "v1")])),
            &ClassState::new(),
            &ClassState::new(),
        );
        assert!(plan.entries.is_empty());
    }

    #[test]
    fn out_of_band_edit_flags_conflict_but_proceeds() {
        // Template still wants v2; live was hand-edited away from v1.
        let plan = plan(
            Some(&state(&[("kb", "v1")])),
            &state(&[("kb", "edited by hand")]),
            &state(&[("kb", "v2")]),
        );
        let entry = decision_for(&plan, "kb");
        assert_eq!(entry.decision, Decision::Update);
        assert!(entry.conflict);
    }

    #[test]
    fn baseline_free_merge_emits_no_removes() {
        // First apply to a pre-existing agent with hand-added resources.
        let plan = plan(
            None,
            &state(&[("user_tool", "x"), ("kb", "old")]),
            &state(&[("kb", "new")]),
        );
        assert_eq!(plan.count(Decision::Remove), 0);
        assert_eq!(decision_for(&plan, "user_tool").decision, Decision::Keep);
        assert_eq!(decision_for(&plan, "kb").decision, Decision::Update);
    }

    #[test]
    fn membership_only_entries_never_update() {
        let mut desired = ClassState::new();
        desired.insert_membership("web_search");
        let mut live = ClassState::new();
        live.insert_membership("web_search");

        let plan = plan(Some(&ClassState::new()), &live, &desired);
        assert_eq!(decision_for(&plan, "web_search").decision, Decision::Keep);
    }

    #[test]
    fn unknown_live_content_compares_against_baseline() {
        // Tool source not exposed by the server; template changed it.
        let mut live = ClassState::new();
        live.insert_membership("summarize");

        let plan = plan(
            Some(&state(&[("summarize", "v1")])),
            &live,
            &state(&[("summarize", "v2")]),
        );
        assert_eq!(decision_for(&plan, "summarize").decision, Decision::Update);
    }

    #[test]
    fn idempotent_second_apply_is_all_keep() {
        let applied = state(&[("kb", "v1"), ("persona", "p")]);
        let plan = plan(Some(&applied), &applied, &applied);
        assert!(plan.is_noop());
    }
}

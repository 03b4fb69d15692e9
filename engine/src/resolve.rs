//! Conflict resolution strategies.
//!
//! Resolution is total: every input produces a winning (or merged) snapshot,
//! malformed payloads degrade to last-write-wins, and the manual strategy
//! defers to an out-of-band queue instead of guessing. Every resolution is
//! recorded in a bounded history for diagnostics.

use crate::{ConflictCase, RecordId, RecordSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Maximum number of resolutions kept in the history, most recent first.
pub const HISTORY_CAP: usize = 100;

/// Policy used to pick (or merge) a winning version for a conflict case.
///
/// Unknown strategy names deserialize to [`ResolutionStrategy::LastWriteWins`],
/// the safest default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum ResolutionStrategy {
    /// Higher modification timestamp wins, remote wins ties (default)
    #[default]
    LastWriteWins,
    /// Merge per field according to a [`FieldMergeConfig`]
    FieldMerge,
    /// The local version wins unconditionally
    LocalWins,
    /// The remote version wins unconditionally
    RemoteWins,
    /// Never auto-resolve; enqueue for human review and keep the local version
    Manual,
}

impl From<String> for ResolutionStrategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "field-merge" => ResolutionStrategy::FieldMerge,
            "local-wins" => ResolutionStrategy::LocalWins,
            "remote-wins" => ResolutionStrategy::RemoteWins,
            "manual" => ResolutionStrategy::Manual,
            // "last-write-wins" and anything unrecognized
            _ => ResolutionStrategy::LastWriteWins,
        }
    }
}

/// Per-field policy for the field-merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldPolicy {
    /// Take the local value
    Local,
    /// Take the remote value (default)
    #[default]
    Remote,
    /// Take whichever side has the newer per-field timestamp; falls back to
    /// remote when either side lacks one
    Newer,
    /// Union both array values, de-duplicated
    MergeArrays,
}

/// Field-level configuration for [`ResolutionStrategy::FieldMerge`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMergeConfig {
    /// Policy for fields without an explicit entry
    pub default_policy: FieldPolicy,
    /// Per-field overrides
    pub fields: HashMap<String, FieldPolicy>,
}

impl FieldMergeConfig {
    /// Config using the default (remote-wins) policy for every field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for one field.
    pub fn with_field(mut self, field: impl Into<String>, policy: FieldPolicy) -> Self {
        self.fields.insert(field.into(), policy);
        self
    }

    /// Set the policy for fields without an explicit entry.
    pub fn with_default(mut self, policy: FieldPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    fn policy_for(&self, field: &str) -> FieldPolicy {
        self.fields.get(field).copied().unwrap_or(self.default_policy)
    }
}

/// The strategy that actually produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppliedStrategy {
    LastWriteWins,
    FieldMerge,
    LocalWins,
    RemoteWins,
    Manual,
    /// A per-document-type resolver registered by the caller
    Custom,
}

impl From<ResolutionStrategy> for AppliedStrategy {
    fn from(strategy: ResolutionStrategy) -> Self {
        match strategy {
            ResolutionStrategy::LastWriteWins => AppliedStrategy::LastWriteWins,
            ResolutionStrategy::FieldMerge => AppliedStrategy::FieldMerge,
            ResolutionStrategy::LocalWins => AppliedStrategy::LocalWins,
            ResolutionStrategy::RemoteWins => AppliedStrategy::RemoteWins,
            ResolutionStrategy::Manual => AppliedStrategy::Manual,
        }
    }
}

/// A resolved conflict, kept in the diagnostics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConflict {
    /// Record ID the conflict was about
    pub id: RecordId,
    /// The winning (or merged) snapshot
    pub snapshot: RecordSnapshot,
    /// Strategy that produced the resolution
    pub strategy: AppliedStrategy,
    /// The case as detected
    pub case: ConflictCase,
}

/// A caller-registered resolver for one document type.
pub type CustomResolver = Box<dyn Fn(&ConflictCase) -> RecordSnapshot + Send + Sync>;

/// Strategy-driven conflict resolver.
///
/// Owns the manual-resolution queue and the bounded resolution history.
/// Construct one per process (or per test) and share it; there is no global
/// instance.
#[derive(Default)]
pub struct Resolver {
    custom: HashMap<String, CustomResolver>,
    queue: Vec<ConflictCase>,
    history: VecDeque<ResolvedConflict>,
}

impl Resolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom resolver for a document type.
    ///
    /// Consulted before the generic strategies whenever a case carries a
    /// matching `doc_type`. Registering again for the same type replaces the
    /// previous resolver.
    pub fn register_resolver(
        &mut self,
        doc_type: impl Into<String>,
        resolver: CustomResolver,
    ) {
        self.custom.insert(doc_type.into(), resolver);
    }

    /// Resolve a conflict case with the given strategy.
    ///
    /// Never fails. The manual strategy returns the local snapshot unchanged
    /// and enqueues the case for out-of-band resolution; every other path
    /// picks or merges a winner. All resolutions land in the history.
    pub fn resolve(
        &mut self,
        case: ConflictCase,
        strategy: ResolutionStrategy,
        field_config: Option<&FieldMergeConfig>,
    ) -> RecordSnapshot {
        if let Some(custom) = case.doc_type.as_ref().and_then(|t| self.custom.get(t)) {
            let snapshot = custom(&case);
            self.push_history(snapshot.clone(), AppliedStrategy::Custom, case);
            return snapshot;
        }

        let snapshot = match strategy {
            ResolutionStrategy::LastWriteWins => last_write_wins(&case.local, &case.remote),
            ResolutionStrategy::LocalWins => case.local.clone(),
            ResolutionStrategy::RemoteWins => case.remote.clone(),
            ResolutionStrategy::FieldMerge => {
                field_merge(&case.local, &case.remote, field_config)
            }
            ResolutionStrategy::Manual => {
                self.enqueue_case(case.clone());
                case.local.clone()
            }
        };

        self.push_history(snapshot.clone(), strategy.into(), case);
        snapshot
    }

    /// Add a case to the manual-resolution queue.
    ///
    /// Returns false (and keeps the existing entry) if a case with the same
    /// record ID is already queued.
    pub fn enqueue_case(&mut self, case: ConflictCase) -> bool {
        if self.queue.iter().any(|c| c.id == case.id) {
            return false;
        }
        self.queue.push(case);
        true
    }

    /// Remove and return a queued case by record ID.
    pub fn remove_case(&mut self, id: &str) -> Option<ConflictCase> {
        let index = self.queue.iter().position(|c| c.id == id)?;
        Some(self.queue.remove(index))
    }

    /// Cases awaiting manual resolution, oldest first.
    pub fn queued_cases(&self) -> &[ConflictCase] {
        &self.queue
    }

    /// Drop all queued cases.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Resolution history, most recent first, capped at [`HISTORY_CAP`].
    pub fn history(&self) -> &VecDeque<ResolvedConflict> {
        &self.history
    }

    fn push_history(
        &mut self,
        snapshot: RecordSnapshot,
        strategy: AppliedStrategy,
        case: ConflictCase,
    ) {
        self.history.push_front(ResolvedConflict {
            id: case.id.clone(),
            snapshot,
            strategy,
            case,
        });
        self.history.truncate(HISTORY_CAP);
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("custom_types", &self.custom.keys().collect::<Vec<_>>())
            .field("queued", &self.queue.len())
            .field("history", &self.history.len())
            .finish()
    }
}

/// Pick the side with the newer modification timestamp; remote wins ties and
/// wins whenever either timestamp is missing.
pub fn last_write_wins(local: &RecordSnapshot, remote: &RecordSnapshot) -> RecordSnapshot {
    match (local.updated_at(), remote.updated_at()) {
        (Some(local_at), Some(remote_at)) if local_at > remote_at => local.clone(),
        _ => remote.clone(),
    }
}

/// Merge two snapshots field by field according to the config.
///
/// Non-object payloads cannot be merged per field and degrade to
/// last-write-wins.
pub fn field_merge(
    local: &RecordSnapshot,
    remote: &RecordSnapshot,
    config: Option<&FieldMergeConfig>,
) -> RecordSnapshot {
    let default_config = FieldMergeConfig::default();
    let config = config.unwrap_or(&default_config);

    let (Some(local_obj), Some(remote_obj)) = (local.data.as_object(), remote.data.as_object())
    else {
        return last_write_wins(local, remote);
    };

    let mut merged = serde_json::Map::new();
    for field in field_union(local_obj, remote_obj) {
        let local_value = local_obj.get(&field);
        let remote_value = remote_obj.get(&field);

        let value = match config.policy_for(&field) {
            FieldPolicy::Local => local_value.or(remote_value).cloned(),
            FieldPolicy::Remote => remote_value.or(local_value).cloned(),
            FieldPolicy::Newer => pick_newer(local, remote, &field),
            FieldPolicy::MergeArrays => merge_arrays(local_value, remote_value)
                .or_else(|| remote_value.or(local_value).cloned()),
        };

        if let Some(value) = value {
            merged.insert(field, value);
        }
    }

    RecordSnapshot::new(local.id.clone(), serde_json::Value::Object(merged))
}

fn field_union(
    local: &serde_json::Map<String, serde_json::Value>,
    remote: &serde_json::Map<String, serde_json::Value>,
) -> Vec<String> {
    let mut fields: Vec<String> = local.keys().cloned().collect();
    for key in remote.keys() {
        if !local.contains_key(key) {
            fields.push(key.clone());
        }
    }
    fields
}

fn pick_newer(
    local: &RecordSnapshot,
    remote: &RecordSnapshot,
    field: &str,
) -> Option<serde_json::Value> {
    match (local.field_updated_at(field), remote.field_updated_at(field)) {
        (Some(local_at), Some(remote_at)) if local_at > remote_at => {
            local.field(field).or_else(|| remote.field(field)).cloned()
        }
        _ => remote.field(field).or_else(|| local.field(field)).cloned(),
    }
}

fn merge_arrays(
    local: Option<&serde_json::Value>,
    remote: Option<&serde_json::Value>,
) -> Option<serde_json::Value> {
    let local_items = local?.as_array()?;
    let remote_items = remote?.as_array()?;

    let mut merged = local_items.clone();
    for item in remote_items {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    Some(serde_json::Value::Array(merged))
}

/// Three-way merge of two divergent versions against their common ancestor.
///
/// Per field: a change on only one side is taken; identical changes are
/// taken; divergent changes fall back to last-write-wins for that field
/// alone (per-field timestamps when both sides expose them, else the remote
/// value). Non-object inputs degrade to record-level last-write-wins.
///
/// Intended for manual reconciliation tooling, not the hot path.
pub fn three_way_merge(
    base: &RecordSnapshot,
    local: &RecordSnapshot,
    remote: &RecordSnapshot,
) -> RecordSnapshot {
    let (Some(base_obj), Some(local_obj), Some(remote_obj)) = (
        base.data.as_object(),
        local.data.as_object(),
        remote.data.as_object(),
    ) else {
        return last_write_wins(local, remote);
    };

    let mut fields: Vec<String> = base_obj.keys().cloned().collect();
    for key in local_obj.keys().chain(remote_obj.keys()) {
        if !fields.iter().any(|f| f == key) {
            fields.push(key.clone());
        }
    }

    let mut merged = serde_json::Map::new();
    for field in fields {
        let base_value = base_obj.get(&field);
        let local_value = local_obj.get(&field);
        let remote_value = remote_obj.get(&field);

        let local_changed = local_value != base_value;
        let remote_changed = remote_value != base_value;

        let value = match (local_changed, remote_changed) {
            (false, false) => base_value.cloned(),
            (true, false) => local_value.cloned(),
            (false, true) => remote_value.cloned(),
            (true, true) if local_value == remote_value => local_value.cloned(),
            (true, true) => pick_newer(local, remote, &field),
        };

        if let Some(value) = value {
            merged.insert(field, value);
        }
    }

    RecordSnapshot::new(local.id.clone(), serde_json::Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConflictKind, DEFAULT_COLLISION_WINDOW_MS};
    use serde_json::json;

    fn case(local: serde_json::Value, remote: serde_json::Value) -> ConflictCase {
        ConflictCase::new(
            ConflictKind::UpdateUpdate,
            RecordSnapshot::new("r1", local),
            RecordSnapshot::new("r1", remote),
            1_000,
        )
    }

    #[test]
    fn lww_newer_remote_wins() {
        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            case(
                json!({"value": "A", "updatedAt": 1_000}),
                json!({"value": "B", "updatedAt": 2_000}),
            ),
            ResolutionStrategy::LastWriteWins,
            None,
        );
        assert_eq!(resolved.data["value"], "B");
    }

    #[test]
    fn lww_newer_local_wins() {
        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            case(
                json!({"value": "A", "updatedAt": 3_000}),
                json!({"value": "B", "updatedAt": 2_000}),
            ),
            ResolutionStrategy::LastWriteWins,
            None,
        );
        assert_eq!(resolved.data["value"], "A");
    }

    #[test]
    fn lww_remote_wins_ties_and_missing_timestamps() {
        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            case(
                json!({"value": "A", "updatedAt": 2_000}),
                json!({"value": "B", "updatedAt": 2_000}),
            ),
            ResolutionStrategy::LastWriteWins,
            None,
        );
        assert_eq!(resolved.data["value"], "B");

        let resolved = resolver.resolve(
            case(json!({"value": "A"}), json!({"value": "B"})),
            ResolutionStrategy::LastWriteWins,
            None,
        );
        assert_eq!(resolved.data["value"], "B");
    }

    #[test]
    fn local_and_remote_wins() {
        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            case(json!({"v": "local"}), json!({"v": "remote"})),
            ResolutionStrategy::LocalWins,
            None,
        );
        assert_eq!(resolved.data["v"], "local");

        let resolved = resolver.resolve(
            case(json!({"v": "local"}), json!({"v": "remote"})),
            ResolutionStrategy::RemoteWins,
            None,
        );
        assert_eq!(resolved.data["v"], "remote");
    }

    #[test]
    fn field_merge_policies() {
        let mut resolver = Resolver::new();
        let config = FieldMergeConfig::new()
            .with_field("title", FieldPolicy::Local)
            .with_field("body", FieldPolicy::Remote);

        let resolved = resolver.resolve(
            case(
                json!({"title": "mine", "body": "old", "extra": 1}),
                json!({"title": "theirs", "body": "new"}),
            ),
            ResolutionStrategy::FieldMerge,
            Some(&config),
        );

        assert_eq!(resolved.data["title"], "mine");
        assert_eq!(resolved.data["body"], "new");
        // default policy is remote, but the field only exists locally
        assert_eq!(resolved.data["extra"], 1);
    }

    #[test]
    fn field_merge_newer_uses_field_timestamps() {
        let mut resolver = Resolver::new();
        let config = FieldMergeConfig::new().with_field("title", FieldPolicy::Newer);

        let resolved = resolver.resolve(
            case(
                json!({"title": "mine", "fieldTimestamps": {"title": 5_000}}),
                json!({"title": "theirs", "fieldTimestamps": {"title": 2_000}}),
            ),
            ResolutionStrategy::FieldMerge,
            Some(&config),
        );
        assert_eq!(resolved.data["title"], "mine");

        // Without both timestamps the remote side is taken.
        let resolved = resolver.resolve(
            case(json!({"title": "mine"}), json!({"title": "theirs"})),
            ResolutionStrategy::FieldMerge,
            Some(&config),
        );
        assert_eq!(resolved.data["title"], "theirs");
    }

    #[test]
    fn field_merge_array_union() {
        let mut resolver = Resolver::new();
        let config = FieldMergeConfig::new().with_field("tags", FieldPolicy::MergeArrays);

        let resolved = resolver.resolve(
            case(json!({"tags": [1, 2]}), json!({"tags": [2, 3]})),
            ResolutionStrategy::FieldMerge,
            Some(&config),
        );

        let tags = resolved.data["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 3);
        for expected in [json!(1), json!(2), json!(3)] {
            assert!(tags.contains(&expected));
        }
    }

    #[test]
    fn field_merge_non_object_degrades_to_lww() {
        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            case(json!("scalar"), json!({"value": "B", "updatedAt": 2_000})),
            ResolutionStrategy::FieldMerge,
            None,
        );
        assert_eq!(resolved.data["value"], "B");
    }

    #[test]
    fn manual_returns_local_and_enqueues_once() {
        let mut resolver = Resolver::new();
        let first = case(json!({"v": "local"}), json!({"v": "remote"}));
        let duplicate = first.clone();

        let resolved = resolver.resolve(first, ResolutionStrategy::Manual, None);
        assert_eq!(resolved.data["v"], "local");
        assert_eq!(resolver.queued_cases().len(), 1);

        resolver.resolve(duplicate, ResolutionStrategy::Manual, None);
        assert_eq!(resolver.queued_cases().len(), 1);
    }

    #[test]
    fn queue_management() {
        let mut resolver = Resolver::new();
        resolver.enqueue_case(case(json!({"v": 1}), json!({"v": 2})));
        assert!(resolver.remove_case("r1").is_some());
        assert!(resolver.remove_case("r1").is_none());

        resolver.enqueue_case(case(json!({"v": 1}), json!({"v": 2})));
        resolver.clear_queue();
        assert!(resolver.queued_cases().is_empty());
    }

    #[test]
    fn custom_resolver_consulted_first() {
        let mut resolver = Resolver::new();
        resolver.register_resolver(
            "notes",
            Box::new(|case| RecordSnapshot::new(case.id.clone(), json!({"v": "custom"}))),
        );

        let typed = case(json!({"v": "local"}), json!({"v": "remote"})).with_doc_type("notes");
        let resolved = resolver.resolve(typed, ResolutionStrategy::RemoteWins, None);
        assert_eq!(resolved.data["v"], "custom");
        assert_eq!(resolver.history()[0].strategy, AppliedStrategy::Custom);

        // Other doc types still use the generic strategies.
        let untyped = case(json!({"v": "local"}), json!({"v": "remote"})).with_doc_type("tasks");
        let resolved = resolver.resolve(untyped, ResolutionStrategy::RemoteWins, None);
        assert_eq!(resolved.data["v"], "remote");
    }

    #[test]
    fn history_capped_most_recent_first() {
        let mut resolver = Resolver::new();
        for i in 0..(HISTORY_CAP + 5) {
            let mut c = case(json!({"v": "local"}), json!({"v": i}));
            c.id = format!("r{}", i);
            resolver.resolve(c, ResolutionStrategy::RemoteWins, None);
        }

        assert_eq!(resolver.history().len(), HISTORY_CAP);
        assert_eq!(resolver.history()[0].id, format!("r{}", HISTORY_CAP + 4));
        // The oldest entries were evicted.
        assert!(resolver.history().iter().all(|r| r.id != "r0"));
    }

    #[test]
    fn unknown_strategy_string_falls_back_to_lww() {
        let strategy: ResolutionStrategy =
            serde_json::from_str("\"definitely-not-a-strategy\"").unwrap();
        assert_eq!(strategy, ResolutionStrategy::LastWriteWins);

        let strategy: ResolutionStrategy = serde_json::from_str("\"field-merge\"").unwrap();
        assert_eq!(strategy, ResolutionStrategy::FieldMerge);
    }

    #[test]
    fn three_way_one_side_changed() {
        let base = RecordSnapshot::new("r1", json!({"a": 1, "b": 1}));
        let local = RecordSnapshot::new("r1", json!({"a": 2, "b": 1}));
        let remote = RecordSnapshot::new("r1", json!({"a": 1, "b": 3}));

        let merged = three_way_merge(&base, &local, &remote);
        assert_eq!(merged.data["a"], 2);
        assert_eq!(merged.data["b"], 3);
    }

    #[test]
    fn three_way_same_change_taken_once() {
        let base = RecordSnapshot::new("r1", json!({"a": 1}));
        let local = RecordSnapshot::new("r1", json!({"a": 7}));
        let remote = RecordSnapshot::new("r1", json!({"a": 7}));

        let merged = three_way_merge(&base, &local, &remote);
        assert_eq!(merged.data["a"], 7);
    }

    #[test]
    fn three_way_divergent_field_falls_back_per_field() {
        let base = RecordSnapshot::new("r1", json!({"a": 1}));
        let local = RecordSnapshot::new("r1", json!({"a": 2, "fieldTimestamps": {"a": 9_000}}));
        let remote = RecordSnapshot::new("r1", json!({"a": 3, "fieldTimestamps": {"a": 4_000}}));

        let merged = three_way_merge(&base, &local, &remote);
        assert_eq!(merged.data["a"], 2);

        // No timestamps anywhere: remote value for the contested field only.
        let local = RecordSnapshot::new("r1", json!({"a": 2, "b": 5}));
        let remote = RecordSnapshot::new("r1", json!({"a": 3, "b": 5}));
        let base = RecordSnapshot::new("r1", json!({"a": 1, "b": 5}));
        let merged = three_way_merge(&base, &local, &remote);
        assert_eq!(merged.data["a"], 3);
        assert_eq!(merged.data["b"], 5);
    }

    #[test]
    fn three_way_local_removal_preserved() {
        let base = RecordSnapshot::new("r1", json!({"a": 1, "b": 2}));
        let local = RecordSnapshot::new("r1", json!({"a": 1}));
        let remote = RecordSnapshot::new("r1", json!({"a": 1, "b": 2}));

        let merged = three_way_merge(&base, &local, &remote);
        assert!(merged.data.get("b").is_none());
    }

    #[test]
    fn detection_and_resolution_roundtrip() {
        let local = RecordSnapshot::new("r1", json!({"v": "A", "updatedAt": 10_000}));
        let remote = RecordSnapshot::new("r1", json!({"v": "B", "updatedAt": 10_400}));
        assert!(crate::detect_conflict(
            &local,
            &remote,
            None,
            DEFAULT_COLLISION_WINDOW_MS
        ));

        let mut resolver = Resolver::new();
        let resolved = resolver.resolve(
            ConflictCase::new(ConflictKind::UpdateUpdate, local, remote, 10_500),
            ResolutionStrategy::LastWriteWins,
            None,
        );
        assert_eq!(resolved.data["v"], "B");
        assert_eq!(resolver.history().len(), 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_object() -> impl Strategy<Value = serde_json::Value> {
            proptest::collection::hash_map("[a-c]", 0i64..5, 0..4).prop_map(|m| {
                serde_json::Value::Object(
                    m.into_iter().map(|(k, v)| (k, serde_json::json!(v))).collect(),
                )
            })
        }

        proptest! {
            #[test]
            fn three_way_merge_deterministic(
                base in arb_object(),
                local in arb_object(),
                remote in arb_object(),
            ) {
                let base = RecordSnapshot::new("r", base);
                let local = RecordSnapshot::new("r", local);
                let remote = RecordSnapshot::new("r", remote);

                let first = three_way_merge(&base, &local, &remote);
                let second = three_way_merge(&base, &local, &remote);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn three_way_merge_keeps_unchanged_side(
                base in arb_object(),
                local in arb_object(),
            ) {
                // Remote never diverged, so the merge equals the local edit.
                let base = RecordSnapshot::new("r", base.clone());
                let remote = RecordSnapshot::new("r", base.data.clone());
                let local = RecordSnapshot::new("r", local);

                let merged = three_way_merge(&base, &local, &remote);
                prop_assert_eq!(merged.data, local.data);
            }

            #[test]
            fn lww_always_picks_one_side(
                local_at in proptest::option::of(0u64..100_000),
                remote_at in proptest::option::of(0u64..100_000),
            ) {
                let mut local = serde_json::json!({"v": "local"});
                let mut remote = serde_json::json!({"v": "remote"});
                if let Some(at) = local_at {
                    local["updatedAt"] = serde_json::json!(at);
                }
                if let Some(at) = remote_at {
                    remote["updatedAt"] = serde_json::json!(at);
                }

                let local = RecordSnapshot::new("r", local);
                let remote = RecordSnapshot::new("r", remote);
                let winner = last_write_wins(&local, &remote);
                prop_assert!(winner == local || winner == remote);
            }
        }
    }
}

//! Conflict detection between local and remote record versions.
//!
//! Detection runs in one of three modes depending on what the snapshots
//! expose:
//!
//! 1. With a base snapshot: true concurrent-edit detection — conflict only
//!    if both sides diverged from the base.
//! 2. Without a base, both sides timestamped: a collision window heuristic —
//!    modifications within [`DEFAULT_COLLISION_WINDOW_MS`] of each other are
//!    treated as concurrent.
//! 3. Otherwise: plain structural inequality of the payloads.
//!
//! The collision window is a heuristic, not a correctness guarantee: two
//! genuinely sequential edits landing within the window are classified as
//! conflicting. The threshold is tunable for that reason.

use crate::{RecordId, RecordSnapshot, Timestamp};
use serde::{Deserialize, Serialize};

/// Default collision window for the timestamp heuristic, in milliseconds.
pub const DEFAULT_COLLISION_WINDOW_MS: u64 = 1_000;

/// What kind of concurrent modification produced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Both sides updated the record
    UpdateUpdate,
    /// One side deleted while the other updated
    DeleteUpdate,
    /// Both sides created the record independently
    CreateCreate,
}

/// A detected disagreement between a local and remote version of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCase {
    /// Record ID both versions refer to
    pub id: RecordId,
    /// Document type for per-type resolver lookup, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// The local (shadow) version
    pub local: RecordSnapshot,
    /// The incoming remote version
    pub remote: RecordSnapshot,
    /// Common ancestor, when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<RecordSnapshot>,
    /// What kind of concurrent modification this is
    pub kind: ConflictKind,
    /// When the conflict was detected (ms since epoch)
    pub detected_at: Timestamp,
}

impl ConflictCase {
    /// Build a conflict case for two concurrent versions of a record.
    pub fn new(
        kind: ConflictKind,
        local: RecordSnapshot,
        remote: RecordSnapshot,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            id: local.id.clone(),
            doc_type: None,
            local,
            remote,
            base: None,
            kind,
            detected_at,
        }
    }

    /// Attach a common-ancestor snapshot.
    pub fn with_base(mut self, base: RecordSnapshot) -> Self {
        self.base = Some(base);
        self
    }

    /// Attach a document type for per-type resolver lookup.
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

/// Decide whether two versions of a record are in conflict.
///
/// `window_ms` is the collision window for the no-base timestamp heuristic;
/// pass [`DEFAULT_COLLISION_WINDOW_MS`] unless the caller has tuned it.
/// If only one side carries a timestamp the window cannot be evaluated and
/// detection falls back to structural comparison.
pub fn detect_conflict(
    local: &RecordSnapshot,
    remote: &RecordSnapshot,
    base: Option<&RecordSnapshot>,
    window_ms: u64,
) -> bool {
    if let Some(base) = base {
        return local.data != base.data && remote.data != base.data;
    }

    match (local.updated_at(), remote.updated_at()) {
        (Some(local_at), Some(remote_at)) => within_window(local_at, remote_at, window_ms),
        _ => local.data != remote.data,
    }
}

fn within_window(a: Timestamp, b: Timestamp, window_ms: u64) -> bool {
    a.abs_diff(b) <= window_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(data: serde_json::Value) -> RecordSnapshot {
        RecordSnapshot::new("r1", data)
    }

    #[test]
    fn base_both_diverged() {
        let base = snap(json!({"v": 0}));
        let local = snap(json!({"v": 1}));
        let remote = snap(json!({"v": 2}));
        assert!(detect_conflict(
            &local,
            &remote,
            Some(&base),
            DEFAULT_COLLISION_WINDOW_MS
        ));
    }

    #[test]
    fn base_only_remote_diverged() {
        let base = snap(json!({"v": 0}));
        let local = snap(json!({"v": 0}));
        let remote = snap(json!({"v": 2}));
        assert!(!detect_conflict(
            &local,
            &remote,
            Some(&base),
            DEFAULT_COLLISION_WINDOW_MS
        ));
    }

    #[test]
    fn timestamps_inside_window() {
        let local = snap(json!({"v": 1, "updatedAt": 10_000}));
        let remote = snap(json!({"v": 2, "updatedAt": 10_800}));
        assert!(detect_conflict(&local, &remote, None, 1_000));
    }

    #[test]
    fn timestamps_outside_window() {
        let local = snap(json!({"v": 1, "updatedAt": 10_000}));
        let remote = snap(json!({"v": 2, "updatedAt": 12_500}));
        assert!(!detect_conflict(&local, &remote, None, 1_000));
    }

    #[test]
    fn window_is_tunable() {
        let local = snap(json!({"v": 1, "updatedAt": 10_000}));
        let remote = snap(json!({"v": 2, "updatedAt": 12_500}));
        assert!(detect_conflict(&local, &remote, None, 5_000));
    }

    #[test]
    fn no_timestamps_structural_inequality() {
        let local = snap(json!({"v": 1}));
        let remote = snap(json!({"v": 2}));
        assert!(detect_conflict(
            &local,
            &remote,
            None,
            DEFAULT_COLLISION_WINDOW_MS
        ));

        let same = snap(json!({"v": 1}));
        assert!(!detect_conflict(
            &local,
            &same,
            None,
            DEFAULT_COLLISION_WINDOW_MS
        ));
    }

    #[test]
    fn one_sided_timestamp_falls_back_to_structural() {
        let local = snap(json!({"v": 1, "updatedAt": 10_000}));
        let remote = snap(json!({"v": 1}));
        assert!(!detect_conflict(
            &local,
            &remote,
            None,
            DEFAULT_COLLISION_WINDOW_MS
        ));
    }

    #[test]
    fn kind_serialization() {
        let json = serde_json::to_string(&ConflictKind::UpdateUpdate).unwrap();
        assert_eq!(json, "\"update-update\"");
        let json = serde_json::to_string(&ConflictKind::CreateCreate).unwrap();
        assert_eq!(json, "\"create-create\"");
    }

    #[test]
    fn case_builder() {
        let case = ConflictCase::new(
            ConflictKind::UpdateUpdate,
            snap(json!({"v": 1})),
            snap(json!({"v": 2})),
            5_000,
        )
        .with_doc_type("items");

        assert_eq!(case.id, "r1");
        assert_eq!(case.doc_type.as_deref(), Some("items"));
        assert!(case.base.is_none());
        assert_eq!(case.detected_at, 5_000);
    }
}

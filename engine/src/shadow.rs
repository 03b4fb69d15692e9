//! Shadow state: the last-seen copy of each remote record.
//!
//! One shadow map per synchronized collection, owned by exactly one
//! orchestrator instance. The shadow is what incoming changes are compared
//! against to detect conflicts.

use crate::{RecordId, RecordSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Last-known-good snapshots of a collection's records, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowState {
    records: HashMap<RecordId, RecordSnapshot>,
}

impl ShadowState {
    /// Create an empty shadow map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shadow snapshot for a record.
    pub fn get(&self, id: &str) -> Option<&RecordSnapshot> {
        self.records.get(id)
    }

    /// Store or overwrite the shadow snapshot for a record.
    pub fn insert(&mut self, snapshot: RecordSnapshot) {
        self.records.insert(snapshot.id.clone(), snapshot);
    }

    /// Remove the shadow snapshot for a record.
    pub fn remove(&mut self, id: &str) -> Option<RecordSnapshot> {
        self.records.remove(id)
    }

    /// Whether a shadow snapshot exists for a record.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of shadowed records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are shadowed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every shadow entry.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Copy out the full map, id to snapshot.
    pub fn snapshot(&self) -> HashMap<RecordId, RecordSnapshot> {
        self.records.clone()
    }

    /// Iterate over the shadowed records.
    pub fn iter(&self) -> impl Iterator<Item = &RecordSnapshot> {
        self.records.values()
    }
}

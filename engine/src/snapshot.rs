//! Record snapshot types.
//!
//! A snapshot is the client's view of one record at a point in time: the
//! record id plus an opaque JSON payload. Conflict detection and resolution
//! operate on pairs (or triples) of snapshots without interpreting the
//! payload beyond two well-known timestamp conventions.

use crate::{RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Payload key holding the record-level modification time (ms since epoch).
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// Payload key holding the per-field modification times (ms since epoch).
pub const FIELD_TIMESTAMPS_KEY: &str = "fieldTimestamps";

/// A point-in-time view of a single record.
///
/// The payload is opaque JSON. Two conventions are recognized when present:
/// `data.updatedAt` (record modification time) and
/// `data.fieldTimestamps.<field>` (per-field modification times), both in
/// milliseconds since the epoch. Their absence is normal; the conflict
/// detector degrades to structural comparison without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    /// Record identifier within its collection
    pub id: RecordId,
    /// The record payload as last seen
    pub data: serde_json::Value,
}

impl RecordSnapshot {
    /// Create a snapshot from a record id and payload.
    pub fn new(id: impl Into<RecordId>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Record-level modification time, if the payload exposes one.
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.data.get(UPDATED_AT_KEY).and_then(as_timestamp)
    }

    /// Modification time of one field, if the payload exposes it.
    pub fn field_updated_at(&self, field: &str) -> Option<Timestamp> {
        self.data
            .get(FIELD_TIMESTAMPS_KEY)?
            .get(field)
            .and_then(as_timestamp)
    }

    /// The value of one payload field.
    pub fn field(&self, field: &str) -> Option<&serde_json::Value> {
        self.data.get(field)
    }

    /// Whether the payload is a JSON object (field-level operations apply).
    pub fn is_object(&self) -> bool {
        self.data.is_object()
    }
}

fn as_timestamp(value: &serde_json::Value) -> Option<Timestamp> {
    // Accept integer millis; a float timestamp is truncated.
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f as Timestamp))
}

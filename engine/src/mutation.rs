//! Typed mutation commands dispatched into the shared state container.
//!
//! Changes are expressed as tagged commands, not free-form action objects.
//! Every optimistic command carries its own rollback mutation, so undoing a
//! pending update never depends on naming conventions.

use crate::{CollectionName, RecordId, UpdateId};
use serde::{Deserialize, Serialize};

/// Replace the full value of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMutation {
    /// Target collection
    pub collection: CollectionName,
    /// Target record ID
    pub id: RecordId,
    /// New record value
    pub value: serde_json::Value,
}

/// Merge a set of fields into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMutation {
    /// Target collection
    pub collection: CollectionName,
    /// Target record ID
    pub id: RecordId,
    /// Fields to merge into the record value
    pub fields: serde_json::Value,
}

/// Remove a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMutation {
    /// Target collection
    pub collection: CollectionName,
    /// Target record ID
    pub id: RecordId,
}

/// A mutation of the shared state container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    Set(SetMutation),
    Patch(PatchMutation),
    Remove(RemoveMutation),
}

impl Mutation {
    /// Build a set mutation.
    pub fn set(
        collection: impl Into<CollectionName>,
        id: impl Into<RecordId>,
        value: serde_json::Value,
    ) -> Self {
        Mutation::Set(SetMutation {
            collection: collection.into(),
            id: id.into(),
            value,
        })
    }

    /// Build a patch mutation.
    pub fn patch(
        collection: impl Into<CollectionName>,
        id: impl Into<RecordId>,
        fields: serde_json::Value,
    ) -> Self {
        Mutation::Patch(PatchMutation {
            collection: collection.into(),
            id: id.into(),
            fields,
        })
    }

    /// Build a remove mutation.
    pub fn remove(collection: impl Into<CollectionName>, id: impl Into<RecordId>) -> Self {
        Mutation::Remove(RemoveMutation {
            collection: collection.into(),
            id: id.into(),
        })
    }

    /// Get the collection this mutation targets.
    pub fn collection(&self) -> &CollectionName {
        match self {
            Mutation::Set(m) => &m.collection,
            Mutation::Patch(m) => &m.collection,
            Mutation::Remove(m) => &m.collection,
        }
    }

    /// Get the record ID this mutation targets.
    pub fn record_id(&self) -> &RecordId {
        match self {
            Mutation::Set(m) => &m.id,
            Mutation::Patch(m) => &m.id,
            Mutation::Remove(m) => &m.id,
        }
    }
}

/// An optimistic command: the forward mutation paired with the mutation
/// that undoes it.
///
/// The rollback side is required up front. There is no way to register an
/// optimistic update the ledger cannot revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommand {
    /// Applied immediately when the update begins
    pub apply: Mutation,
    /// Applied if the update is rolled back
    pub rollback: Mutation,
}

impl UpdateCommand {
    /// Pair a forward mutation with its rollback.
    pub fn new(apply: Mutation, rollback: Mutation) -> Self {
        Self { apply, rollback }
    }
}

/// Provenance metadata attached to every dispatched mutation.
///
/// Carries enough information for downstream consumers to tell an
/// optimistic mutation from a confirmed one and to correlate a rollback
/// with the update it reverts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMeta {
    /// The pending update this mutation belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_id: Option<UpdateId>,
    /// True while the update is unconfirmed
    pub optimistic: bool,
    /// True for the synthesized undo of a failed update
    pub rollback: bool,
    /// The failure that triggered the rollback, if one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A mutation plus its provenance, as handed to the state container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchedMutation {
    /// The mutation to apply
    pub mutation: Mutation,
    /// Provenance metadata
    pub meta: DispatchMeta,
}

impl DispatchedMutation {
    /// A mutation dispatched outside any optimistic update.
    pub fn plain(mutation: Mutation) -> Self {
        Self {
            mutation,
            meta: DispatchMeta::default(),
        }
    }

    /// The optimistic application of a pending update.
    pub fn optimistic(mutation: Mutation, update_id: impl Into<UpdateId>) -> Self {
        Self {
            mutation,
            meta: DispatchMeta {
                update_id: Some(update_id.into()),
                optimistic: true,
                rollback: false,
                error: None,
            },
        }
    }

    /// The rollback of a pending update.
    pub fn rollback(
        mutation: Mutation,
        update_id: impl Into<UpdateId>,
        error: Option<String>,
    ) -> Self {
        Self {
            mutation,
            meta: DispatchMeta {
                update_id: Some(update_id.into()),
                optimistic: false,
                rollback: true,
                error,
            },
        }
    }
}

/// The seam to the shared state container.
///
/// The ledger never reads state back; it only pushes mutations through this
/// trait. Implementations dispatch into whatever state management the
/// application uses.
pub trait StateDispatch {
    /// Apply one mutation to the shared state.
    fn dispatch(&self, update: DispatchedMutation);
}

impl<T: StateDispatch + ?Sized> StateDispatch for &T {
    fn dispatch(&self, update: DispatchedMutation) {
        (**self).dispatch(update)
    }
}

impl<T: StateDispatch + ?Sized> StateDispatch for Box<T> {
    fn dispatch(&self, update: DispatchedMutation) {
        (**self).dispatch(update)
    }
}

impl<T: StateDispatch + ?Sized> StateDispatch for std::sync::Arc<T> {
    fn dispatch(&self, update: DispatchedMutation) {
        (**self).dispatch(update)
    }
}

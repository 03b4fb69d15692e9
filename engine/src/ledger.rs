//! The optimistic-update ledger.
//!
//! Tracks in-flight optimistic mutations and can confirm or roll them back.
//! The ledger applies mutations eagerly through its [`StateDispatch`] and
//! keeps just enough bookkeeping to undo each one: the update id and the
//! rollback command supplied at begin time.
//!
//! Unknown-id confirms and rollbacks are silent no-ops so that cleanup code
//! can be written without existence checks. The ledger does not serialize
//! updates against each other; callers performing several optimistic
//! updates on the same entity must serialize them themselves, or a late
//! rollback can revert a newer value.

use crate::{
    DispatchedMutation, StateDispatch, Timestamp, UpdateCommand, UpdateId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Lifecycle of a pending update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// Applied locally, not yet confirmed remotely
    Pending,
    /// Confirmed by the remote store
    Confirmed,
    /// Rolled back after a failure
    Failed,
}

/// One in-flight optimistic update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// Caller-chosen id, unique for the lifetime of the update
    pub id: UpdateId,
    /// The applied mutation and its rollback
    pub command: UpdateCommand,
    /// When the update was begun (ms since epoch)
    pub created_at: Timestamp,
    /// Current lifecycle state
    pub status: UpdateStatus,
}

/// An entry for [`UpdateLedger::begin_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    /// Update id
    pub id: UpdateId,
    /// The applied mutation and its rollback
    pub command: UpdateCommand,
}

impl BatchUpdate {
    /// Pair an update id with its command.
    pub fn new(id: impl Into<UpdateId>, command: UpdateCommand) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }
}

/// Registry of pending optimistic updates.
///
/// Owns the pending index exclusively; mutations flow out through the
/// injected dispatcher and nothing is ever read back. All methods are
/// synchronous except [`with_update`](UpdateLedger::with_update), which
/// suspends only while awaiting the caller's operation.
#[derive(Debug)]
pub struct UpdateLedger<D> {
    dispatch: D,
    pending: Vec<PendingUpdate>,
}

impl<D: StateDispatch> UpdateLedger<D> {
    /// Create a ledger that applies mutations through `dispatch`.
    pub fn new(dispatch: D) -> Self {
        Self {
            dispatch,
            pending: Vec::new(),
        }
    }

    /// Access the injected dispatcher.
    pub fn dispatcher(&self) -> &D {
        &self.dispatch
    }

    /// Begin an optimistic update: apply the forward mutation now and
    /// register it as pending.
    ///
    /// If `id` is already pending the mutation is still applied and the
    /// registered entry is replaced in place — last writer wins in the
    /// pending index, insertion position preserved.
    pub fn begin_update(
        &mut self,
        id: impl Into<UpdateId>,
        command: UpdateCommand,
        now: Timestamp,
    ) {
        let id = id.into();
        self.dispatch
            .dispatch(DispatchedMutation::optimistic(command.apply.clone(), id.clone()));

        let update = PendingUpdate {
            id,
            command,
            created_at: now,
            status: UpdateStatus::Pending,
        };
        match self.pending.iter_mut().find(|p| p.id == update.id) {
            Some(existing) => *existing = update,
            None => self.pending.push(update),
        }
    }

    /// Begin a batch of updates.
    ///
    /// All entries are applied and registered before this returns; each can
    /// afterwards be confirmed or rolled back independently.
    pub fn begin_batch(&mut self, entries: Vec<BatchUpdate>, now: Timestamp) {
        for entry in entries {
            self.begin_update(entry.id, entry.command, now);
        }
    }

    /// Confirm a pending update, removing it from the index.
    ///
    /// Returns the settled update, or `None` for an unknown id (silent
    /// no-op). Confirming twice is the same as confirming once.
    pub fn confirm_update(&mut self, id: &str) -> Option<PendingUpdate> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        let mut update = self.pending.remove(index);
        update.status = UpdateStatus::Confirmed;
        Some(update)
    }

    /// Roll back a pending update: apply its rollback mutation and remove
    /// it from the index.
    ///
    /// Returns the settled update, or `None` for an unknown id (silent
    /// no-op). Rolling back twice is the same as rolling back once.
    pub fn rollback_update(&mut self, id: &str, error: Option<String>) -> Option<PendingUpdate> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        let mut update = self.pending.remove(index);
        update.status = UpdateStatus::Failed;

        self.dispatch.dispatch(DispatchedMutation::rollback(
            update.command.rollback.clone(),
            update.id.clone(),
            error,
        ));
        Some(update)
    }

    /// Pending updates in insertion order.
    pub fn pending_updates(&self) -> &[PendingUpdate] {
        &self.pending
    }

    /// Whether an update with this id is pending.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|p| p.id == id)
    }

    /// Number of pending updates.
    pub fn queue_size(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending update WITHOUT rolling anything back.
    ///
    /// Dangerous: optimistic mutations already applied to shared state stay
    /// applied and can no longer be reverted through the ledger.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Run an operation under an optimistic update: begin, await the
    /// operation, confirm on success, roll back on failure.
    ///
    /// The operation's failure is returned to the caller after the rollback
    /// has been applied, so the caller always observes reverted state
    /// before handling the error.
    pub async fn with_update<T, E, Fut>(
        &mut self,
        id: impl Into<UpdateId>,
        command: UpdateCommand,
        now: Timestamp,
        operation: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let id = id.into();
        self.begin_update(id.clone(), command, now);

        match operation.await {
            Ok(value) => {
                self.confirm_update(&id);
                Ok(value)
            }
            Err(error) => {
                self.rollback_update(&id, Some(error.to_string()));
                Err(error)
            }
        }
    }
}

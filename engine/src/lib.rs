//! # Keel Engine
//!
//! The deterministic core of keel's client-side data synchronization.
//!
//! This crate holds the pieces that need no runtime: the optimistic-update
//! ledger, the conflict detector and resolver, typed mutation commands, and
//! the per-collection shadow state. The async orchestration around them
//! (change feeds, listener lifecycle, metrics) lives in `keel-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of transports, timers, or
//!   platform. Wall-clock timestamps are passed in by callers.
//! - **Total**: conflict detection and resolution never fail; malformed
//!   input degrades to the safest default (last-write-wins). Unknown-id
//!   confirms and rollbacks are silent no-ops.
//! - **No ambient state**: ledger, resolver, and shadow maps are plain
//!   constructed values, injected where needed.
//!
//! ## Core Concepts
//!
//! ### Optimistic updates
//!
//! A mutation is applied to shared state immediately and registered in the
//! [`UpdateLedger`] together with an explicit rollback mutation. When the
//! remote store confirms, the entry is dropped; when it fails, the rollback
//! is dispatched. [`UpdateLedger::with_update`] composes the whole cycle
//! around an async operation.
//!
//! ### Conflicts
//!
//! [`detect_conflict`] decides whether a local shadow copy and an incoming
//! remote version are concurrent edits — three-way against a base snapshot
//! when one is known, a tunable timestamp collision window otherwise. The
//! [`Resolver`] then picks or merges a winner using a
//! [`ResolutionStrategy`]; the manual strategy defers to a review queue
//! instead of guessing.
//!
//! ## Quick Start
//!
//! ```rust
//! use keel_engine::{
//!     detect_conflict, ConflictCase, ConflictKind, RecordSnapshot, Resolver,
//!     ResolutionStrategy, DEFAULT_COLLISION_WINDOW_MS,
//! };
//! use serde_json::json;
//!
//! let local = RecordSnapshot::new("doc-1", json!({"title": "draft", "updatedAt": 1000u64}));
//! let remote = RecordSnapshot::new("doc-1", json!({"title": "Draft!", "updatedAt": 1400u64}));
//!
//! assert!(detect_conflict(&local, &remote, None, DEFAULT_COLLISION_WINDOW_MS));
//!
//! let mut resolver = Resolver::new();
//! let case = ConflictCase::new(ConflictKind::UpdateUpdate, local, remote, 1500);
//! let winner = resolver.resolve(case, ResolutionStrategy::LastWriteWins, None);
//! assert_eq!(winner.data["title"], "Draft!");
//! ```

pub mod conflict;
pub mod ledger;
pub mod mutation;
pub mod resolve;
pub mod shadow;
pub mod snapshot;

// Re-export main types at crate root
pub use conflict::{detect_conflict, ConflictCase, ConflictKind, DEFAULT_COLLISION_WINDOW_MS};
pub use ledger::{BatchUpdate, PendingUpdate, UpdateLedger, UpdateStatus};
pub use mutation::{
    DispatchMeta, DispatchedMutation, Mutation, PatchMutation, RemoveMutation, SetMutation,
    StateDispatch, UpdateCommand,
};
pub use resolve::{
    field_merge, last_write_wins, three_way_merge, AppliedStrategy, CustomResolver,
    FieldMergeConfig, FieldPolicy, ResolutionStrategy, ResolvedConflict, Resolver, HISTORY_CAP,
};
pub use shadow::ShadowState;
pub use snapshot::{RecordSnapshot, FIELD_TIMESTAMPS_KEY, UPDATED_AT_KEY};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type UpdateId = String;
pub type Timestamp = u64;

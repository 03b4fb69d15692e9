//! # Keel Client
//!
//! The synchronization runtime around [`keel_engine`]: change-feed
//! subscriptions, per-collection orchestration, listener lifecycle, and
//! metrics.
//!
//! A typical setup wires four shared pieces into a [`SyncContext`] and
//! starts one [`CollectionSync`] per collection:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel_client::{
//!     shared_ledger, shared_resolver, CollectionSync, CollectionSyncOptions, FeedQuery,
//!     ListenerRegistry, MetricsCollector, NoopHandler, SyncContext,
//! };
//! use keel_engine::{DispatchedMutation, StateDispatch};
//!
//! struct Dispatcher;
//! impl StateDispatch for Dispatcher {
//!     fn dispatch(&self, update: DispatchedMutation) {
//!         // hand the mutation to the application's state container
//!         let _ = update;
//!     }
//! }
//!
//! # fn connect() -> Arc<dyn keel_client::ChangeFeed> { unimplemented!() }
//! # async fn run() -> keel_client::Result<()> {
//! let context = SyncContext {
//!     feed: connect(),
//!     ledger: shared_ledger(Arc::new(Dispatcher)),
//!     listeners: ListenerRegistry::new_shared(),
//!     metrics: MetricsCollector::new_shared(),
//!     resolver: shared_resolver(),
//! };
//!
//! let items = CollectionSync::start(
//!     context,
//!     FeedQuery::collection("items"),
//!     Box::new(NoopHandler),
//!     CollectionSyncOptions::default(),
//! )?;
//! assert!(items.is_listening());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod feed;
pub mod listeners;
pub mod metrics;
pub mod sync;

// Re-export main types at crate root
pub use error::{Result, SyncError};
pub use feed::{
    send_or_closed, subscription_channel, ChangeEvent, ChangeFeed, ChangeKind, Constraint,
    FeedMessage, FeedQuery, FeedSubscription, FilterOp, UnsubscribeHandle,
};
pub use listeners::{
    ListenerRegistry, ReconnectFn, ResourceKind, MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY_MS,
};
pub use metrics::{
    ErrorCount, MemoryProbe, MetricKind, MetricObserver, MetricSample, MetricsCollector,
    MetricsSnapshot, DEFAULT_WINDOW, LATENCY_TARGET_MS, SAMPLE_CAP,
};
pub use sync::{
    shared_ledger, shared_resolver, CollectionSync, CollectionSyncOptions, NoopHandler,
    SharedDispatch, SharedLedger, SharedResolver, SyncContext, SyncHandler, SyncStatus,
};

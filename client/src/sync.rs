//! Per-collection synchronization orchestrator.
//!
//! Each [`CollectionSync`] subscribes to the remote change feed for one
//! logical collection, classifies incoming changes, routes concurrent edits
//! through the conflict resolver, keeps a shadow copy of the collection,
//! and feeds the metrics collector. Transport failures schedule
//! reconnection through the listener registry; a handler failure on one
//! event never aborts the rest of its batch.

use crate::error::{Result, SyncError};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, FeedMessage, FeedQuery};
use crate::listeners::{ListenerRegistry, ReconnectFn, ResourceKind};
use crate::metrics::MetricsCollector;
use keel_engine::{
    detect_conflict, ConflictCase, ConflictKind, FieldMergeConfig, RecordId, RecordSnapshot,
    ResolutionStrategy, ResolvedConflict, Resolver, ShadowState, StateDispatch, UpdateCommand,
    UpdateLedger, DEFAULT_COLLISION_WINDOW_MS,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Lifecycle of one collection subscription.
///
/// `Unsubscribed → Subscribing → Active → Error → Reconnecting → Active`
/// (loop) `→ TornDown` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    Unsubscribed,
    Subscribing,
    Active,
    Error,
    Reconnecting,
    TornDown,
}

/// Callbacks invoked as remote changes land.
///
/// On a resolved conflict the callbacks receive the *resolved* snapshot,
/// not the raw remote data. A returned error is recorded and logged but
/// does not stop the batch.
pub trait SyncHandler: Send + Sync {
    fn on_added(&self, _snapshot: &RecordSnapshot) -> Result<()> {
        Ok(())
    }

    fn on_modified(&self, _snapshot: &RecordSnapshot) -> Result<()> {
        Ok(())
    }

    fn on_removed(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

/// A handler that ignores every change.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl SyncHandler for NoopHandler {}

/// Type-erased dispatcher into the shared state container.
pub type SharedDispatch = Arc<dyn StateDispatch + Send + Sync>;

/// The update ledger as shared across the runtime.
pub type SharedLedger = Arc<tokio::sync::Mutex<UpdateLedger<SharedDispatch>>>;

/// Wrap a dispatcher into a shareable ledger.
pub fn shared_ledger(dispatch: SharedDispatch) -> SharedLedger {
    Arc::new(tokio::sync::Mutex::new(UpdateLedger::new(dispatch)))
}

/// A resolver as shared across collection syncs.
pub type SharedResolver = Arc<Mutex<Resolver>>;

/// Wrap a fresh resolver for sharing.
pub fn shared_resolver() -> SharedResolver {
    Arc::new(Mutex::new(Resolver::new()))
}

/// The runtime pieces a collection sync plugs into.
#[derive(Clone)]
pub struct SyncContext {
    /// The remote change-feed transport
    pub feed: Arc<dyn ChangeFeed>,
    /// Ledger for optimistic updates
    pub ledger: SharedLedger,
    /// Listener lifecycle registry
    pub listeners: Arc<ListenerRegistry>,
    /// Metrics collector
    pub metrics: Arc<MetricsCollector>,
    /// Conflict resolver (shared so per-type resolvers register once)
    pub resolver: SharedResolver,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext").finish_non_exhaustive()
    }
}

/// Tuning knobs for one collection sync.
#[derive(Debug, Clone)]
pub struct CollectionSyncOptions {
    /// Strategy for resolving detected conflicts
    pub strategy: ResolutionStrategy,
    /// Field-level config for the field-merge strategy
    pub field_merge: Option<FieldMergeConfig>,
    /// Collision window for the no-base conflict heuristic (ms)
    pub collision_window_ms: u64,
    /// Listener registry key; derived from the collection when absent
    pub listener_key: Option<String>,
}

impl Default for CollectionSyncOptions {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::default(),
            field_merge: None,
            collision_window_ms: DEFAULT_COLLISION_WINDOW_MS,
            listener_key: None,
        }
    }
}

struct Inner {
    collection: String,
    listener_key: String,
    options: CollectionSyncOptions,
    query: FeedQuery,
    feed: Arc<dyn ChangeFeed>,
    ledger: SharedLedger,
    listeners: Arc<ListenerRegistry>,
    metrics: Arc<MetricsCollector>,
    resolver: Arc<Mutex<Resolver>>,
    handler: Box<dyn SyncHandler>,
    shadow: RwLock<ShadowState>,
    status: RwLock<SyncStatus>,
    resub_tx: mpsc::UnboundedSender<mpsc::UnboundedReceiver<FeedMessage>>,
}

impl Inner {
    fn status(&self) -> SyncStatus {
        *self.status.read()
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.write() = status;
    }

    fn process_batch(&self, batch: Vec<ChangeEvent>) {
        for event in batch {
            let op_id = uuid::Uuid::new_v4().to_string();
            let document_id = event.document_id.clone();

            self.metrics.start_tracking(&op_id, "change-event");
            let result = self.apply_event(event);
            match result {
                Ok(()) => {
                    self.metrics.end_tracking(&op_id, true, None);
                    self.metrics.increment_update_count(&self.collection);
                }
                Err(error) => {
                    let message = error.to_string();
                    self.metrics.end_tracking(&op_id, false, Some(&message));
                    self.metrics.track_error("change-event", &message);
                    tracing::warn!(
                        collection = %self.collection,
                        document_id = %document_id,
                        error = %message,
                        "change event failed, continuing with batch"
                    );
                }
            }
        }
    }

    fn apply_event(&self, event: ChangeEvent) -> Result<()> {
        let kind = event.kind;
        let snapshot = RecordSnapshot::new(event.document_id, event.data);

        match kind {
            ChangeKind::Added | ChangeKind::Modified => {
                // The shadow lock is released before resolution and the
                // handler call; handlers may read local_state().
                let conflicting = {
                    let shadow = self.shadow.read();
                    shadow
                        .get(&snapshot.id)
                        .filter(|local| {
                            detect_conflict(
                                local,
                                &snapshot,
                                None,
                                self.options.collision_window_ms,
                            )
                        })
                        .cloned()
                };

                let effective = match conflicting {
                    Some(local) => {
                        let conflict_kind = match kind {
                            ChangeKind::Added => ConflictKind::CreateCreate,
                            _ => ConflictKind::UpdateUpdate,
                        };
                        self.resolve_case(conflict_kind, local, snapshot)
                    }
                    None => snapshot,
                };

                self.shadow.write().insert(effective.clone());
                match kind {
                    ChangeKind::Added => self.handler.on_added(&effective),
                    _ => self.handler.on_modified(&effective),
                }
            }
            ChangeKind::Removed => {
                self.shadow.write().remove(&snapshot.id);
                self.handler.on_removed(&snapshot.id)
            }
        }
    }

    fn resolve_case(
        &self,
        kind: ConflictKind,
        local: RecordSnapshot,
        remote: RecordSnapshot,
    ) -> RecordSnapshot {
        let case = ConflictCase::new(kind, local, remote, now_ms())
            .with_doc_type(self.collection.clone());
        tracing::debug!(
            collection = %self.collection,
            id = %case.id,
            kind = ?kind,
            strategy = ?self.options.strategy,
            "conflict detected"
        );

        self.resolver
            .lock()
            .resolve(case, self.options.strategy, self.options.field_merge.as_ref())
    }

    fn handle_transport_error(&self, message: String) {
        {
            let mut status = self.status.write();
            // A close often follows an error event; schedule reconnection once.
            if matches!(
                *status,
                SyncStatus::Error | SyncStatus::Reconnecting | SyncStatus::TornDown
            ) {
                return;
            }
            *status = SyncStatus::Error;
        }

        self.metrics.track_error("change-feed", &message);
        tracing::warn!(
            collection = %self.collection,
            error = %message,
            "transport error, scheduling reconnection"
        );

        let feed = Arc::clone(&self.feed);
        let query = self.query.clone();
        let resub_tx = self.resub_tx.clone();
        let reconnect: ReconnectFn = Box::new(move || {
            let feed = Arc::clone(&feed);
            let query = query.clone();
            let resub_tx = resub_tx.clone();
            Box::pin(async move {
                let subscription = feed.subscribe(&query)?;
                resub_tx
                    .send(subscription.messages)
                    .map_err(|_| SyncError::SubscriptionClosed)?;
                Ok(subscription.handle)
            })
        });

        self.listeners.setup_reconnection(&self.listener_key, reconnect);
        self.set_status(SyncStatus::Reconnecting);
    }
}

/// Handle to one running collection sync.
pub struct CollectionSync {
    inner: Arc<Inner>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CollectionSync {
    /// Subscribe to a collection and start processing its change feed.
    ///
    /// The subscription's unsubscribe handle is registered with the listener
    /// registry under `options.listener_key` (or a key derived from the
    /// collection name).
    pub fn start(
        context: SyncContext,
        query: FeedQuery,
        handler: Box<dyn SyncHandler>,
        options: CollectionSyncOptions,
    ) -> Result<Self> {
        let collection = query.collection.clone();
        let listener_key = options
            .listener_key
            .clone()
            .unwrap_or_else(|| format!("collection-sync:{}", collection));

        let (resub_tx, resub_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            collection: collection.clone(),
            listener_key: listener_key.clone(),
            options,
            query,
            feed: context.feed,
            ledger: context.ledger,
            listeners: context.listeners,
            metrics: context.metrics,
            resolver: context.resolver,
            handler,
            shadow: RwLock::new(ShadowState::new()),
            status: RwLock::new(SyncStatus::Subscribing),
            resub_tx,
        });

        let subscription = inner.feed.subscribe(&inner.query)?;
        inner.listeners.register(
            listener_key,
            subscription.handle,
            collection,
            ResourceKind::Collection,
        );
        inner
            .metrics
            .track_listener_count(inner.listeners.listener_count());
        inner.set_status(SyncStatus::Active);

        let task = tokio::spawn(run_loop(Arc::clone(&inner), subscription.messages, resub_rx));
        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
        })
    }

    /// The collection this sync watches.
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Whether the change feed is currently being consumed.
    pub fn is_listening(&self) -> bool {
        self.inner.status() == SyncStatus::Active
    }

    /// Copy of the shadow state: record id to last-seen snapshot.
    pub fn local_state(&self) -> HashMap<RecordId, RecordSnapshot> {
        self.inner.shadow.read().snapshot()
    }

    /// Cases awaiting manual resolution.
    pub fn resolution_queue(&self) -> Vec<ConflictCase> {
        self.inner.resolver.lock().queued_cases().to_vec()
    }

    /// Recent resolutions, most recent first.
    pub fn resolution_history(&self) -> Vec<ResolvedConflict> {
        self.inner.resolver.lock().history().iter().cloned().collect()
    }

    /// Run an operation under an optimistic update scoped to this
    /// collection: apply now, confirm on success, roll back on failure.
    ///
    /// The update id is generated, the propagation time (local apply to
    /// settlement) is recorded, and the operation's error is returned after
    /// the rollback has been applied.
    pub async fn perform_optimistic_update<T, E>(
        &self,
        command: UpdateCommand,
        operation: impl Future<Output = std::result::Result<T, E>>,
    ) -> std::result::Result<T, E>
    where
        E: fmt::Display,
    {
        let update_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();

        // Same cycle as UpdateLedger::with_update, but the ledger lock must
        // not be held across the operation await: updates with distinct ids
        // stay concurrent.
        {
            let mut ledger = self.inner.ledger.lock().await;
            ledger.begin_update(update_id.clone(), command, now_ms());
        }

        let result = operation.await;

        {
            let mut ledger = self.inner.ledger.lock().await;
            match &result {
                Ok(_) => {
                    ledger.confirm_update(&update_id);
                }
                Err(error) => {
                    ledger.rollback_update(&update_id, Some(error.to_string()));
                }
            }
        }

        self.inner.metrics.track_update_propagation(
            &self.inner.collection,
            started.elapsed().as_secs_f64() * 1_000.0,
        );
        result
    }

    /// Tear the sync down: unregister the listener, discard the shadow
    /// state, and stop the event loop. Terminal.
    pub fn stop(&self) {
        self.inner.set_status(SyncStatus::TornDown);
        self.inner.listeners.unregister(&self.inner.listener_key);
        self.inner
            .metrics
            .track_listener_count(self.inner.listeners.listener_count());
        self.inner.shadow.write().clear();

        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        tracing::info!(collection = %self.inner.collection, "collection sync torn down");
    }
}

impl fmt::Debug for CollectionSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSync")
            .field("collection", &self.inner.collection)
            .field("status", &self.inner.status())
            .finish()
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    mut current: mpsc::UnboundedReceiver<FeedMessage>,
    mut resub_rx: mpsc::UnboundedReceiver<mpsc::UnboundedReceiver<FeedMessage>>,
) {
    tracing::info!(collection = %inner.collection, "collection sync active");
    loop {
        tokio::select! {
            Some(fresh) = resub_rx.recv() => {
                current = fresh;
                inner.set_status(SyncStatus::Active);
                tracing::info!(collection = %inner.collection, "collection sync resubscribed");
            }
            message = current.recv() => match message {
                Some(FeedMessage::Changes(batch)) => inner.process_batch(batch),
                Some(FeedMessage::TransportError(error)) => inner.handle_transport_error(error),
                None => {
                    if inner.status() == SyncStatus::TornDown {
                        break;
                    }
                    inner.handle_transport_error("change feed closed".to_string());
                    // The dead receiver would spin; block until resubscribed.
                    match resub_rx.recv().await {
                        Some(fresh) => {
                            current = fresh;
                            inner.set_status(SyncStatus::Active);
                            tracing::info!(collection = %inner.collection, "collection sync resubscribed");
                        }
                        None => break,
                    }
                }
            },
        }
    }
    tracing::debug!(collection = %inner.collection, "collection sync loop exited");
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

//! Listener lifecycle registry.
//!
//! Tracks active change-feed subscriptions by key, with reference counting
//! so several consumers can share one subscription, and owns reconnection
//! timing when a transport drops.
//!
//! Thread-safe and shared across the runtime via `Arc`.

use crate::error::Result;
use crate::feed::UnsubscribeHandle;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Attempts before reconnection gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first reconnection attempt; doubles per attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// What kind of remote resource a listener watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Collection,
    Document,
    Query,
}

/// A registered listener.
struct ListenerEntry {
    handle: UnsubscribeHandle,
    resource_name: String,
    kind: ResourceKind,
    ref_count: usize,
}

/// Re-subscribe closure: called per reconnection attempt, returns the fresh
/// unsubscribe handle on success.
pub type ReconnectFn = Box<dyn Fn() -> BoxFuture<'static, Result<UnsubscribeHandle>> + Send + Sync>;

/// Keyed registry of active subscriptions.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: DashMap<String, ListenerEntry>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscription under a key.
    ///
    /// If the key is already registered the reference count is bumped and
    /// the redundant incoming handle is cancelled — two live subscriptions
    /// to the same resource would double-deliver.
    pub fn register(
        &self,
        key: impl Into<String>,
        handle: UnsubscribeHandle,
        resource_name: impl Into<String>,
        kind: ResourceKind,
    ) {
        let key = key.into();
        match self.entries.get_mut(&key) {
            Some(mut entry) => {
                entry.ref_count += 1;
                drop(entry);
                handle.cancel();
                tracing::debug!(key = %key, "listener already registered, bumped ref count");
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    ListenerEntry {
                        handle,
                        resource_name: resource_name.into(),
                        kind,
                        ref_count: 1,
                    },
                );
                tracing::info!(key = %key, "listener registered");
            }
        }
    }

    /// Release one reference to a key.
    ///
    /// When the last reference is released the entry is removed and the
    /// stored unsubscribe handle is invoked. Unknown keys are a no-op.
    pub fn unregister(&self, key: &str) {
        let remove = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.ref_count -= 1;
                entry.ref_count == 0
            }
            None => return,
        };

        if remove {
            if let Some((_, entry)) = self.entries.remove(key) {
                entry.handle.cancel();
                tracing::info!(key = %key, resource = %entry.resource_name, "listener unregistered");
            }
        }
    }

    /// Whether a key is registered.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct registered keys.
    pub fn listener_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of reference counts across all keys.
    pub fn total_ref_count(&self) -> usize {
        self.entries.iter().map(|e| e.ref_count).sum()
    }

    /// Resource kind registered under a key.
    pub fn resource_kind(&self, key: &str) -> Option<ResourceKind> {
        self.entries.get(key).map(|e| e.kind)
    }

    /// Swap in a fresh unsubscribe handle after a reconnect.
    ///
    /// The stale handle is dropped without being invoked (the old
    /// subscription died with the transport). If the key was unregistered
    /// in the meantime the fresh handle is cancelled instead, and false is
    /// returned.
    pub fn replace_handle(&self, key: &str, handle: UnsubscribeHandle) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.handle = handle;
                true
            }
            None => {
                handle.cancel();
                false
            }
        }
    }

    /// Arrange reconnection for a dropped subscription.
    ///
    /// Retries `reconnect` with exponential backoff until it yields a fresh
    /// handle or [`MAX_RECONNECT_ATTEMPTS`] is reached. The fresh handle
    /// replaces the stale one under `key`.
    pub fn setup_reconnection(
        self: &Arc<Self>,
        key: &str,
        reconnect: ReconnectFn,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let key = key.to_string();

        tokio::spawn(async move {
            let mut delay = Duration::from_millis(RECONNECT_BASE_DELAY_MS);
            for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
                tokio::time::sleep(delay).await;

                if !registry.has(&key) {
                    tracing::debug!(key = %key, "listener gone, abandoning reconnection");
                    return;
                }

                match reconnect().await {
                    Ok(handle) => {
                        registry.replace_handle(&key, handle);
                        tracing::info!(key = %key, attempt, "listener reconnected");
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(key = %key, attempt, error = %error, "reconnect attempt failed");
                        delay *= 2;
                    }
                }
            }
            tracing::error!(key = %key, "giving up on reconnection");
        })
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listener_count())
            .field("total_refs", &self.total_ref_count())
            .finish()
    }
}

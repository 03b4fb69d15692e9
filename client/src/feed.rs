//! Change-feed abstraction over the remote document store.
//!
//! The transport is consumed as an explicit stream: subscribing yields a
//! channel of change batches plus an unsubscribe handle. Delivery within one
//! subscription is ordered; nothing is buffered beyond the channel itself.
//! Reconnection is modeled as a restartable stream — a re-subscribe produces
//! a fresh [`FeedSubscription`] whose receiver replaces the dead one.

use crate::error::{Result, SyncError};
use keel_engine::RecordSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// What happened to a document in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// What happened
    pub kind: ChangeKind,
    /// Which document
    pub document_id: String,
    /// The document payload after the change (empty for removals)
    pub data: serde_json::Value,
}

impl ChangeEvent {
    /// An added-document event.
    pub fn added(document_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: ChangeKind::Added,
            document_id: document_id.into(),
            data,
        }
    }

    /// A modified-document event.
    pub fn modified(document_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: ChangeKind::Modified,
            document_id: document_id.into(),
            data,
        }
    }

    /// A removed-document event.
    pub fn removed(document_id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            document_id: document_id.into(),
            data: serde_json::Value::Null,
        }
    }

    /// View this event's payload as a record snapshot.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new(self.document_id.clone(), self.data.clone())
    }
}

/// Messages flowing out of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum FeedMessage {
    /// A batch of ordered change events
    Changes(Vec<ChangeEvent>),
    /// The transport failed; the subscription is dead
    TransportError(String),
}

/// Comparison operator for a query constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// One field filter on a subscription query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// Field the constraint applies to
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: serde_json::Value,
}

/// What to subscribe to: a collection, optionally filtered.
///
/// Constraints are interpreted by the transport; the core only carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    /// Logical collection name
    pub collection: String,
    /// Transport-interpreted field filters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl FeedQuery {
    /// Subscribe to a whole collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            constraints: Vec::new(),
        }
    }

    /// Add a field filter.
    pub fn with_constraint(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: serde_json::Value,
    ) -> Self {
        self.constraints.push(Constraint {
            field: field.into(),
            op,
            value,
        });
        self
    }
}

/// Cancels a live subscription when invoked.
///
/// Wraps the transport's teardown closure; safe to drop without calling
/// (the subscription then lives until the transport ends it).
pub struct UnsubscribeHandle(Option<Box<dyn FnOnce() + Send + Sync>>);

impl UnsubscribeHandle {
    /// Wrap a teardown closure.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// A handle that does nothing, for transports with no teardown.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Cancel the subscription.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl fmt::Debug for UnsubscribeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnsubscribeHandle")
            .field(&self.0.as_ref().map(|_| "fn").unwrap_or("noop"))
            .finish()
    }
}

/// A live subscription: the message stream plus its teardown handle.
#[derive(Debug)]
pub struct FeedSubscription {
    /// Ordered stream of feed messages
    pub messages: mpsc::UnboundedReceiver<FeedMessage>,
    /// Cancels the subscription at the transport
    pub handle: UnsubscribeHandle,
}

/// A remote change-feed transport.
///
/// Implementations bridge whatever wire protocol the document store speaks
/// into ordered [`FeedMessage`] delivery. Subscribing must be cheap enough
/// to repeat on reconnection.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for the given query.
    fn subscribe(&self, query: &FeedQuery) -> Result<FeedSubscription>;
}

/// Convenience for transports handing out channel pairs.
pub fn subscription_channel() -> (mpsc::UnboundedSender<FeedMessage>, FeedSubscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        FeedSubscription {
            messages: rx,
            handle: UnsubscribeHandle::noop(),
        },
    )
}

/// Map a send failure into the closed-subscription error.
pub fn send_or_closed(
    tx: &mpsc::UnboundedSender<FeedMessage>,
    message: FeedMessage,
) -> Result<()> {
    tx.send(message).map_err(|_| SyncError::SubscriptionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_constructors() {
        let event = ChangeEvent::added("x", json!({"name": "A"}));
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.snapshot().id, "x");
        assert_eq!(event.snapshot().data["name"], "A");

        let event = ChangeEvent::removed("x");
        assert_eq!(event.kind, ChangeKind::Removed);
        assert!(event.data.is_null());
    }

    #[test]
    fn message_serialization() {
        let msg = FeedMessage::Changes(vec![ChangeEvent::modified("x", json!({"v": 1}))]);
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(encoded.contains("\"type\":\"changes\""));
        assert!(encoded.contains("\"kind\":\"modified\""));

        let decoded: FeedMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn query_builder() {
        let query = FeedQuery::collection("items")
            .with_constraint("owner", FilterOp::Eq, json!("user-1"));
        assert_eq!(query.collection, "items");
        assert_eq!(query.constraints.len(), 1);

        let encoded = serde_json::to_string(&query).unwrap();
        assert!(encoded.contains("\"op\":\"eq\""));
    }

    #[test]
    fn unsubscribe_invokes_closure_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let handle = UnsubscribeHandle::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        UnsubscribeHandle::noop().cancel();
    }

    #[test]
    fn subscription_channel_delivers_in_order() {
        let (tx, mut sub) = subscription_channel();
        send_or_closed(&tx, FeedMessage::Changes(vec![ChangeEvent::removed("a")])).unwrap();
        send_or_closed(&tx, FeedMessage::TransportError("down".into())).unwrap();

        let first = sub.messages.try_recv().unwrap();
        assert!(matches!(first, FeedMessage::Changes(_)));
        let second = sub.messages.try_recv().unwrap();
        assert!(matches!(second, FeedMessage::TransportError(_)));
    }

    #[test]
    fn send_after_drop_reports_closed() {
        let (tx, sub) = subscription_channel();
        drop(sub);
        let err = send_or_closed(&tx, FeedMessage::Changes(vec![])).unwrap_err();
        assert!(matches!(err, SyncError::SubscriptionClosed));
    }
}

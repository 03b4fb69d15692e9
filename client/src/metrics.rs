//! Metrics collection for the synchronization runtime.
//!
//! Records latency samples, counters, and listener gauges into a bounded
//! ring buffer so the consistency/performance tradeoffs of the sync layer
//! stay observable. One collector instance per process (or per test),
//! shared via `Arc`; observers are notified synchronously on every sample.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ring buffer capacity; the oldest sample is evicted first.
pub const SAMPLE_CAP: usize = 1_000;

/// Operations slower than this are flagged and logged.
pub const LATENCY_TARGET_MS: f64 = 100.0;

/// Default sliding window for latency aggregates.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// What a sample measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    Latency,
    ListenerCount,
    Memory,
    UpdateCount,
    Error,
}

/// One recorded measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    /// Unique sample id
    pub id: String,
    /// What was measured
    pub kind: MetricKind,
    /// The measurement
    pub value: f64,
    /// When it was recorded (ms since epoch)
    pub timestamp: i64,
    /// Kind-specific context (label, collection, error text, ...)
    pub metadata: serde_json::Value,
}

/// Per-(context, message) error tally, as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCount {
    pub context: String,
    pub message: String,
    pub count: u64,
}

/// Snapshot of all aggregates, for diagnostics tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// When the snapshot was taken (ms since epoch)
    pub generated_at: i64,
    /// Samples currently held in the ring buffer
    pub sample_count: usize,
    /// Average latency over the default window, all labels
    pub average_latency_ms: Option<f64>,
    /// 95th-percentile latency over the default window, all labels
    pub p95_latency_ms: Option<f64>,
    /// Per-collection update counts
    pub update_counts: HashMap<String, u64>,
    /// Per-(context, message) error counts
    pub error_counts: Vec<ErrorCount>,
    /// Last reported listener gauge
    pub listener_count: usize,
    /// Last memory probe reading, if a probe is installed
    pub memory_bytes: Option<u64>,
}

/// Observer callback, invoked synchronously per recorded sample.
pub type MetricObserver = Box<dyn Fn(&MetricSample) + Send + Sync>;

/// Optional heap-usage probe; return `None` when the runtime cannot tell.
pub type MemoryProbe = Box<dyn Fn() -> Option<u64> + Send + Sync>;

struct LatencyTracker {
    label: String,
    started: Instant,
}

/// Collects and aggregates metric samples.
pub struct MetricsCollector {
    samples: Mutex<VecDeque<MetricSample>>,
    trackers: DashMap<String, LatencyTracker>,
    update_counts: DashMap<String, u64>,
    error_counts: DashMap<(String, String), u64>,
    listener_gauge: AtomicUsize,
    observers: Mutex<Vec<(u64, MetricObserver)>>,
    next_observer_id: AtomicU64,
    memory_probe: Option<MemoryProbe>,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(SAMPLE_CAP)),
            trackers: DashMap::new(),
            update_counts: DashMap::new(),
            error_counts: DashMap::new(),
            listener_gauge: AtomicUsize::new(0),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            memory_probe: None,
        }
    }

    /// Create a collector wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Install a heap-usage probe.
    pub fn with_memory_probe(mut self, probe: MemoryProbe) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    /// Begin timing an operation.
    ///
    /// Starting again under the same id restarts the timer.
    pub fn start_tracking(&self, op_id: impl Into<String>, label: impl Into<String>) {
        self.trackers.insert(
            op_id.into(),
            LatencyTracker {
                label: label.into(),
                started: Instant::now(),
            },
        );
    }

    /// Finish timing an operation and record the latency sample.
    ///
    /// Returns the elapsed milliseconds, or `None` (with a warning) when no
    /// matching start was recorded.
    pub fn end_tracking(&self, op_id: &str, success: bool, error: Option<&str>) -> Option<f64> {
        let Some((_, tracker)) = self.trackers.remove(op_id) else {
            tracing::warn!(op_id = %op_id, "latency tracking ended without a start");
            return None;
        };

        let elapsed_ms = tracker.started.elapsed().as_secs_f64() * 1_000.0;
        let exceeded = elapsed_ms > LATENCY_TARGET_MS;
        if exceeded {
            tracing::warn!(
                label = %tracker.label,
                elapsed_ms,
                target_ms = LATENCY_TARGET_MS,
                "operation exceeded latency target"
            );
        }

        self.record(
            MetricKind::Latency,
            elapsed_ms,
            json!({
                "label": tracker.label,
                "success": success,
                "error": error,
                "exceededTarget": exceeded,
            }),
        );
        Some(elapsed_ms)
    }

    /// Record how long an optimistic update took to propagate (local apply
    /// to remote confirmation).
    pub fn track_update_propagation(&self, collection: &str, elapsed_ms: f64) {
        self.record(
            MetricKind::Latency,
            elapsed_ms,
            json!({
                "label": "update-propagation",
                "collection": collection,
                "success": true,
                "exceededTarget": elapsed_ms > LATENCY_TARGET_MS,
            }),
        );
    }

    /// Average latency over a sliding window, optionally filtered by label.
    ///
    /// `None` when no sample falls inside the window.
    pub fn average_latency(&self, window: Duration, label: Option<&str>) -> Option<f64> {
        let values = self.latency_values(window, label);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Nearest-rank percentile latency over a sliding window, optionally
    /// filtered by label.
    pub fn percentile_latency(
        &self,
        percentile: f64,
        window: Duration,
        label: Option<&str>,
    ) -> Option<f64> {
        let mut values = self.latency_values(window, label);
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let rank = (percentile.clamp(0.0, 100.0) / 100.0 * values.len() as f64).ceil() as usize;
        Some(values[rank.max(1) - 1])
    }

    /// Bump the update counter for a collection; returns the new count.
    pub fn increment_update_count(&self, collection: &str) -> u64 {
        let count = {
            let mut entry = self.update_counts.entry(collection.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.record(
            MetricKind::UpdateCount,
            count as f64,
            json!({"collection": collection}),
        );
        count
    }

    /// Record an error occurrence under a (context, message) pair.
    pub fn track_error(&self, context: &str, message: &str) {
        {
            let mut entry = self
                .error_counts
                .entry((context.to_string(), message.to_string()))
                .or_insert(0);
            *entry += 1;
        }
        self.record(
            MetricKind::Error,
            1.0,
            json!({"context": context, "message": message}),
        );
    }

    /// Report the current number of live listeners.
    pub fn track_listener_count(&self, count: usize) {
        self.listener_gauge.store(count, Ordering::Relaxed);
        self.record(MetricKind::ListenerCount, count as f64, json!({}));
    }

    /// Last reported listener gauge.
    pub fn listener_count(&self) -> usize {
        self.listener_gauge.load(Ordering::Relaxed)
    }

    /// Sample heap usage through the installed probe, if any.
    pub fn sample_memory(&self) -> Option<u64> {
        let bytes = self.memory_probe.as_ref().and_then(|probe| probe())?;
        self.record(MetricKind::Memory, bytes as f64, json!({}));
        Some(bytes)
    }

    /// Register an observer; it sees every sample recorded from now on.
    pub fn subscribe(&self, observer: MetricObserver) -> u64 {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        id
    }

    /// Remove an observer. Unknown ids are a no-op, so unsubscribing twice
    /// is safe.
    pub fn unsubscribe(&self, id: u64) {
        self.observers.lock().retain(|(existing, _)| *existing != id);
    }

    /// Copy out the buffered samples, oldest first.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().iter().cloned().collect()
    }

    /// Snapshot all aggregates.
    pub fn export(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generated_at: now_ms(),
            sample_count: self.samples.lock().len(),
            average_latency_ms: self.average_latency(DEFAULT_WINDOW, None),
            p95_latency_ms: self.percentile_latency(95.0, DEFAULT_WINDOW, None),
            update_counts: self
                .update_counts
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            error_counts: self
                .error_counts
                .iter()
                .map(|e| ErrorCount {
                    context: e.key().0.clone(),
                    message: e.key().1.clone(),
                    count: *e.value(),
                })
                .collect(),
            listener_count: self.listener_count(),
            memory_bytes: self.memory_probe.as_ref().and_then(|probe| probe()),
        }
    }

    /// Log a human-readable summary of the current aggregates.
    pub fn log_summary(&self) {
        let snapshot = self.export();
        tracing::info!(
            samples = snapshot.sample_count,
            avg_latency_ms = snapshot.average_latency_ms,
            p95_latency_ms = snapshot.p95_latency_ms,
            listeners = snapshot.listener_count,
            updates = snapshot.update_counts.values().sum::<u64>(),
            errors = snapshot.error_counts.iter().map(|e| e.count).sum::<u64>(),
            "metrics summary"
        );
    }

    fn record(&self, kind: MetricKind, value: f64, metadata: serde_json::Value) {
        self.record_at(kind, value, metadata, now_ms());
    }

    fn record_at(&self, kind: MetricKind, value: f64, metadata: serde_json::Value, timestamp: i64) {
        let sample = MetricSample {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            value,
            timestamp,
            metadata,
        };

        {
            let mut samples = self.samples.lock();
            if samples.len() == SAMPLE_CAP {
                samples.pop_front();
            }
            samples.push_back(sample.clone());
        }

        for (_, observer) in self.observers.lock().iter() {
            observer(&sample);
        }
    }

    fn latency_values(&self, window: Duration, label: Option<&str>) -> Vec<f64> {
        let cutoff = now_ms() - window.as_millis() as i64;
        self.samples
            .lock()
            .iter()
            .filter(|s| s.kind == MetricKind::Latency && s.timestamp >= cutoff)
            .filter(|s| match label {
                Some(label) => s.metadata.get("label").and_then(|l| l.as_str()) == Some(label),
                None => true,
            })
            .map(|s| s.value)
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("samples", &self.samples.lock().len())
            .field("active_trackers", &self.trackers.len())
            .finish()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Published statistics snapshot.
//!
//! The coordinator builds a complete [`Snapshot`] and then replaces the
//! previous one in a single pointer swap. Readers load an `Arc` without
//! locking and never see a partially merged value.

use crate::models::MetricValue;
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

/// Immutable result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Strictly increasing per coordinator, starting at 1.
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub values: BTreeMap<String, MetricValue>,
    /// Metrics omitted from this cycle, with the reason.
    pub failures: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    /// Value for `key`, or `Unavailable` when the cycle did not produce it.
    pub fn value_or_unavailable(&self, key: &str) -> MetricValue {
        self.values.get(key).cloned().unwrap_or(MetricValue::Unavailable)
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(MetricValue::as_count)
    }
}

/// Holder of the latest snapshot plus change notification.
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
    notify: watch::Sender<Option<Arc<Snapshot>>>,
    closed: Arc<AtomicBool>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(None);
        Self {
            current: ArcSwapOption::empty(),
            notify,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Swap in `snapshot` and wake subscribers.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(snapshot.clone()));
        self.notify.send_replace(Some(snapshot.clone()));
        snapshot
    }

    pub fn subscribe(&self) -> SnapshotSubscriber {
        SnapshotSubscriber {
            rx: self.notify.subscribe(),
            closed: self.closed.clone(),
        }
    }

    /// Ends every subscriber's stream, including subscribers created later.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.send_replace(None);
    }
}

/// Receives snapshots in publication order.
///
/// A slow subscriber skips intermediate snapshots but never goes backwards.
pub struct SnapshotSubscriber {
    rx: watch::Receiver<Option<Arc<Snapshot>>>,
    closed: Arc<AtomicBool>,
}

impl SnapshotSubscriber {
    /// Wait for the next snapshot. `None` once the coordinator has shut down.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.rx.changed().await.ok()?;
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }

    /// Latest snapshot without waiting.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.rx.borrow().clone()
    }
}

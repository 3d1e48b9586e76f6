//! Queue snapshots pushed to subscribers after every mutation.
//!
//! Snapshots travel over a `tokio::sync::broadcast` channel, so a slow
//! subscriber only ever lags behind; it never blocks the scheduler. A lagging
//! subscriber skips straight to the newest snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;

use super::item::{ItemStatus, WorkItem};

/// Coarse state shown next to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    /// The circuit breaker is open.
    CircuitOpen,
    /// The scheduler loop is running.
    Processing,
    /// Nothing is running.
    Idle,
}

impl StatusLabel {
    /// Derives the label; an open circuit takes precedence.
    pub fn from_flags(circuit_open: bool, is_processing: bool) -> Self {
        if circuit_open {
            StatusLabel::CircuitOpen
        } else if is_processing {
            StatusLabel::Processing
        } else {
            StatusLabel::Idle
        }
    }

    /// Display text.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::CircuitOpen => "CIRCUIT BREAKER ACTIVE (PAUSED)",
            StatusLabel::Processing => "PROCESSING",
            StatusLabel::Idle => "IDLE",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// Items in queue order.
    pub items: Vec<WorkItem>,
    /// Whether the scheduler loop is running.
    pub is_processing: bool,
    /// Whether the circuit breaker is open.
    pub circuit_open: bool,
    /// Derived status label.
    pub status_label: StatusLabel,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl QueueSnapshot {
    /// Builds a snapshot from the current state.
    pub fn new(items: Vec<WorkItem>, is_processing: bool, circuit_open: bool) -> Self {
        Self {
            items,
            is_processing,
            circuit_open,
            status_label: StatusLabel::from_flags(circuit_open, is_processing),
            timestamp: Utc::now(),
        }
    }

    /// Looks up an item by id.
    pub fn item(&self, id: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Number of items per status. Statuses with no items are omitted.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of items with `status`.
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Receiving end of a queue subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<QueueSnapshot>,
}

impl Subscription {
    pub(crate) fn new(rx: broadcast::Receiver<QueueSnapshot>) -> Self {
        Self { rx }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the scheduler has been dropped. Snapshots missed
    /// because the subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<QueueSnapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Subscriber lagged, skipping stale snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<QueueSnapshot> {
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drains every queued snapshot.
    pub fn drain(&mut self) -> Vec<QueueSnapshot> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`init_metrics`](super::init_metrics) has
//! run, so library users that never export metrics pay nothing.

use super::prometheus::{
    ARTIFACTS_TOTAL, CIRCUIT_TRIPS_TOTAL, ITEMS_TOTAL, PHASE_ATTEMPTS_TOTAL, PHASE_DURATION,
    PROCESSING, QUEUE_DEPTH,
};
use crate::pipeline::events::QueueSnapshot;
use crate::pipeline::item::ItemStatus;

/// Pipeline phase label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Outline drafting.
    Structure,
    /// Note generation.
    Content,
}

impl Phase {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Structure => "structure",
            Phase::Content => "content",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact write target label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTarget {
    /// The primary artifact store.
    Local,
    /// The best-effort remote push.
    Remote,
}

impl ArtifactTarget {
    fn as_str(&self) -> &'static str {
        match self {
            ArtifactTarget::Local => "local",
            ArtifactTarget::Remote => "remote",
        }
    }
}

/// Metrics collector for pipeline operations.
///
/// # Example
///
/// ```ignore
/// use note_forge::metrics::{init_metrics, MetricsCollector, Phase};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_attempt(Phase::Structure, true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one generator call.
    pub fn record_attempt(&self, phase: Phase, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(attempts) = PHASE_ATTEMPTS_TOTAL.get() {
            attempts.with_label_values(&[phase.as_str(), status]).inc();
        }
    }

    /// Record how long a phase took, retries included.
    pub fn record_phase_duration(&self, phase: Phase, duration_secs: f64) {
        if let Some(duration) = PHASE_DURATION.get() {
            duration
                .with_label_values(&[phase.as_str()])
                .observe(duration_secs);
        }
        tracing::trace!(phase = %phase, duration_secs, "Recorded phase duration");
    }

    /// Record the status an item settled in after being processed.
    pub fn record_item_outcome(&self, status: ItemStatus) {
        if let Some(items) = ITEMS_TOTAL.get() {
            items.with_label_values(&[status.as_str()]).inc();
        }
    }

    /// Record a circuit breaker trip.
    pub fn record_circuit_trip(&self) {
        if let Some(trips) = CIRCUIT_TRIPS_TOTAL.get() {
            trips.inc();
        }
    }

    /// Record an artifact write.
    pub fn record_artifact(&self, target: ArtifactTarget, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(artifacts) = ARTIFACTS_TOTAL.get() {
            artifacts
                .with_label_values(&[target.as_str(), status])
                .inc();
        }
    }

    /// Mirror a queue snapshot into the depth and processing gauges.
    pub fn observe_snapshot(&self, snapshot: &QueueSnapshot) {
        if let Some(depth) = QUEUE_DEPTH.get() {
            for status in ItemStatus::ALL {
                depth
                    .with_label_values(&[status.as_str()])
                    .set(snapshot.count(status) as f64);
            }
        }
        if let Some(processing) = PROCESSING.get() {
            processing.set(if snapshot.is_processing { 1.0 } else { 0.0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};
    use crate::pipeline::item::WorkItem;

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Structure.as_str(), "structure");
        assert_eq!(Phase::Content.to_string(), "content");
        assert_eq!(ArtifactTarget::Remote.as_str(), "remote");
    }

    #[test]
    fn test_collector_records_into_registry() {
        init_metrics().expect("init");
        let collector = MetricsCollector::new();

        collector.record_attempt(Phase::Content, false);
        collector.record_phase_duration(Phase::Content, 2.5);
        collector.record_item_outcome(ItemStatus::Done);
        collector.record_circuit_trip();
        collector.record_artifact(ArtifactTarget::Local, true);

        let items = vec![
            WorkItem::with_id("a", "A"),
            WorkItem::with_id("b", "B").with_status(ItemStatus::Done),
        ];
        collector.observe_snapshot(&QueueSnapshot::new(items, true, false));

        let output = export_metrics();
        assert!(output.contains("note_forge_phase_attempts_total"));
        assert!(output.contains("phase=\"content\""));
        assert!(output.contains("note_forge_queue_depth"));
        assert!(output.contains("note_forge_artifacts_total"));
    }
}

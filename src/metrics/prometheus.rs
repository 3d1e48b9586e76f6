//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by note-forge and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all note-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Items that left the scheduler, labeled by outcome (done, error, paused_for_review).
pub static ITEMS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Generator calls, labeled by phase and status.
pub static PHASE_ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall-clock duration of a phase including retries, labeled by phase.
pub static PHASE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of times the circuit breaker opened.
pub static CIRCUIT_TRIPS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Artifact writes, labeled by target (local, remote) and status.
pub static ARTIFACTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Items in the queue, labeled by status.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// 1 while the scheduler loop runs, else 0.
pub static PROCESSING: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless; later calls keep the first
/// registry.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let items_total = CounterVec::new(
        Opts::new("note_forge_items_total", "Items processed, by outcome"),
        &["outcome"],
    )?;

    let phase_attempts_total = CounterVec::new(
        Opts::new(
            "note_forge_phase_attempts_total",
            "Generator calls, by phase and status",
        ),
        &["phase", "status"],
    )?;

    let phase_duration = HistogramVec::new(
        HistogramOpts::new(
            "note_forge_phase_duration_seconds",
            "Phase duration in seconds including retries",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["phase"],
    )?;

    let circuit_trips_total = Counter::new(
        "note_forge_circuit_trips_total",
        "Number of times the circuit breaker opened",
    )?;

    let artifacts_total = CounterVec::new(
        Opts::new("note_forge_artifacts_total", "Artifact writes, by target and status"),
        &["target", "status"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("note_forge_queue_depth", "Items in the queue, by status"),
        &["status"],
    )?;

    let processing = Gauge::new(
        "note_forge_processing",
        "1 while the scheduler loop is running",
    )?;

    registry.register(Box::new(items_total.clone()))?;
    registry.register(Box::new(phase_attempts_total.clone()))?;
    registry.register(Box::new(phase_duration.clone()))?;
    registry.register(Box::new(circuit_trips_total.clone()))?;
    registry.register(Box::new(artifacts_total.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(processing.clone()))?;

    // A concurrent initializer may win the race; its metrics are kept.
    if REGISTRY.set(registry).is_err() {
        return Ok(());
    }
    let _ = ITEMS_TOTAL.set(items_total);
    let _ = PHASE_ATTEMPTS_TOTAL.set(phase_attempts_total);
    let _ = PHASE_DURATION.set(phase_duration);
    let _ = CIRCUIT_TRIPS_TOTAL.set(circuit_trips_total);
    let _ = ARTIFACTS_TOTAL.set(artifacts_total);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = PROCESSING.set(processing);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead if the registry was never initialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

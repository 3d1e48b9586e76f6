//! End-to-end scheduler scenarios against scripted generators.
//!
//! Time is paused so backoff sleeps complete instantly and can be measured.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use note_forge::generator::{ContentGenerator, StructureGenerator};
use note_forge::pipeline::{
    ItemStatus, PipelineConfig, PipelineError, ProviderConfig, RetryPolicy, Scheduler,
    SchedulerSettings, StatusLabel, StopReason, WorkItem,
};
use note_forge::storage::{
    FileArtifactStore, JsonQueueStore, MemoryArtifactStore, MemoryQueueStore,
};
use note_forge::GeneratorError;

// ============================================================================
// Scripted generator
// ============================================================================

#[derive(Debug, Clone)]
struct Call {
    phase: &'static str,
    topic: String,
    input: String,
    at: Instant,
}

#[derive(Default)]
struct ScriptedGenerator {
    structure_failures: AtomicUsize,
    structure_always_fails: AtomicBool,
    content_failures: AtomicUsize,
    content_always_fails: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    fn record(&self, phase: &'static str, topic: &str, input: &str) {
        self.calls.lock().expect("calls lock").push(Call {
            phase,
            topic: topic.to_string(),
            input: input.to_string(),
            at: Instant::now(),
        });
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn calls_for(&self, phase: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.phase == phase)
            .collect()
    }

    fn should_fail(always: &AtomicBool, remaining: &AtomicUsize) -> bool {
        always.load(Ordering::SeqCst)
            || remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl StructureGenerator for ScriptedGenerator {
    async fn generate_structure(
        &self,
        topic: &str,
        _provider: &ProviderConfig,
        _customization: Option<&str>,
    ) -> Result<String, GeneratorError> {
        self.record("structure", topic, topic);
        if Self::should_fail(&self.structure_always_fails, &self.structure_failures) {
            return Err(GeneratorError::Failed("outline service unavailable".to_string()));
        }
        Ok(format!("# {}\n## Key ideas", topic))
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_content(
        &self,
        topic: &str,
        structure: &str,
        _provider: &ProviderConfig,
        _customization: Option<&str>,
    ) -> Result<String, GeneratorError> {
        self.record("content", topic, structure);
        if Self::should_fail(&self.content_always_fails, &self.content_failures) {
            return Err(GeneratorError::Failed("content service unavailable".to_string()));
        }
        Ok(format!("{}\n\nFull notes on {}.", structure, topic))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    scheduler: Scheduler,
    generator: Arc<ScriptedGenerator>,
    queue: Arc<MemoryQueueStore>,
    artifacts: Arc<MemoryArtifactStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(default_settings())
    }

    fn with_settings(settings: SchedulerSettings) -> Self {
        let generator = Arc::new(ScriptedGenerator::default());
        let queue = Arc::new(MemoryQueueStore::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let scheduler = Scheduler::builder(settings)
            .structure_generator(generator.clone())
            .content_generator(generator.clone())
            .artifact_store(artifacts.clone())
            .queue_store(queue.clone())
            .build()
            .expect("valid scheduler");
        Self {
            scheduler,
            generator,
            queue,
            artifacts,
        }
    }

    async fn item(&self, id: &str) -> WorkItem {
        self.scheduler
            .snapshot()
            .await
            .item(id)
            .cloned()
            .expect("item exists")
    }
}

fn default_settings() -> SchedulerSettings {
    SchedulerSettings::new().with_cooldown(Duration::from_millis(100))
}

fn config(auto_approve: bool) -> PipelineConfig {
    PipelineConfig::new(ProviderConfig::new("mock", "content-model"))
        .with_structure_provider(ProviderConfig::new("mock", "outline-model"))
        .with_auto_approve(auto_approve)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_topic_completes_with_artifact() {
    let h = Harness::new();
    h.scheduler
        .set_queue(vec![WorkItem::with_id("x", "Photosynthesis")])
        .await
        .expect("set queue");
    let mut updates = h.scheduler.subscribe();

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run succeeds");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.stop_reason, StopReason::Idle);

    let item = h.item("x").await;
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.retry_count, 0);
    assert!(item.error_msg.is_none());

    let artifacts = h.artifacts.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].item_id, "x");
    assert_eq!(artifacts[0].topic, "Photosynthesis");
    assert!(artifacts[0].content.contains("Full notes on Photosynthesis"));
    assert_eq!(artifacts[0].provenance.structure_provider.model, "outline-model");
    assert_eq!(artifacts[0].provenance.content_provider.model, "content-model");
    assert_eq!(h.artifacts.remote_pushes(), 1);

    let snapshots = updates.drain();
    assert!(snapshots.first().expect("snapshots").is_processing);
    let last = snapshots.last().expect("snapshots");
    assert!(!last.is_processing);
    assert_eq!(last.status_label, StatusLabel::Idle);
    let seen: Vec<ItemStatus> = snapshots
        .iter()
        .filter_map(|s| s.item("x").map(|item| item.status))
        .collect();
    assert!(seen.contains(&ItemStatus::Drafting));
    assert!(seen.contains(&ItemStatus::StructReady));
    assert!(seen.contains(&ItemStatus::Generating));

    let persisted = h.queue.items();
    assert_eq!(persisted[0].status, ItemStatus::Done);
    assert!(h.queue.save_count() >= snapshots.len());
}

#[tokio::test(start_paused = true)]
async fn test_content_failures_trip_circuit() {
    let h = Harness::new();
    h.generator.content_always_fails.store(true, Ordering::SeqCst);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("y", "Y")])
        .await
        .expect("set queue");
    let mut updates = h.scheduler.subscribe();

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run returns");

    assert_eq!(summary.stop_reason, StopReason::CircuitTripped);
    assert_eq!(summary.failed, 1);

    let item = h.item("y").await;
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.retry_count, 3);
    assert!(item.has_structure());
    let message = item.error_msg.expect("error message");
    assert!(
        message.starts_with("Circuit breaker tripped after 3 consecutive failures"),
        "unexpected message: {}",
        message
    );

    assert!(h.scheduler.is_circuit_open());
    assert!(h.artifacts.artifacts().is_empty());
    assert_eq!(h.generator.calls_for("content").len(), 3);

    let snapshot = h.scheduler.snapshot().await;
    assert!(snapshot.circuit_open);
    assert!(!snapshot.is_processing);
    assert_eq!(snapshot.status_label, StatusLabel::CircuitOpen);
    let last = updates.drain().pop().expect("snapshots");
    assert_eq!(last.status_label, StatusLabel::CircuitOpen);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let h = Harness::new();
    h.generator.content_always_fails.store(true, Ordering::SeqCst);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("y", "Y")])
        .await
        .expect("set queue");

    h.scheduler
        .start_processing(config(true))
        .await
        .expect("run returns");

    let calls = h.generator.calls_for("content");
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(4));
    assert_eq!(calls[2].at - calls[1].at, Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_selection_keeps_queue_order() {
    let h = Harness::new();
    h.scheduler
        .set_queue(vec![
            WorkItem::with_id("a", "A").with_status(ItemStatus::Done),
            WorkItem::with_id("b", "B"),
            WorkItem::with_id("c", "C")
                .with_status(ItemStatus::Error)
                .with_structure("# stale"),
        ])
        .await
        .expect("set queue");

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run succeeds");
    assert_eq!(summary.completed, 2);

    let order: Vec<(&'static str, String)> = h
        .generator
        .calls()
        .into_iter()
        .map(|call| (call.phase, call.topic))
        .collect();
    assert_eq!(
        order,
        vec![
            ("structure", "B".to_string()),
            ("content", "B".to_string()),
            ("structure", "C".to_string()),
            ("content", "C".to_string()),
        ]
    );
    assert_eq!(h.item("a").await.status, ItemStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_review_gate_pauses_until_approved() {
    let h = Harness::new();
    h.scheduler
        .set_queue(vec![
            WorkItem::with_id("p", "Plate tectonics"),
            WorkItem::with_id("q", "Volcanoes"),
        ])
        .await
        .expect("set queue");

    let summary = h
        .scheduler
        .start_processing(config(false))
        .await
        .expect("first run");
    assert_eq!(summary.paused, 2);
    assert!(h.generator.calls_for("content").is_empty());

    let paused = h.item("p").await;
    assert_eq!(paused.status, ItemStatus::PausedForReview);
    let outline = paused.structure.clone().expect("outline");

    h.scheduler.approve_item("p").await.expect("approve");
    assert_eq!(h.item("p").await.status, ItemStatus::StructReady);

    let summary = h
        .scheduler
        .start_processing(config(false))
        .await
        .expect("second run");
    assert_eq!(summary.completed, 1);
    assert_eq!(h.item("p").await.status, ItemStatus::Done);
    assert_eq!(h.item("q").await.status, ItemStatus::PausedForReview);

    let artifacts = h.artifacts.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].provenance.structure, outline);
}

#[tokio::test(start_paused = true)]
async fn test_edited_structure_feeds_content_phase() {
    let h = Harness::new();
    h.scheduler
        .set_queue(vec![WorkItem::with_id("e", "Enzymes")])
        .await
        .expect("set queue");
    h.scheduler
        .start_processing(config(false))
        .await
        .expect("first run");

    h.scheduler
        .update_item_structure("e", "# Enzymes\n## Edited")
        .await
        .expect("edit");
    let once = h.item("e").await;
    h.scheduler
        .update_item_structure("e", "# Enzymes\n## Edited")
        .await
        .expect("edit again");
    assert_eq!(h.item("e").await, once);
    assert_eq!(once.status, ItemStatus::StructReady);

    h.scheduler
        .start_processing(config(false))
        .await
        .expect("second run");

    let content_calls = h.generator.calls_for("content");
    assert_eq!(content_calls.len(), 1);
    assert_eq!(content_calls[0].input, "# Enzymes\n## Edited");
    assert_eq!(h.item("e").await.status, ItemStatus::Done);
}

#[tokio::test]
async fn test_gate_operations_reject_unknown_items() {
    let h = Harness::new();
    let err = h.scheduler.approve_item("missing").await.unwrap_err();
    assert!(matches!(err, PipelineError::ItemNotFound(ref id) if id == "missing"));

    let err = h
        .scheduler
        .update_item_structure("missing", "# x")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Item not found"));
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_blocks_until_reset() {
    let h = Harness::new();
    h.generator.content_always_fails.store(true, Ordering::SeqCst);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("y", "Y")])
        .await
        .expect("set queue");
    h.scheduler
        .start_processing(config(true))
        .await
        .expect("tripping run");
    assert!(h.scheduler.is_circuit_open());

    h.scheduler
        .enqueue_topics(["Z"])
        .await
        .expect("enqueue");
    let calls_before = h.generator.calls().len();

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("skipped run");
    assert!(summary.was_skipped());
    assert_eq!(summary.stop_reason, StopReason::CircuitOpen);
    assert_eq!(h.generator.calls().len(), calls_before);

    h.generator.content_always_fails.store(false, Ordering::SeqCst);
    h.scheduler.reset_circuit().await.expect("reset");
    assert!(!h.scheduler.is_circuit_open());
    assert_eq!(h.scheduler.consecutive_failures(), 0);

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("resumed run");
    assert_eq!(summary.completed, 2);

    // The errored item restarts from its outline by default.
    let after_reset: Vec<Call> = h.generator.calls()[calls_before..].to_vec();
    assert_eq!(after_reset[0].phase, "structure");
    assert_eq!(after_reset[0].topic, "Y");
    let snapshot = h.scheduler.snapshot().await;
    assert!(snapshot.items.iter().all(|item| item.status == ItemStatus::Done));
}

#[tokio::test]
async fn test_threshold_above_retry_cap_is_rejected() {
    let policy = RetryPolicy::new().with_max_retries(2).with_circuit_threshold(3);
    let generator = Arc::new(ScriptedGenerator::default());
    let err = Scheduler::builder(default_settings().with_retry_policy(policy))
        .structure_generator(generator.clone())
        .content_generator(generator)
        .artifact_store(Arc::new(MemoryArtifactStore::new()))
        .queue_store(Arc::new(MemoryQueueStore::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(err.to_string().contains("cannot exceed max_retries"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_content_always_ends_the_run() {
    let policy = RetryPolicy::new().with_max_retries(3).with_circuit_threshold(2);
    let h = Harness::with_settings(default_settings().with_retry_policy(policy));
    h.generator.content_always_fails.store(true, Ordering::SeqCst);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("a", "A"), WorkItem::with_id("b", "B")])
        .await
        .expect("set queue");

    let summary = tokio::time::timeout(
        Duration::from_secs(3600),
        h.scheduler.start_processing(config(true)),
    )
    .await
    .expect("run is bounded")
    .expect("run returns");

    assert_eq!(summary.stop_reason, StopReason::CircuitTripped);
    assert_eq!(h.generator.calls_for("content").len(), 2);
    assert!(h.scheduler.is_circuit_open());
    let item = h.item("a").await;
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.retry_count, 2);
    assert_eq!(h.item("b").await.status, ItemStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_releases_drafting_item() {
    let h = Harness::new();
    // 1: set_queue, 2: run start, 3: drafting begins
    h.queue.fail_save_at(3);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("d", "Diffusion")])
        .await
        .expect("set queue");

    let err = h
        .scheduler
        .start_processing(config(true))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));
    assert!(h.generator.calls().is_empty());

    let snapshot = h.scheduler.snapshot().await;
    assert!(!snapshot.is_processing);
    assert_eq!(snapshot.items[0].status, ItemStatus::Pending);
    assert_eq!(h.queue.items()[0].status, ItemStatus::Pending);

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("second run");
    assert_eq!(summary.processed, 1);
    assert_eq!(h.item("d").await.status, ItemStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_save_releases_generating_item() {
    let h = Harness::new();
    h.generator.content_failures.store(1, Ordering::SeqCst);
    // 4: outline stored, 5: generating begins, 6: failed content attempt
    h.queue.fail_save_at(6);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("g", "Glycolysis")])
        .await
        .expect("set queue");

    let err = h
        .scheduler
        .start_processing(config(true))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));

    let item = h.item("g").await;
    assert_eq!(item.status, ItemStatus::StructReady);
    assert!(item.has_structure());

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("second run");
    assert_eq!(summary.completed, 1);
    assert_eq!(h.generator.calls_for("structure").len(), 1);
    assert_eq!(h.item("g").await.status, ItemStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_counts_failures_across_items_and_phases() {
    let h = Harness::new();
    h.generator.structure_failures.store(1, Ordering::SeqCst);
    h.generator.content_always_fails.store(true, Ordering::SeqCst);
    // 4: the failed outline attempt for "a"
    h.queue.fail_save_at(4);
    h.scheduler
        .set_queue(vec![
            WorkItem::with_id("a", "A"),
            WorkItem::with_id("b", "B")
                .with_status(ItemStatus::StructReady)
                .with_structure("# B\n## Outline"),
        ])
        .await
        .expect("set queue");

    // One structure failure on "a"; the run ends before any success.
    assert!(h.scheduler.start_processing(config(true)).await.is_err());
    assert_eq!(h.scheduler.consecutive_failures(), 1);
    assert!(!h.scheduler.is_circuit_open());
    assert_eq!(h.item("a").await.status, ItemStatus::Pending);

    let mut reordered = h.scheduler.snapshot().await.items;
    reordered.reverse();
    h.scheduler.set_queue(reordered).await.expect("reorder");

    // Two content failures on "b" complete the streak.
    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run returns");
    assert_eq!(summary.stop_reason, StopReason::CircuitTripped);
    assert!(h.scheduler.is_circuit_open());
    assert_eq!(h.generator.calls_for("structure").len(), 1);
    assert_eq!(h.generator.calls_for("content").len(), 2);

    let item = h.item("b").await;
    assert_eq!(item.status, ItemStatus::Error);
    assert_eq!(item.retry_count, 2);
    assert!(item
        .error_msg
        .expect("message")
        .starts_with("Circuit breaker tripped after 3 consecutive failures"));
    assert_eq!(h.item("a").await.status, ItemStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_streak() {
    let h = Harness::new();
    h.generator.content_failures.store(2, Ordering::SeqCst);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("r", "Recovery")])
        .await
        .expect("set queue");

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run succeeds");

    assert_eq!(summary.completed, 1);
    assert!(!h.scheduler.is_circuit_open());
    assert_eq!(h.scheduler.consecutive_failures(), 0);
    let item = h.item("r").await;
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.retry_count, 0);
}

#[tokio::test]
async fn test_restore_recovers_interrupted_items() {
    let generator = Arc::new(ScriptedGenerator::default());
    let queue = Arc::new(MemoryQueueStore::with_items(vec![
        WorkItem::with_id("d", "Drafting").with_status(ItemStatus::Drafting),
        WorkItem::with_id("g1", "Generating")
            .with_status(ItemStatus::Generating)
            .with_structure("# cached"),
        WorkItem::with_id("g2", "Generating without outline").with_status(ItemStatus::Generating),
        WorkItem::with_id("r", "Review").with_status(ItemStatus::PausedForReview),
    ]));
    let scheduler = Scheduler::builder(default_settings())
        .structure_generator(generator.clone())
        .content_generator(generator)
        .artifact_store(Arc::new(MemoryArtifactStore::new()))
        .queue_store(queue.clone())
        .build()
        .expect("valid scheduler");

    let loaded = scheduler.restore().await.expect("restore");
    assert_eq!(loaded, 4);

    let statuses: Vec<ItemStatus> = queue.items().iter().map(|item| item.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Pending,
            ItemStatus::StructReady,
            ItemStatus::Pending,
            ItemStatus::PausedForReview,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_errored_item_resumes_at_content_when_enabled() {
    let errored = || {
        WorkItem::with_id("k", "Kinetics")
            .with_status(ItemStatus::Error)
            .with_structure("# Kinetics\n## Cached")
    };

    let h = Harness::with_settings(default_settings().with_resume_errored_at_content(true));
    h.scheduler.set_queue(vec![errored()]).await.expect("set queue");
    h.scheduler
        .start_processing(config(false))
        .await
        .expect("run succeeds");

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].phase, "content");
    assert_eq!(calls[0].input, "# Kinetics\n## Cached");
    assert_eq!(h.item("k").await.status, ItemStatus::Done);

    let h = Harness::new();
    h.scheduler.set_queue(vec![errored()]).await.expect("set queue");
    h.scheduler
        .start_processing(config(false))
        .await
        .expect("run succeeds");

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].phase, "structure");
    assert_eq!(h.item("k").await.status, ItemStatus::PausedForReview);
}

#[tokio::test(start_paused = true)]
async fn test_remote_sync_failure_is_swallowed() {
    let h = Harness::new();
    h.artifacts.set_remote_failing(true);
    h.scheduler
        .enqueue_topics(["Orbitals"])
        .await
        .expect("enqueue");

    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("run succeeds");

    assert_eq!(summary.completed, 1);
    assert_eq!(h.artifacts.artifacts().len(), 1);
    assert_eq!(h.artifacts.remote_pushes(), 0);
    let snapshot = h.scheduler.snapshot().await;
    assert_eq!(snapshot.items[0].status, ItemStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_artifact_save_failure_ends_run() {
    let h = Harness::new();
    h.artifacts.set_failing(true);
    h.scheduler
        .set_queue(vec![WorkItem::with_id("s", "Storage"), WorkItem::with_id("t", "Next")])
        .await
        .expect("set queue");

    let err = h
        .scheduler
        .start_processing(config(true))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));

    let item = h.item("s").await;
    assert_eq!(item.status, ItemStatus::Error);
    assert!(item
        .error_msg
        .expect("message")
        .contains("Failed to save artifact"));
    assert_eq!(h.item("t").await.status, ItemStatus::Pending);
    assert!(!h.scheduler.snapshot().await.is_processing);
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_after_current_item() {
    let h = Harness::with_settings(default_settings().with_cooldown(Duration::from_secs(1)));
    h.scheduler
        .set_queue(vec![WorkItem::with_id("1", "First"), WorkItem::with_id("2", "Second")])
        .await
        .expect("set queue");
    let mut updates = h.scheduler.subscribe();

    let runner = h.scheduler.clone();
    let handle = tokio::spawn(async move { runner.start_processing(config(true)).await });

    while let Some(snapshot) = updates.recv().await {
        if snapshot.item("1").map(|item| item.status) == Some(ItemStatus::Done) {
            break;
        }
    }
    h.scheduler.stop().await.expect("stop");

    let summary = handle.await.expect("join").expect("run returns");
    assert_eq!(summary.stop_reason, StopReason::Stopped);
    assert_eq!(summary.completed, 1);
    assert_eq!(h.item("2").await.status, ItemStatus::Pending);

    // A new run clears the stop request.
    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("second run");
    assert_eq!(summary.completed, 1);
    assert_eq!(h.item("2").await.status, ItemStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_is_a_noop() {
    let h = Harness::with_settings(default_settings().with_cooldown(Duration::from_secs(5)));
    h.scheduler
        .enqueue_topics(["One", "Two"])
        .await
        .expect("enqueue");
    let mut updates = h.scheduler.subscribe();

    let runner = h.scheduler.clone();
    let handle = tokio::spawn(async move { runner.start_processing(config(true)).await });

    while let Some(snapshot) = updates.recv().await {
        if snapshot.is_processing {
            break;
        }
    }
    let summary = h
        .scheduler
        .start_processing(config(true))
        .await
        .expect("second start");
    assert_eq!(summary.stop_reason, StopReason::AlreadyProcessing);
    assert!(h.scheduler.active_config().await.is_some());

    let summary = handle.await.expect("join").expect("run returns");
    assert_eq!(summary.completed, 2);
    assert!(h.scheduler.active_config().await.is_none());
}

#[tokio::test]
async fn test_file_backed_queue_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_file = dir.path().join("queue.json");
    let artifact_dir = dir.path().join("notes");
    let generator = Arc::new(ScriptedGenerator::default());

    let build = |generator: Arc<ScriptedGenerator>| {
        Scheduler::builder(default_settings())
            .structure_generator(generator.clone())
            .content_generator(generator)
            .artifact_store(Arc::new(FileArtifactStore::new(&artifact_dir)))
            .queue_store(Arc::new(JsonQueueStore::new(&state_file)))
            .build()
            .expect("valid scheduler")
    };

    let first = build(generator.clone());
    first
        .enqueue_topics(["Cell membranes", "Ion channels"])
        .await
        .expect("enqueue");
    first
        .start_processing(config(true))
        .await
        .expect("run succeeds");

    let second = build(generator);
    assert_eq!(second.restore().await.expect("restore"), 2);
    let snapshot = second.snapshot().await;
    assert!(snapshot.items.iter().all(|item| item.status == ItemStatus::Done));

    let store = FileArtifactStore::new(&artifact_dir);
    let metas = store.list(note_forge::pipeline::DEFAULT_COLLECTION).await.expect("list");
    assert_eq!(metas.len(), 2);
    let content = store.read_content(&metas[0]).await.expect("read");
    assert!(content.contains("Full notes on"));
}

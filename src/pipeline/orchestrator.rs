//! Scheduler coordinating the note pipeline.
//!
//! The [`Scheduler`] owns the ordered work queue and advances exactly one item
//! at a time through the structure and content phases. It receives every
//! collaborator explicitly:
//! - Structure and content generators
//! - Artifact store for finished notes
//! - Queue persistence, written after every mutation
//!
//! Subscribers get a [`QueueSnapshot`] after every mutation through
//! [`Scheduler::subscribe`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use note_forge::pipeline::{PipelineConfig, ProviderConfig, Scheduler, SchedulerSettings};
//!
//! let scheduler = Scheduler::builder(SchedulerSettings::from_env()?)
//!     .structure_generator(generator.clone())
//!     .content_generator(generator)
//!     .artifact_store(Arc::new(artifacts))
//!     .queue_store(Arc::new(queue))
//!     .build()?;
//!
//! scheduler.enqueue_topics(["Photosynthesis", "The Krebs cycle"]).await?;
//! let config = PipelineConfig::new(ProviderConfig::new("openrouter", "openai/gpt-4o"))
//!     .with_auto_approve(true);
//! let summary = scheduler.start_processing(config).await?;
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::error::PersistenceError;
use crate::generator::{ContentGenerator, StructureGenerator};
use crate::metrics::MetricsCollector;
use crate::storage::{ArtifactStore, QueuePersistence};

use super::config::{ConfigError, PipelineConfig, SchedulerSettings};
use super::events::{QueueSnapshot, Subscription};
use super::item::{ItemStatus, WorkItem};
use super::retry::{CircuitBreaker, RetryExecutor};

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// No item with the given id.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// The operation is not allowed while the scheduler loop runs.
    #[error("Scheduler is processing; {0} is not allowed")]
    Busy(&'static str),

    /// A required collaborator was not supplied to the builder.
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Why a call to [`Scheduler::start_processing`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Another loop was already running; nothing was done.
    AlreadyProcessing,
    /// The circuit was open before the run; nothing was done.
    CircuitOpen,
    /// The circuit breaker tripped during the run.
    CircuitTripped,
    /// [`Scheduler::stop`] was called.
    Stopped,
    /// No eligible item remained.
    Idle,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::AlreadyProcessing => write!(f, "already_processing"),
            StopReason::CircuitOpen => write!(f, "circuit_open"),
            StopReason::CircuitTripped => write!(f, "circuit_tripped"),
            StopReason::Stopped => write!(f, "stopped"),
            StopReason::Idle => write!(f, "idle"),
        }
    }
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Items picked up by the loop.
    pub processed: usize,
    /// Items that reached `Done`.
    pub completed: usize,
    /// Items parked at the review gate.
    pub paused: usize,
    /// Items left in `Error`.
    pub failed: usize,
    /// Why the loop exited.
    pub stop_reason: StopReason,
}

impl RunSummary {
    fn new(stop_reason: StopReason) -> Self {
        Self {
            processed: 0,
            completed: 0,
            paused: 0,
            failed: 0,
            stop_reason,
        }
    }

    /// Returns true if the call was a no-op.
    pub fn was_skipped(&self) -> bool {
        matches!(
            self.stop_reason,
            StopReason::AlreadyProcessing | StopReason::CircuitOpen
        )
    }

    fn record(&mut self, status: ItemStatus) {
        self.processed += 1;
        match status {
            ItemStatus::Done => self.completed += 1,
            ItemStatus::PausedForReview => self.paused += 1,
            ItemStatus::Error => self.failed += 1,
            _ => {}
        }
    }
}

/// Mutable state shared by the loop and the gate operations.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    pub(crate) items: Vec<WorkItem>,
    pub(crate) is_processing: bool,
    pub(crate) should_stop: bool,
    pub(crate) config: Option<PipelineConfig>,
}

impl RunState {
    pub(crate) fn item_mut(&mut self, id: &str) -> Option<&mut WorkItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

/// Collaborators and state behind a [`Scheduler`] handle.
pub(crate) struct SchedulerCore {
    pub(crate) state: Mutex<RunState>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) executor: RetryExecutor,
    pub(crate) structure_generator: Arc<dyn StructureGenerator>,
    pub(crate) content_generator: Arc<dyn ContentGenerator>,
    pub(crate) artifacts: Arc<dyn ArtifactStore>,
    pub(crate) queue_store: Arc<dyn QueuePersistence>,
    pub(crate) events: broadcast::Sender<QueueSnapshot>,
    pub(crate) settings: SchedulerSettings,
    pub(crate) metrics: MetricsCollector,
}

impl SchedulerCore {
    /// Applies `f` under the lock, then persists and notifies.
    pub(crate) async fn commit<R>(
        &self,
        f: impl FnOnce(&mut RunState) -> R,
    ) -> Result<R, PersistenceError> {
        let mut state = self.state.lock().await;
        let out = f(&mut state);
        self.persist_and_notify(&state).await?;
        Ok(out)
    }

    /// Applies `f` to one item. Returns `None` if the item no longer exists.
    pub(crate) async fn update_item<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut WorkItem) -> R,
    ) -> Result<Option<R>, PersistenceError> {
        self.commit(|state| state.item_mut(id).map(f)).await
    }

    /// Snapshot subscribers are always notified; the save result is returned.
    async fn persist_and_notify(&self, state: &RunState) -> Result<(), PersistenceError> {
        let saved = self.queue_store.save(&state.items).await;
        if let Err(ref e) = saved {
            tracing::error!(error = %e, "Failed to persist queue");
        }

        let snapshot = self.snapshot_of(state);
        self.metrics.observe_snapshot(&snapshot);
        // No receivers is fine.
        let _ = self.events.send(snapshot);

        saved
    }

    fn snapshot_of(&self, state: &RunState) -> QueueSnapshot {
        QueueSnapshot::new(
            state.items.clone(),
            state.is_processing,
            self.breaker.is_open(),
        )
    }

    async fn should_halt(&self) -> Option<StopReason> {
        if self.breaker.is_open() {
            return Some(StopReason::CircuitTripped);
        }
        if self.state.lock().await.should_stop {
            return Some(StopReason::Stopped);
        }
        None
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    settings: SchedulerSettings,
    structure_generator: Option<Arc<dyn StructureGenerator>>,
    content_generator: Option<Arc<dyn ContentGenerator>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    queue_store: Option<Arc<dyn QueuePersistence>>,
}

impl SchedulerBuilder {
    /// Sets the structure phase generator.
    pub fn structure_generator(mut self, generator: Arc<dyn StructureGenerator>) -> Self {
        self.structure_generator = Some(generator);
        self
    }

    /// Sets the content phase generator.
    pub fn content_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.content_generator = Some(generator);
        self
    }

    /// Sets the artifact store.
    pub fn artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Sets the queue persistence.
    pub fn queue_store(mut self, store: Arc<dyn QueuePersistence>) -> Self {
        self.queue_store = Some(store);
        self
    }

    /// Validates the settings and builds the scheduler.
    pub fn build(self) -> Result<Scheduler, PipelineError> {
        self.settings.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(self.settings.retry.circuit_threshold));
        let executor = RetryExecutor::new(self.settings.retry, Arc::clone(&breaker));
        let (events, _) = broadcast::channel(self.settings.event_capacity);

        let core = SchedulerCore {
            state: Mutex::new(RunState::default()),
            breaker,
            executor,
            structure_generator: self
                .structure_generator
                .ok_or(PipelineError::MissingCollaborator("structure generator"))?,
            content_generator: self
                .content_generator
                .ok_or(PipelineError::MissingCollaborator("content generator"))?,
            artifacts: self
                .artifacts
                .ok_or(PipelineError::MissingCollaborator("artifact store"))?,
            queue_store: self
                .queue_store
                .ok_or(PipelineError::MissingCollaborator("queue store"))?,
            events,
            settings: self.settings,
            metrics: MetricsCollector::new(),
        };

        Ok(Scheduler {
            core: Arc::new(core),
        })
    }
}

/// Single-item scheduler for the note pipeline.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    /// Starts building a scheduler.
    pub fn builder(settings: SchedulerSettings) -> SchedulerBuilder {
        SchedulerBuilder {
            settings,
            structure_generator: None,
            content_generator: None,
            artifacts: None,
            queue_store: None,
        }
    }

    /// Returns the process-level settings.
    pub fn settings(&self) -> &SchedulerSettings {
        &self.core.settings
    }

    /// Subscribes to queue snapshots. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.core.events.subscribe())
    }

    /// Current state of the queue.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.core.state.lock().await;
        self.core.snapshot_of(&state)
    }

    /// Returns true if the circuit breaker is open.
    pub fn is_circuit_open(&self) -> bool {
        self.core.breaker.is_open()
    }

    /// Consecutive generator failures seen by the breaker.
    pub fn consecutive_failures(&self) -> u32 {
        self.core.breaker.consecutive_failures()
    }

    /// The config of the current run, if one is active.
    pub async fn active_config(&self) -> Option<PipelineConfig> {
        let state = self.core.state.lock().await;
        if state.is_processing {
            state.config.clone()
        } else {
            None
        }
    }

    // ========================================================================
    // Queue management
    // ========================================================================

    /// Replaces the whole queue.
    pub async fn set_queue(&self, items: Vec<WorkItem>) -> Result<(), PipelineError> {
        let count = items.len();
        self.core
            .commit(move |state| {
                state.items = items;
            })
            .await?;
        tracing::info!(items = count, "Queue replaced");
        Ok(())
    }

    /// Appends a pending item per topic. Returns the new item ids.
    pub async fn enqueue_topics<I, S>(&self, topics: I) -> Result<Vec<String>, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let new_items: Vec<WorkItem> = topics
            .into_iter()
            .map(Into::into)
            .filter(|topic: &String| !topic.trim().is_empty())
            .map(WorkItem::new)
            .collect();
        let ids: Vec<String> = new_items.iter().map(|item| item.id.clone()).collect();

        self.core
            .commit(move |state| state.items.extend(new_items))
            .await?;
        tracing::info!(added = ids.len(), "Topics enqueued");
        Ok(ids)
    }

    /// Reloads the queue from persistence.
    ///
    /// Items interrupted mid-phase by a crash are normalized so the next run
    /// picks them up again. Returns the number of items loaded.
    pub async fn restore(&self) -> Result<usize, PipelineError> {
        let mut items = self.core.queue_store.load().await?;
        let mut recovered = 0usize;
        for item in items.iter_mut() {
            let previous = item.status;
            if item.recover_interrupted() {
                recovered += 1;
                tracing::info!(
                    item_id = %item.id,
                    from = %previous,
                    to = %item.status,
                    "Recovered interrupted item"
                );
            }
        }
        let count = items.len();

        let restored = self
            .core
            .commit(move |state| {
                if state.is_processing {
                    false
                } else {
                    state.items = items;
                    true
                }
            })
            .await?;
        if !restored {
            return Err(PipelineError::Busy("restore"));
        }

        tracing::info!(items = count, recovered, "Queue restored");
        Ok(count)
    }

    // ========================================================================
    // Review gate
    // ========================================================================

    /// Approves an item's structure without edits.
    ///
    /// Forces the item to `StructReady` whatever its current status.
    pub async fn approve_item(&self, id: &str) -> Result<(), PipelineError> {
        self.core
            .update_item(id, |item| item.approve())
            .await?
            .ok_or_else(|| PipelineError::ItemNotFound(id.to_string()))?;
        tracing::info!(item_id = %id, "Structure approved");
        Ok(())
    }

    /// Replaces an item's structure and approves it.
    pub async fn update_item_structure(
        &self,
        id: &str,
        structure: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let structure = structure.into();
        self.core
            .update_item(id, move |item| item.replace_structure(structure))
            .await?
            .ok_or_else(|| PipelineError::ItemNotFound(id.to_string()))?;
        tracing::info!(item_id = %id, "Structure edited and approved");
        Ok(())
    }

    // ========================================================================
    // Processing control
    // ========================================================================

    /// Requests a graceful halt after the current step.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        self.core.commit(|state| state.should_stop = true).await?;
        tracing::info!("Stop requested");
        Ok(())
    }

    /// Closes the circuit and clears the failure counter.
    pub async fn reset_circuit(&self) -> Result<(), PipelineError> {
        self.core.breaker.reset();
        self.core.commit(|_| ()).await?;
        tracing::info!("Circuit breaker reset");
        Ok(())
    }

    /// Runs the scheduler loop until no eligible item remains, `stop` is
    /// called, or the circuit breaker trips.
    ///
    /// Returns immediately if a loop is already running or the circuit is
    /// open. A local persistence failure ends the run with an error.
    pub async fn start_processing(
        &self,
        config: PipelineConfig,
    ) -> Result<RunSummary, PipelineError> {
        config.validate()?;
        let core = &self.core;

        {
            let mut state = core.state.lock().await;
            let skip = if state.is_processing {
                Some(StopReason::AlreadyProcessing)
            } else if core.breaker.is_open() {
                Some(StopReason::CircuitOpen)
            } else {
                None
            };
            if let Some(reason) = skip {
                tracing::debug!(reason = %reason, "start_processing skipped");
                return Ok(RunSummary::new(reason));
            }

            state.is_processing = true;
            state.should_stop = false;
            state.config = Some(config.clone());
            if let Err(e) = core.persist_and_notify(&state).await {
                state.is_processing = false;
                state.config = None;
                let _ = core.persist_and_notify(&state).await;
                return Err(e.into());
            }
        }

        tracing::info!(
            provider = %config.content_provider(),
            structure_provider = %config.structure_provider(),
            auto_approve = config.auto_approve,
            "Scheduler started"
        );

        let result = self.run_loop(&config).await;
        let finished = self.finish_run().await;

        let summary = result?;
        finished?;
        tracing::info!(
            processed = summary.processed,
            completed = summary.completed,
            paused = summary.paused,
            failed = summary.failed,
            reason = %summary.stop_reason,
            "Scheduler stopped"
        );
        Ok(summary)
    }

    async fn run_loop(&self, config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
        let core = &self.core;
        let mut summary = RunSummary::new(StopReason::Idle);

        loop {
            if let Some(reason) = core.should_halt().await {
                summary.stop_reason = reason;
                return Ok(summary);
            }

            let next = {
                let state = core.state.lock().await;
                state
                    .items
                    .iter()
                    .find(|item| item.is_eligible(config.auto_approve))
                    .map(|item| item.id.clone())
            };
            let Some(item_id) = next else {
                summary.stop_reason = StopReason::Idle;
                return Ok(summary);
            };

            match core.process_item(&item_id, config).await {
                Ok(Some(status)) => {
                    core.metrics.record_item_outcome(status);
                    summary.record(status);
                }
                Ok(None) => {}
                Err(e) => {
                    core.release_item(&item_id).await;
                    return Err(e);
                }
            }

            if let Some(reason) = core.should_halt().await {
                summary.stop_reason = reason;
                return Ok(summary);
            }
            tokio::time::sleep(core.settings.cooldown).await;
        }
    }

    async fn finish_run(&self) -> Result<(), PersistenceError> {
        self.core
            .commit(|state| {
                state.is_processing = false;
                state.config = None;
            })
            .await
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.core.settings)
            .field("circuit_open", &self.core.breaker.is_open())
            .finish()
    }
}

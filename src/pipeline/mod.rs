//! Autonomous batch pipeline for study-note generation.
//!
//! # Architecture
//!
//! - **Item**: a topic and its position in the state machine
//! - **Retry**: bounded retries with exponential backoff and a global circuit breaker
//! - **Runner**: the structure and content phase handlers
//! - **Orchestrator**: the single-item [`Scheduler`] loop and the review gate
//! - **Events**: queue snapshots broadcast after every mutation
//! - **Config**: per-run [`PipelineConfig`] and process-level [`SchedulerSettings`]
//!
//! # Pipeline Flow
//!
//! 1. **Selection**: the first eligible item in queue order is picked
//! 2. **Structure**: an outline is drafted for the topic
//! 3. **Review**: without auto-approve the item pauses until approved or edited
//! 4. **Content**: the approved outline is expanded into the note
//! 5. **Storage**: the note is saved as an artifact and optionally pushed to a remote
//!
//! Every step is persisted and broadcast before the next one starts.
//!
//! # Example
//!
//! ```rust,ignore
//! use note_forge::pipeline::{PipelineConfig, ProviderConfig, Scheduler};
//!
//! let scheduler: Scheduler = build_scheduler()?;
//! let mut updates = scheduler.subscribe();
//! tokio::spawn(async move {
//!     while let Some(snapshot) = updates.recv().await {
//!         println!("{} {:?}", snapshot.status_label, snapshot.counts());
//!     }
//! });
//!
//! let config = PipelineConfig::new(ProviderConfig::new("openrouter", "openai/gpt-4o"));
//! let summary = scheduler.start_processing(config).await?;
//! println!("{} completed, {} awaiting review", summary.completed, summary.paused);
//! ```

pub mod config;
pub mod events;
pub mod item;
pub mod orchestrator;
pub mod retry;
pub mod runner;

pub use config::{ConfigError, PipelineConfig, ProviderConfig, SchedulerSettings, DEFAULT_COLLECTION};
pub use events::{QueueSnapshot, StatusLabel, Subscription};
pub use item::{ItemStatus, WorkItem};
pub use orchestrator::{PipelineError, RunSummary, Scheduler, SchedulerBuilder, StopReason};
pub use retry::{
    AttemptObserver, CircuitBreaker, FailureRecord, RetryExecutor, RetryOutcome, RetryPolicy,
    BASE_DELAY, CIRCUIT_THRESHOLD, MAX_RETRIES,
};

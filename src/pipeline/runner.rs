//! Phase handlers that drive a single work item.
//!
//! [`SchedulerCore::process_item`] runs the structure phase for pending or
//! errored items and, when the outline is approved, the content phase. Each
//! generator call goes through the shared [`RetryExecutor`](super::retry::RetryExecutor);
//! every failed attempt is written to the item and persisted before the
//! executor backs off.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{GeneratorError, PersistenceError};
use crate::metrics::{ArtifactTarget, Phase};
use crate::storage::{Artifact, Provenance};

use super::config::PipelineConfig;
use super::item::{ItemStatus, WorkItem};
use super::orchestrator::{PipelineError, SchedulerCore};
use super::retry::{AttemptObserver, RetryOutcome};

/// Writes every failed attempt to the item being processed.
struct AttemptRecorder<'a> {
    core: &'a SchedulerCore,
    item_id: &'a str,
    phase: Phase,
}

#[async_trait]
impl<'a> AttemptObserver for AttemptRecorder<'a> {
    async fn attempt_failed(
        &self,
        attempt: u32,
        error: &GeneratorError,
    ) -> Result<(), PersistenceError> {
        self.core.metrics.record_attempt(self.phase, false);
        let message = error.to_string();
        self.core
            .update_item(self.item_id, |item| {
                item.record_attempt_failure(attempt, message)
            })
            .await?;
        Ok(())
    }
}

impl SchedulerCore {
    async fn item(&self, id: &str) -> Option<WorkItem> {
        let state = self.state.lock().await;
        state.items.iter().find(|item| item.id == id).cloned()
    }

    /// Drives one item as far as it can go in a single pass.
    ///
    /// Returns the status the item settled in, or `None` if the item was
    /// removed from the queue while it was being processed.
    pub(crate) async fn process_item(
        &self,
        id: &str,
        config: &PipelineConfig,
    ) -> Result<Option<ItemStatus>, PipelineError> {
        let Some(item) = self.item(id).await else {
            return Ok(None);
        };

        let resume_at_content = item.status == ItemStatus::Error
            && self.settings.resume_errored_at_content
            && item.has_structure();

        if resume_at_content {
            tracing::info!(
                item_id = %item.id,
                topic = %item.topic,
                "Resuming errored item at content phase with cached structure"
            );
        } else if item.status.awaits_structure() {
            self.run_structure_phase(&item, config).await?;
        }

        let Some(item) = self.item(id).await else {
            return Ok(None);
        };
        if item.status == ItemStatus::StructReady || resume_at_content {
            if item.has_structure() {
                self.run_content_phase(&item, config).await?;
            } else {
                tracing::warn!(item_id = %item.id, "Approved item has no structure");
                self.update_item(id, |item| {
                    item.fail("Structure is empty; the item will restart at the structure phase")
                })
                .await?;
            }
        }

        Ok(self.item(id).await.map(|item| item.status))
    }

    /// Returns an item left mid-phase by a failed step to a selectable status.
    ///
    /// The in-memory change sticks even if saving it fails.
    pub(crate) async fn release_item(&self, id: &str) {
        let released = self
            .update_item(id, |item| {
                let previous = item.status;
                item.recover_interrupted().then_some(previous)
            })
            .await;
        match released {
            Ok(Some(Some(previous))) => {
                tracing::warn!(item_id = %id, from = %previous, "Released interrupted item");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(item_id = %id, error = %e, "Failed to persist released item");
            }
        }
    }

    async fn run_structure_phase(
        &self,
        item: &WorkItem,
        config: &PipelineConfig,
    ) -> Result<(), PipelineError> {
        let provider = config.structure_provider();
        if self
            .update_item(&item.id, WorkItem::begin_drafting)
            .await?
            .is_none()
        {
            return Ok(());
        }
        tracing::info!(
            item_id = %item.id,
            topic = %item.topic,
            provider = %provider,
            "Drafting structure"
        );

        let started = Instant::now();
        let generator = self.structure_generator.as_ref();
        let topic = item.topic.as_str();
        let customization = config.prompt_customization.as_deref();
        let observer = AttemptRecorder {
            core: self,
            item_id: &item.id,
            phase: Phase::Structure,
        };

        let outcome = self
            .executor
            .execute(
                move || async move {
                    let text = generator
                        .generate_structure(topic, provider, customization)
                        .await?;
                    non_empty(text, Phase::Structure)
                },
                &observer,
            )
            .await?;
        self.metrics
            .record_phase_duration(Phase::Structure, started.elapsed().as_secs_f64());

        match outcome {
            RetryOutcome::Succeeded(structure) => {
                self.metrics.record_attempt(Phase::Structure, true);
                let auto_approve = config.auto_approve;
                self.update_item(&item.id, move |item| {
                    item.structure_succeeded(structure, auto_approve)
                })
                .await?;
                if auto_approve {
                    tracing::info!(item_id = %item.id, "Structure ready");
                } else {
                    tracing::info!(item_id = %item.id, "Structure paused for review");
                }
            }
            failed => self.settle_failure(&item.id, Phase::Structure, failed).await?,
        }
        Ok(())
    }

    async fn run_content_phase(
        &self,
        item: &WorkItem,
        config: &PipelineConfig,
    ) -> Result<(), PipelineError> {
        let provider = config.content_provider();
        let structure = item.structure.clone().unwrap_or_default();
        if self
            .update_item(&item.id, WorkItem::begin_generating)
            .await?
            .is_none()
        {
            return Ok(());
        }
        tracing::info!(
            item_id = %item.id,
            topic = %item.topic,
            provider = %provider,
            "Generating content"
        );

        let started = Instant::now();
        let generator = self.content_generator.as_ref();
        let topic = item.topic.as_str();
        let outline = structure.as_str();
        let customization = config.prompt_customization.as_deref();
        let observer = AttemptRecorder {
            core: self,
            item_id: &item.id,
            phase: Phase::Content,
        };

        let outcome = self
            .executor
            .execute(
                move || async move {
                    let text = generator
                        .generate_content(topic, outline, provider, customization)
                        .await?;
                    non_empty(text, Phase::Content)
                },
                &observer,
            )
            .await?;
        self.metrics
            .record_phase_duration(Phase::Content, started.elapsed().as_secs_f64());

        let content = match outcome {
            RetryOutcome::Succeeded(content) => content,
            failed => {
                self.settle_failure(&item.id, Phase::Content, failed).await?;
                return Ok(());
            }
        };
        self.metrics.record_attempt(Phase::Content, true);

        let artifact = Artifact::new(
            &item.id,
            &item.topic,
            content,
            &config.collection,
            Provenance {
                structure_provider: config.structure_provider().clone(),
                content_provider: provider.clone(),
                structure,
                prompt_customization: config.prompt_customization.clone(),
            },
        );

        if let Err(e) = self.artifacts.save(&artifact).await {
            self.metrics.record_artifact(ArtifactTarget::Local, false);
            tracing::error!(item_id = %item.id, error = %e, "Failed to save artifact");
            let message = format!("Failed to save artifact: {}", e);
            self.update_item(&item.id, move |item| item.fail(message))
                .await?;
            return Err(e.into());
        }
        self.metrics.record_artifact(ArtifactTarget::Local, true);

        match self.artifacts.sync_remote(&artifact).await {
            Ok(()) => self.metrics.record_artifact(ArtifactTarget::Remote, true),
            Err(e) => {
                self.metrics.record_artifact(ArtifactTarget::Remote, false);
                tracing::warn!(
                    item_id = %item.id,
                    artifact_id = %artifact.id,
                    error = %e,
                    "Remote sync failed, continuing"
                );
            }
        }

        self.update_item(&item.id, WorkItem::content_succeeded)
            .await?;
        tracing::info!(
            item_id = %item.id,
            artifact_id = %artifact.id,
            "Note completed"
        );
        Ok(())
    }

    /// Marks the item `Error` after a failed phase. An opened circuit also
    /// requests the loop to stop.
    async fn settle_failure(
        &self,
        id: &str,
        phase: Phase,
        outcome: RetryOutcome<String>,
    ) -> Result<(), PersistenceError> {
        match outcome {
            RetryOutcome::Succeeded(_) => {}
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(item_id = %id, phase = %phase, attempts, "Phase failed");
                let message = format!(
                    "Max retries exceeded after {} attempts: {}",
                    attempts, last_error
                );
                self.update_item(id, move |item| item.fail(message)).await?;
            }
            RetryOutcome::CircuitOpened {
                attempts,
                last_error,
            } => {
                if attempts > 0 {
                    self.metrics.record_circuit_trip();
                }
                let message = format!(
                    "Circuit breaker tripped after {} consecutive failures: {}",
                    self.breaker.consecutive_failures(),
                    last_error
                );
                tracing::error!(item_id = %id, phase = %phase, "Pipeline halted by circuit breaker");
                self.commit(move |state| {
                    if let Some(item) = state.item_mut(id) {
                        item.fail(message);
                    }
                    state.should_stop = true;
                })
                .await?;
            }
        }
        Ok(())
    }
}

fn non_empty(text: String, phase: Phase) -> Result<String, GeneratorError> {
    if text.trim().is_empty() {
        Err(GeneratorError::EmptyResponse {
            phase: phase.to_string(),
        })
    } else {
        Ok(text)
    }
}

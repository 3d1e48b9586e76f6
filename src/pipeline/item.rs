//! Work item definitions for the note pipeline.
//!
//! A [`WorkItem`] is one topic moving through the two-phase pipeline. Its
//! [`ItemStatus`] follows a small state machine:
//!
//! ```text
//! Pending ──► Drafting ──► StructReady ─────────► Generating ──► Done
//!    ▲           │    └──► PausedForReview ──┘        │
//!    │           ▼        (approve / edit)            ▼
//!    └──────── Error ◄────────────────────────────────┘
//! ```
//!
//! `Error` is not terminal: the scheduler picks errored items up again on its
//! next pass.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be picked up by the scheduler.
    Pending,
    /// The structure phase is running.
    Drafting,
    /// An outline exists and is approved for content generation.
    StructReady,
    /// An outline exists and waits for human approval.
    PausedForReview,
    /// The content phase is running.
    Generating,
    /// The artifact has been persisted.
    Done,
    /// The last phase failed; the item will be retried on the next pass.
    Error,
}

impl ItemStatus {
    /// All statuses, in pipeline order.
    pub const ALL: [ItemStatus; 7] = [
        ItemStatus::Pending,
        ItemStatus::Drafting,
        ItemStatus::StructReady,
        ItemStatus::PausedForReview,
        ItemStatus::Generating,
        ItemStatus::Done,
        ItemStatus::Error,
    ];

    /// Returns true if the structure phase may start from this status.
    pub fn awaits_structure(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Error)
    }

    /// Returns true if a phase is currently running for this status.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ItemStatus::Drafting | ItemStatus::Generating)
    }

    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Drafting => "drafting",
            ItemStatus::StructReady => "struct_ready",
            ItemStatus::PausedForReview => "paused_for_review",
            ItemStatus::Generating => "generating",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One topic moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier of the item.
    pub id: String,
    /// Topic the study note is generated for.
    pub topic: String,
    /// Current pipeline status.
    pub status: ItemStatus,
    /// Outline produced by the structure phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    /// Diagnostic text from the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Failed attempts in the current phase. Reset on every phase success.
    #[serde(default)]
    pub retry_count: u32,
}

impl WorkItem {
    /// Creates a pending item with a fresh UUID.
    pub fn new(topic: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), topic)
    }

    /// Creates a pending item with an explicit identifier.
    pub fn with_id(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            status: ItemStatus::Pending,
            structure: None,
            error_msg: None,
            retry_count: 0,
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the cached structure.
    pub fn with_structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    /// Returns true if a non-blank structure is cached.
    pub fn has_structure(&self) -> bool {
        self.structure
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Selection predicate used by the scheduler.
    ///
    /// The first item in list order satisfying this is processed next.
    pub fn is_eligible(&self, auto_approve: bool) -> bool {
        match self.status {
            ItemStatus::Pending | ItemStatus::Error => true,
            ItemStatus::StructReady => auto_approve || self.structure.is_some(),
            _ => false,
        }
    }

    /// Drafting has started.
    pub fn begin_drafting(&mut self) {
        self.status = ItemStatus::Drafting;
    }

    /// The structure phase produced `structure`.
    pub fn structure_succeeded(&mut self, structure: String, auto_approve: bool) {
        self.structure = Some(structure);
        self.status = if auto_approve {
            ItemStatus::StructReady
        } else {
            ItemStatus::PausedForReview
        };
        self.retry_count = 0;
        self.error_msg = None;
    }

    /// Content generation has started.
    pub fn begin_generating(&mut self) {
        self.status = ItemStatus::Generating;
    }

    /// The artifact was persisted.
    pub fn content_succeeded(&mut self) {
        self.status = ItemStatus::Done;
        self.retry_count = 0;
        self.error_msg = None;
    }

    /// A single attempt failed; the item keeps its in-flight status.
    pub fn record_attempt_failure(&mut self, attempt: u32, message: impl Into<String>) {
        self.retry_count = attempt;
        self.error_msg = Some(message.into());
    }

    /// The current phase gave up.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ItemStatus::Error;
        self.error_msg = Some(message.into());
    }

    /// Approves the cached structure without edits.
    pub fn approve(&mut self) {
        self.status = ItemStatus::StructReady;
    }

    /// Replaces the structure and approves it.
    pub fn replace_structure(&mut self, structure: impl Into<String>) {
        self.structure = Some(structure.into());
        self.status = ItemStatus::StructReady;
    }

    /// Normalizes a status that was in flight when the process went down.
    ///
    /// Returns true if the item changed.
    pub fn recover_interrupted(&mut self) -> bool {
        if !self.status.is_in_flight() {
            return false;
        }
        self.status = if self.status == ItemStatus::Generating && self.has_structure() {
            ItemStatus::StructReady
        } else {
            ItemStatus::Pending
        };
        true
    }
}

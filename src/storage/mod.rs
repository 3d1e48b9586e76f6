//! Persistent storage for the queue and for finished notes.
//!
//! # Overview
//!
//! - **Queue**: the full item list, saved after every mutation
//! - **Artifacts**: finished notes, one markdown file plus a JSON sidecar each
//!
//! # Usage
//!
//! ```rust,ignore
//! use note_forge::storage::{FileArtifactStore, JsonQueueStore, QueuePersistence};
//!
//! let queue = JsonQueueStore::new("./note-forge-queue.json");
//! let items = queue.load().await?;
//!
//! let artifacts = FileArtifactStore::new("./artifacts");
//! let stored = artifacts.list("notes").await?;
//! ```

pub mod artifacts;
pub mod queue_store;

pub use artifacts::{
    compute_checksum, Artifact, ArtifactMeta, ArtifactStore, FileArtifactStore, HttpRemoteSync,
    MemoryArtifactStore, Provenance,
};
pub use queue_store::{JsonQueueStore, MemoryQueueStore, QueuePersistence, QUEUE_FORMAT_VERSION};

//! Durable storage for the work queue.
//!
//! The scheduler calls [`QueuePersistence::save`] after every mutation, so a
//! restart can pick the queue up where it left off.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::pipeline::item::WorkItem;

/// Current on-disk format version.
pub const QUEUE_FORMAT_VERSION: u32 = 1;

/// Persists the full item list.
#[async_trait]
pub trait QueuePersistence: Send + Sync {
    /// Replaces the stored queue with `items`.
    async fn save(&self, items: &[WorkItem]) -> Result<(), PersistenceError>;

    /// Loads the stored queue. A store that was never written yields an empty list.
    async fn load(&self) -> Result<Vec<WorkItem>, PersistenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    saved_at: DateTime<Utc>,
    items: Vec<WorkItem>,
}

/// Stores the queue as a single JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous queue intact.
#[derive(Debug, Clone)]
pub struct JsonQueueStore {
    path: PathBuf,
}

impl JsonQueueStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queue.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueuePersistence for JsonQueueStore {
    async fn save(&self, items: &[WorkItem]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    PersistenceError::DirectoryCreationFailed(format!(
                        "Failed to create directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        let document = QueueFile {
            version: QUEUE_FORMAT_VERSION,
            saved_at: Utc::now(),
            items: items.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, &self.path).await?;

        tracing::trace!(path = %self.path.display(), items = items.len(), "Queue saved");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<WorkItem>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read(&self.path).await?;
        let document: QueueFile = serde_json::from_slice(&raw)?;
        if document.version > QUEUE_FORMAT_VERSION {
            return Err(PersistenceError::InvalidData(format!(
                "queue file version {} is newer than supported version {}",
                document.version, QUEUE_FORMAT_VERSION
            )));
        }
        Ok(document.items)
    }
}

/// In-memory queue store.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<WorkItem>>,
    saves: AtomicUsize,
    attempts: AtomicUsize,
    fail_at: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `items`.
    pub fn with_items(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    /// Makes every subsequent `save` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes only the `n`-th call to `save` (1-based, counting every call) fail.
    pub fn fail_save_at(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last saved items.
    pub fn items(&self) -> Vec<WorkItem> {
        self.items
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueuePersistence for MemoryQueueStore {
    async fn save(&self, items: &[WorkItem]) -> Result<(), PersistenceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) || attempt == self.fail_at.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other(
                "queue store unavailable",
            )));
        }
        let mut stored = self
            .items
            .lock()
            .map_err(|_| PersistenceError::InvalidData("queue store poisoned".to_string()))?;
        *stored = items.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Vec<WorkItem>, PersistenceError> {
        Ok(self.items())
    }
}

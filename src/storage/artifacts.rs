//! Artifact storage for finished study notes.
//!
//! A finished note is stored as a markdown file next to a JSON sidecar holding
//! its metadata and provenance. Files are grouped per collection:
//!
//! ```text
//! <base_path>/<collection>/<slug>-<short-id>.md
//! <base_path>/<collection>/<slug>-<short-id>.json
//! ```
//!
//! A store may also push each artifact to a secondary remote. The pipeline
//! treats that push as best-effort and swallows its errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::pipeline::config::ProviderConfig;

/// Request timeout for remote sync in seconds.
const REMOTE_SYNC_TIMEOUT_SECS: u64 = 30;

/// How an artifact was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Provider used for the outline.
    pub structure_provider: ProviderConfig,
    /// Provider used for the note body.
    pub content_provider: ProviderConfig,
    /// The approved outline the content was expanded from.
    pub structure: String,
    /// Prompt customization in effect for the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_customization: Option<String>,
}

/// A finished study note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier.
    pub id: Uuid,
    /// Work item the note was generated for.
    pub item_id: String,
    /// Topic of the note.
    pub topic: String,
    /// Generated markdown content.
    pub content: String,
    /// Target collection.
    pub collection: String,
    /// Generation provenance.
    pub provenance: Provenance,
    /// SHA-256 checksum of `content`.
    pub checksum: String,
    /// When the artifact was created.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates an artifact and computes its checksum.
    pub fn new(
        item_id: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
        collection: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        let content = content.into();
        let checksum = compute_checksum(content.as_bytes());
        Self {
            id: Uuid::new_v4(),
            item_id: item_id.into(),
            topic: topic.into(),
            content,
            collection: collection.into(),
            provenance,
            checksum,
            created_at: Utc::now(),
        }
    }

    /// File stem used by the file store.
    pub fn file_stem(&self) -> String {
        let short_id: String = self.id.simple().to_string().chars().take(8).collect();
        format!("{}-{}", slugify(&self.topic), short_id)
    }
}

/// Metadata about a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Unique identifier.
    pub id: Uuid,
    /// Work item the note belongs to.
    pub item_id: String,
    /// Topic of the note.
    pub topic: String,
    /// Collection it was stored in.
    pub collection: String,
    /// SHA-256 checksum of the content.
    pub checksum: String,
    /// Size of the content in bytes.
    pub size_bytes: u64,
    /// Generation provenance.
    pub provenance: Provenance,
    /// When the artifact was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Artifact> for ArtifactMeta {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id,
            item_id: artifact.item_id.clone(),
            topic: artifact.topic.clone(),
            collection: artifact.collection.clone(),
            checksum: artifact.checksum.clone(),
            size_bytes: artifact.content.len() as u64,
            provenance: artifact.provenance.clone(),
            created_at: artifact.created_at,
        }
    }
}

/// Destination for finished notes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Durably stores the artifact. Errors must be surfaced.
    async fn save(&self, artifact: &Artifact) -> Result<(), PersistenceError>;

    /// Pushes the artifact to a secondary remote. Callers swallow errors.
    async fn sync_remote(&self, _artifact: &Artifact) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Best-effort HTTP push of artifacts to a remote endpoint.
pub struct HttpRemoteSync {
    client: Client,
    url: String,
}

impl HttpRemoteSync {
    /// Creates a remote sync posting artifacts as JSON to `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REMOTE_SYNC_TIMEOUT_SECS))
            .build()
            .map_err(|e| PersistenceError::RemoteSync(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts the artifact.
    pub async fn push(&self, artifact: &Artifact) -> Result<(), PersistenceError> {
        let response = self
            .client
            .post(&self.url)
            .json(artifact)
            .send()
            .await
            .map_err(|e| PersistenceError::RemoteSync(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::RemoteSync(format!(
                "remote responded with {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// File-based artifact store.
pub struct FileArtifactStore {
    base_path: PathBuf,
    remote: Option<HttpRemoteSync>,
}

impl FileArtifactStore {
    /// Creates a store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            remote: None,
        }
    }

    /// Attaches a remote sync target.
    pub fn with_remote(mut self, remote: HttpRemoteSync) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Returns the base storage path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.base_path.join(collection)
    }

    async fn ensure_directory(&self, dir: &Path) -> Result<(), PersistenceError> {
        if !dir.exists() {
            fs::create_dir_all(dir).await.map_err(|e| {
                PersistenceError::DirectoryCreationFailed(format!(
                    "Failed to create directory {:?}: {}",
                    dir, e
                ))
            })?;
        }
        Ok(())
    }

    /// Lists the metadata of every artifact in `collection`, oldest first.
    pub async fn list(&self, collection: &str) -> Result<Vec<ArtifactMeta>, PersistenceError> {
        let dir = self.collection_dir(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<ArtifactMeta>(&raw) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable artifact metadata");
                }
            }
        }

        metas.sort_by_key(|meta| meta.created_at);
        Ok(metas)
    }

    /// Reads the content of a stored artifact and verifies its checksum.
    pub async fn read_content(&self, meta: &ArtifactMeta) -> Result<String, PersistenceError> {
        let dir = self.collection_dir(&meta.collection);
        let mut entries = fs::read_dir(&dir).await?;
        let suffix: String = meta.id.simple().to_string().chars().take(8).collect();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_match = path.extension().and_then(|e| e.to_str()) == Some("md")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.ends_with(&suffix));
            if !is_match {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            let actual = compute_checksum(content.as_bytes());
            if actual != meta.checksum {
                return Err(PersistenceError::InvalidData(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    meta.id, meta.checksum, actual
                )));
            }
            return Ok(content);
        }
        Err(PersistenceError::InvalidData(format!(
            "content file for artifact {} not found",
            meta.id
        )))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save(&self, artifact: &Artifact) -> Result<(), PersistenceError> {
        let dir = self.collection_dir(&artifact.collection);
        self.ensure_directory(&dir).await?;

        let stem = artifact.file_stem();
        let content_path = dir.join(format!("{}.md", stem));
        let meta_path = dir.join(format!("{}.json", stem));

        let mut file = fs::File::create(&content_path).await?;
        file.write_all(artifact.content.as_bytes()).await?;
        file.sync_all().await?;

        let meta = serde_json::to_string_pretty(&ArtifactMeta::from(artifact))?;
        let mut file = fs::File::create(&meta_path).await?;
        file.write_all(meta.as_bytes()).await?;
        file.sync_all().await?;

        tracing::debug!(
            artifact_id = %artifact.id,
            path = %content_path.display(),
            "Artifact stored"
        );
        Ok(())
    }

    async fn sync_remote(&self, artifact: &Artifact) -> Result<(), PersistenceError> {
        match self.remote {
            Some(ref remote) => remote.push(artifact).await,
            None => Ok(()),
        }
    }
}

/// In-memory artifact store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<Vec<Artifact>>,
    fail_saves: AtomicBool,
    fail_remote: AtomicBool,
    remote_pushes: AtomicUsize,
}

impl MemoryArtifactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    /// Makes every subsequent `sync_remote` fail.
    pub fn set_remote_failing(&self, failing: bool) {
        self.fail_remote.store(failing, Ordering::SeqCst);
    }

    /// Copies of the stored artifacts.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of successful remote pushes.
    pub fn remote_pushes(&self) -> usize {
        self.remote_pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(&self, artifact: &Artifact) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other(
                "artifact store unavailable",
            )));
        }
        self.artifacts
            .lock()
            .map_err(|_| PersistenceError::InvalidData("artifact store poisoned".to_string()))?
            .push(artifact.clone());
        Ok(())
    }

    async fn sync_remote(&self, _artifact: &Artifact) -> Result<(), PersistenceError> {
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(PersistenceError::RemoteSync("remote unavailable".to_string()));
        }
        self.remote_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Computes the SHA-256 checksum of data.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Lowercase, hyphen-separated file name fragment for a topic.
fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut last_dash = true;
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "note".to_string()
    } else {
        slug
    }
}

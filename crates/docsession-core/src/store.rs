//! Remote content store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Content;

/// Remote state of a file as last reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    /// Last modification time (Unix epoch milliseconds).
    pub last_modified: i64,
    /// Size in bytes.
    pub size: u64,
}

/// File entry returned by [`ContentStore::get`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Store path.
    pub path: String,
    /// Remote metadata.
    pub metadata: RemoteMetadata,
    /// Whether the store accepts saves for this path.
    pub writable: bool,
    /// Content, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

/// Save payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    /// Logical content type (e.g. `file`, `notebook`).
    pub content_type: String,
    /// Serialized model.
    pub content: Content,
}

/// A stored checkpoint of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint identifier.
    pub id: String,
    /// Modification time of the file when the checkpoint was taken.
    pub last_modified: i64,
}

/// Store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Internal(String),
}

/// Trait for remote content stores.
///
/// Implementations may be modified concurrently by other clients; no
/// exclusive lock is ever taken.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Get metadata, and content when `with_content` is set.
    async fn get(&self, path: &str, with_content: bool) -> Result<RemoteFile, StoreError>;

    /// Persist content, returning the new remote metadata.
    async fn save(&self, path: &str, request: SaveRequest) -> Result<RemoteMetadata, StoreError>;

    /// Fetch current content for reloading a model.
    async fn revert(&self, path: &str) -> Result<RemoteFile, StoreError> {
        self.get(path, true).await
    }

    /// Move a file.
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<RemoteMetadata, StoreError>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Snapshot the current remote content.
    async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, StoreError>;

    /// List checkpoints for a file, oldest first.
    async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, StoreError>;

    /// Replace the remote content with a checkpoint.
    async fn restore_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<(), StoreError>;
}

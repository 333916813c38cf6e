//! In-memory content store.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use docsession_core::{
    Checkpoint, Content, ContentStore, RemoteFile, RemoteMetadata, SaveRequest, StoreError, sync,
};
use uuid::Uuid;

struct StoredFile {
    content: Content,
    metadata: RemoteMetadata,
    writable: bool,
    checkpoints: Vec<(Checkpoint, Content)>,
}

/// Counters of store calls, for observing session behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    /// `get` calls without content.
    pub metadata_reads: usize,
    /// `get` calls with content (including reverts).
    pub content_reads: usize,
    /// `save` calls.
    pub saves: usize,
}

impl StoreCalls {
    /// Total number of read and save calls.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.metadata_reads + self.content_reads + self.saves
    }
}

/// In-memory content store.
///
/// Useful for development and tests. Data is lost on restart.
/// Timestamps are wall-clock milliseconds forced to increase strictly, so
/// every write is observable as a modification.
pub struct MemoryContentStore {
    files: RwLock<HashMap<String, StoredFile>>,
    clock: AtomicI64,
    available: AtomicBool,
    metadata_available: AtomicBool,
    save_delay: RwLock<Option<Duration>>,
    metadata_reads: AtomicUsize,
    content_reads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryContentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(0),
            available: AtomicBool::new(true),
            metadata_available: AtomicBool::new(true),
            save_delay: RwLock::new(None),
            metadata_reads: AtomicUsize::new(0),
            content_reads: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        }
    }

    /// Create or replace a file as another client would.
    pub fn write_external(&self, path: &str, content: Content) -> RemoteMetadata {
        let metadata = RemoteMetadata {
            last_modified: self.tick(),
            size: content.approx_bytes(),
        };
        let mut files = sync::write(&self.files);
        let (checkpoints, writable) = files
            .remove(path)
            .map_or_else(|| (Vec::new(), true), |file| (file.checkpoints, file.writable));
        files.insert(
            path.to_string(),
            StoredFile {
                content,
                metadata,
                writable,
                checkpoints,
            },
        );
        metadata
    }

    /// Mark a file read-only or writable.
    pub fn set_writable(&self, path: &str, writable: bool) {
        if let Some(file) = sync::write(&self.files).get_mut(path) {
            file.writable = writable;
        }
    }

    /// Current content of a file.
    #[must_use]
    pub fn content(&self, path: &str) -> Option<Content> {
        sync::read(&self.files)
            .get(path)
            .map(|file| file.content.clone())
    }

    /// Whether a file exists.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        sync::read(&self.files).contains_key(path)
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail only metadata reads (`get` without content) while `false`.
    pub fn set_metadata_available(&self, available: bool) {
        self.metadata_available.store(available, Ordering::SeqCst);
    }

    /// Make every save take `delay` before completing.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        *sync::write(&self.save_delay) = delay;
    }

    /// Snapshot of call counters.
    #[must_use]
    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            metadata_reads: self.metadata_reads.load(Ordering::SeqCst),
            content_reads: self.content_reads.load(Ordering::SeqCst),
            saves: self.saves.load(Ordering::SeqCst),
        }
    }

    fn tick(&self) -> i64 {
        let now = now_millis();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, path: &str, with_content: bool) -> Result<RemoteFile, StoreError> {
        if with_content {
            self.content_reads.fetch_add(1, Ordering::SeqCst);
        } else {
            self.metadata_reads.fetch_add(1, Ordering::SeqCst);
        }
        self.ensure_available()?;
        if !with_content && !self.metadata_available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store metadata offline".to_string(),
            ));
        }

        let files = sync::read(&self.files);
        let file = files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(RemoteFile {
            path: path.to_string(),
            metadata: file.metadata,
            writable: file.writable,
            content: with_content.then(|| file.content.clone()),
        })
    }

    async fn save(&self, path: &str, request: SaveRequest) -> Result<RemoteMetadata, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let delay = *sync::read(&self.save_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_available()?;

        if sync::read(&self.files)
            .get(path)
            .is_some_and(|file| !file.writable)
        {
            return Err(StoreError::Internal(format!("{path} is read-only")));
        }
        Ok(self.write_external(path, request.content))
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<RemoteMetadata, StoreError> {
        self.ensure_available()?;
        let mut files = sync::write(&self.files);
        if files.contains_key(new_path) {
            return Err(StoreError::Internal(format!("{new_path} already exists")));
        }
        let file = files
            .remove(old_path)
            .ok_or_else(|| StoreError::NotFound(old_path.to_string()))?;
        let metadata = file.metadata;
        files.insert(new_path.to_string(), file);
        Ok(metadata)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        sync::write(&self.files)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, StoreError> {
        self.ensure_available()?;
        let mut files = sync::write(&self.files);
        let file = files
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            last_modified: file.metadata.last_modified,
        };
        file.checkpoints
            .push((checkpoint.clone(), file.content.clone()));
        Ok(checkpoint)
    }

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, StoreError> {
        self.ensure_available()?;
        let files = sync::read(&self.files);
        let file = files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(file.checkpoints.iter().map(|(cp, _)| cp.clone()).collect())
    }

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        let content = {
            let files = sync::read(&self.files);
            let file = files
                .get(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            file.checkpoints
                .iter()
                .find(|(cp, _)| cp.id == checkpoint_id)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| StoreError::NotFound(format!("{path}@{checkpoint_id}")))?
        };
        self.write_external(path, content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn text(s: &str) -> Content {
        Content::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_save_bumps_last_modified() {
        let store = MemoryContentStore::new();
        let first = store.write_external("a.txt", text("one"));
        let second = store
            .save(
                "a.txt",
                SaveRequest {
                    content_type: "file".into(),
                    content: text("two"),
                },
            )
            .await
            .unwrap();
        assert!(second.last_modified > first.last_modified);
        assert_eq!(store.content("a.txt"), Some(text("two")));
        assert_eq!(store.calls().saves, 1);
    }

    #[tokio::test]
    async fn test_get_counts_reads() {
        let store = MemoryContentStore::new();
        store.write_external("a.txt", text("x"));
        let meta_only = store.get("a.txt", false).await.unwrap();
        assert!(meta_only.content.is_none());
        let full = store.revert("a.txt").await.unwrap();
        assert_eq!(full.content, Some(text("x")));
        assert_eq!(
            store.calls(),
            StoreCalls {
                metadata_reads: 1,
                content_reads: 1,
                saves: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryContentStore::new();
        store.write_external("a.txt", text("x"));
        store.set_available(false);
        assert!(matches!(
            store.get("a.txt", false).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_outage_keeps_content_reads() {
        let store = MemoryContentStore::new();
        store.write_external("a.txt", text("x"));
        store.set_metadata_available(false);
        assert_err!(store.get("a.txt", false).await);
        assert_eq!(store.revert("a.txt").await.unwrap().content, Some(text("x")));
    }

    #[tokio::test]
    async fn test_read_only_rejects_save() {
        let store = MemoryContentStore::new();
        store.write_external("a.txt", text("x"));
        store.set_writable("a.txt", false);
        let request = SaveRequest {
            content_type: "file".into(),
            content: text("y"),
        };
        assert!(store.save("a.txt", request).await.is_err());
        assert!(!store.get("a.txt", false).await.unwrap().writable);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let store = MemoryContentStore::new();
        let meta = store.write_external("a.txt", text("x"));
        assert_eq!(store.rename("a.txt", "b.txt").await.unwrap(), meta);
        assert!(!store.contains("a.txt"));
        assert_ok!(store.delete("b.txt").await);
        assert!(matches!(
            store.delete("b.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_checkpoint_restore() {
        let store = MemoryContentStore::new();
        store.write_external("a.txt", text("v1"));
        let checkpoint = store.create_checkpoint("a.txt").await.unwrap();
        store.write_external("a.txt", text("v2"));

        assert_eq!(store.list_checkpoints("a.txt").await.unwrap(), [checkpoint.clone()]);
        store.restore_checkpoint("a.txt", &checkpoint.id).await.unwrap();
        assert_eq!(store.content("a.txt"), Some(text("v1")));
        assert_err!(store.restore_checkpoint("a.txt", "missing").await);
    }
}

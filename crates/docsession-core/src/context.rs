//! Shared per-document session context.

use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::{
    model::{DocumentModel, ModelError},
    signal::Signal,
    store::{Checkpoint, ContentStore, RemoteMetadata, SaveRequest, StoreError},
    sync,
};

/// Context error.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context is disposed")]
    Disposed,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Store returned no content for {0}")]
    MissingContent(String),
    #[error("Context failed to load: {0}")]
    LoadFailed(String),
}

/// Readiness of a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Initial load or save in progress.
    Loading,
    /// Model populated and remote metadata known.
    Ready,
    /// Initialization failed.
    Failed(String),
    /// Context disposed; terminal.
    Disposed,
}

/// Notifications emitted by a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// Initialization finished.
    Ready,
    /// The document moved.
    PathChanged(String),
    /// Remote metadata changed after a save, revert or rename.
    FileChanged(RemoteMetadata),
    /// A save completed.
    Saved(RemoteMetadata),
    /// The context was disposed.
    Disposed,
}

/// Shared handle for one open document.
///
/// Every widget viewing the document and exactly one autosave coordinator
/// hold an `Arc` to the same context.
pub struct SessionContext {
    id: Uuid,
    model_factory_name: String,
    content_type: String,
    model: Arc<dyn DocumentModel>,
    store: Arc<dyn ContentStore>,
    path: RwLock<String>,
    remote: RwLock<Option<RemoteMetadata>>,
    ready: watch::Sender<ReadyState>,
    events: Signal<ContextEvent>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("model_factory_name", &self.model_factory_name)
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Create a loading context. Call [`Self::initialize`] to populate it.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        model_factory_name: impl Into<String>,
        content_type: impl Into<String>,
        model: Arc<dyn DocumentModel>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let (ready, _) = watch::channel(ReadyState::Loading);
        Self {
            id: Uuid::new_v4(),
            model_factory_name: model_factory_name.into(),
            content_type: content_type.into(),
            model,
            store,
            path: RwLock::new(path.into()),
            remote: RwLock::new(None),
            ready,
            events: Signal::new(),
        }
    }

    /// Unique context identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current document path.
    #[must_use]
    pub fn path(&self) -> String {
        sync::read(&self.path).clone()
    }

    /// Name of the model factory that built the model.
    #[must_use]
    pub fn model_factory_name(&self) -> &str {
        &self.model_factory_name
    }

    /// Shared model.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn DocumentModel> {
        &self.model
    }

    /// Last known remote metadata, `None` until ready.
    #[must_use]
    pub fn remote_metadata(&self) -> Option<RemoteMetadata> {
        *sync::read(&self.remote)
    }

    /// Current readiness.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.ready.borrow().clone()
    }

    /// Whether initialization completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.ready.borrow(), ReadyState::Ready)
    }

    /// Whether the context has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(*self.ready.borrow(), ReadyState::Disposed)
    }

    /// Subscribe to context events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    /// Wait until initialization finishes.
    ///
    /// # Errors
    /// Returns error if initialization failed or the context was disposed.
    pub async fn ready(&self) -> Result<(), ContextError> {
        let mut rx = self.ready.subscribe();
        let state = rx
            .wait_for(|state| *state != ReadyState::Loading)
            .await
            .map_err(|_| ContextError::Disposed)?
            .clone();
        match state {
            ReadyState::Ready | ReadyState::Loading => Ok(()),
            ReadyState::Failed(message) => Err(ContextError::LoadFailed(message)),
            ReadyState::Disposed => Err(ContextError::Disposed),
        }
    }

    /// Populate the context: save a new document, or load an existing one.
    ///
    /// # Errors
    /// Returns error if the store or model rejects the operation.
    pub async fn initialize(&self, is_new: bool) -> Result<(), ContextError> {
        let result = if is_new {
            self.save().await
        } else {
            self.revert().await
        };
        match &result {
            Ok(()) => {
                let became_ready = self.ready.send_if_modified(|state| {
                    if *state == ReadyState::Loading {
                        *state = ReadyState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if became_ready {
                    tracing::debug!(path = %self.path(), "Context ready");
                    self.events.emit(ContextEvent::Ready);
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path(), error = %e, "Context initialization failed");
                let message = e.to_string();
                self.ready.send_if_modified(|state| {
                    if *state == ReadyState::Loading {
                        *state = ReadyState::Failed(message);
                        true
                    } else {
                        false
                    }
                });
            }
        }
        result
    }

    /// Persist the model to the store.
    ///
    /// # Errors
    /// Returns error if the context is disposed or the store fails.
    pub async fn save(&self) -> Result<(), ContextError> {
        self.ensure_live()?;
        let path = self.path();
        let request = SaveRequest {
            content_type: self.content_type.clone(),
            content: self.model.to_content(),
        };
        let metadata = self.store.save(&path, request).await?;
        *sync::write(&self.remote) = Some(metadata);
        self.model.set_dirty(false);
        tracing::debug!(path = %path, last_modified = metadata.last_modified, "Saved");
        self.events.emit(ContextEvent::Saved(metadata));
        self.events.emit(ContextEvent::FileChanged(metadata));
        Ok(())
    }

    /// Discard local state and reload the model from the store.
    ///
    /// # Errors
    /// Returns error if the context is disposed, the store fails, or the
    /// content does not fit the model.
    pub async fn revert(&self) -> Result<(), ContextError> {
        self.ensure_live()?;
        let path = self.path();
        let file = self.store.revert(&path).await?;
        let content = file
            .content
            .ok_or_else(|| ContextError::MissingContent(path.clone()))?;
        self.model.load_content(content)?;
        self.model.set_dirty(false);
        self.model.set_read_only(!file.writable);
        *sync::write(&self.remote) = Some(file.metadata);
        tracing::debug!(path = %path, last_modified = file.metadata.last_modified, "Reverted");
        self.events.emit(ContextEvent::FileChanged(file.metadata));
        Ok(())
    }

    /// Query the store for the current remote metadata without content.
    ///
    /// # Errors
    /// Returns error if the context is disposed or the store fails.
    pub async fn fetch_metadata(&self) -> Result<RemoteMetadata, ContextError> {
        self.ensure_live()?;
        let file = self.store.get(&self.path(), false).await?;
        Ok(file.metadata)
    }

    /// Move the document in the store and follow it.
    ///
    /// # Errors
    /// Returns error if the context is disposed or the store fails.
    pub async fn rename(&self, new_path: &str) -> Result<(), ContextError> {
        self.ensure_live()?;
        let metadata = self.store.rename(&self.path(), new_path).await?;
        self.set_path(new_path);
        *sync::write(&self.remote) = Some(metadata);
        self.events.emit(ContextEvent::FileChanged(metadata));
        Ok(())
    }

    /// Follow a move performed elsewhere.
    pub fn set_path(&self, new_path: &str) {
        let mut path = sync::write(&self.path);
        if *path == new_path {
            return;
        }
        tracing::debug!(from = %*path, to = %new_path, "Context path changed");
        new_path.clone_into(&mut path);
        drop(path);
        self.events.emit(ContextEvent::PathChanged(new_path.to_string()));
    }

    /// Snapshot the remote file.
    ///
    /// # Errors
    /// Returns error if the context is disposed or the store fails.
    pub async fn create_checkpoint(&self) -> Result<Checkpoint, ContextError> {
        self.ensure_live()?;
        Ok(self.store.create_checkpoint(&self.path()).await?)
    }

    /// List remote checkpoints, oldest first.
    ///
    /// # Errors
    /// Returns error if the context is disposed or the store fails.
    pub async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, ContextError> {
        self.ensure_live()?;
        Ok(self.store.list_checkpoints(&self.path()).await?)
    }

    /// Restore a checkpoint remotely, then reload the model from it.
    ///
    /// # Errors
    /// Returns error if the context is disposed, the store fails, or the
    /// restored content does not fit the model.
    pub async fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<(), ContextError> {
        self.ensure_live()?;
        self.store
            .restore_checkpoint(&self.path(), checkpoint_id)
            .await?;
        self.revert().await
    }

    /// Dispose the context. Idempotent.
    pub fn dispose(&self) {
        let previous = self.ready.send_replace(ReadyState::Disposed);
        if previous != ReadyState::Disposed {
            tracing::debug!(path = %self.path(), "Context disposed");
            self.events.emit(ContextEvent::Disposed);
        }
    }

    fn ensure_live(&self) -> Result<(), ContextError> {
        if self.is_disposed() {
            Err(ContextError::Disposed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_test::assert_ok;

    use super::*;
    use crate::{
        model::{Content, TextModel},
        store::RemoteFile,
    };

    #[derive(Default)]
    struct StubStore {
        content: Mutex<Option<String>>,
        saves: Mutex<Vec<SaveRequest>>,
    }

    fn meta(last_modified: i64) -> RemoteMetadata {
        RemoteMetadata {
            last_modified,
            size: 0,
        }
    }

    #[async_trait]
    impl ContentStore for StubStore {
        async fn get(&self, path: &str, with_content: bool) -> Result<RemoteFile, StoreError> {
            let content = self
                .content
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            Ok(RemoteFile {
                path: path.to_string(),
                metadata: meta(10),
                writable: true,
                content: with_content.then(|| Content::Text(content)),
            })
        }

        async fn save(&self, _path: &str, request: SaveRequest) -> Result<RemoteMetadata, StoreError> {
            self.saves.lock().unwrap().push(request);
            Ok(meta(20))
        }

        async fn rename(&self, _old: &str, _new: &str) -> Result<RemoteMetadata, StoreError> {
            Ok(meta(30))
        }

        async fn delete(&self, _path: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn create_checkpoint(&self, _path: &str) -> Result<Checkpoint, StoreError> {
            Ok(Checkpoint {
                id: "cp".into(),
                last_modified: 10,
            })
        }

        async fn list_checkpoints(&self, _path: &str) -> Result<Vec<Checkpoint>, StoreError> {
            Ok(Vec::new())
        }

        async fn restore_checkpoint(&self, _path: &str, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn context_with(store: Arc<StubStore>) -> (SessionContext, Arc<TextModel>) {
        let model = Arc::new(TextModel::new());
        let ctx = SessionContext::new("a.txt", "text", "file", model.clone(), store);
        (ctx, model)
    }

    #[tokio::test]
    async fn test_initialize_existing_loads_content() {
        let store = Arc::new(StubStore::default());
        *store.content.lock().unwrap() = Some("remote".into());
        let (ctx, model) = context_with(store);
        let mut events = ctx.subscribe();

        assert_ok!(ctx.initialize(false).await);

        assert_eq!(model.text(), "remote");
        assert!(ctx.is_ready());
        assert_eq!(ctx.remote_metadata(), Some(meta(10)));
        assert_eq!(events.recv().await.unwrap(), ContextEvent::FileChanged(meta(10)));
        assert_eq!(events.recv().await.unwrap(), ContextEvent::Ready);
    }

    #[tokio::test]
    async fn test_initialize_new_saves() {
        let store = Arc::new(StubStore::default());
        let (ctx, model) = context_with(store.clone());
        model.set_text("fresh");

        assert_ok!(ctx.initialize(true).await);

        assert_eq!(store.saves.lock().unwrap().len(), 1);
        assert!(!model.is_dirty());
        assert_eq!(ctx.remote_metadata(), Some(meta(20)));
        ctx.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_initialization_surfaces_in_ready() {
        let (ctx, _) = context_with(Arc::new(StubStore::default()));
        assert!(ctx.initialize(false).await.is_err());
        assert!(matches!(ctx.ready_state(), ReadyState::Failed(_)));
        assert!(matches!(ctx.ready().await, Err(ContextError::LoadFailed(_))));
    }

    #[tokio::test]
    async fn test_disposed_context_rejects_io() {
        let (ctx, _) = context_with(Arc::new(StubStore::default()));
        let mut events = ctx.subscribe();
        ctx.dispose();
        ctx.dispose();
        assert_eq!(events.recv().await.unwrap(), ContextEvent::Disposed);
        assert!(events.try_recv().is_err());
        assert!(matches!(ctx.save().await, Err(ContextError::Disposed)));
        assert!(matches!(ctx.ready().await, Err(ContextError::Disposed)));
    }

    #[tokio::test]
    async fn test_rename_emits_path_changed() {
        let (ctx, _) = context_with(Arc::new(StubStore::default()));
        let mut events = ctx.subscribe();
        ctx.rename("b.txt").await.unwrap();
        assert_eq!(ctx.path(), "b.txt");
        assert_eq!(
            events.recv().await.unwrap(),
            ContextEvent::PathChanged("b.txt".into())
        );
    }
}

//! Session manager: one shared context per open document.

use std::{
    sync::{
        Arc, RwLock as StdRwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use docsession_core::{
    ConflictDialog, ContentStore, ReadyState, SessionConfig, SessionContext, StoreError, sync,
};
use docsession_registry::{
    DocumentWidget, ModelFactoryRecord, OpenHint, TypeRegistry, WidgetFactoryRecord, WidgetId,
};
use tokio::sync::RwLock;

use crate::{
    autosave::AutosaveCoordinator,
    lifecycle::{NoopLifecycle, WidgetLifecycle},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Widget not found: {0}")]
    WidgetNotFound(WidgetId),
    #[error("Rename target has unsaved changes: {0}")]
    UnsavedTarget(String),
}

/// Live autosave settings applied to new and existing contexts.
#[derive(Debug, Clone, Copy)]
struct AutosaveSettings {
    enabled: bool,
    interval: Duration,
}

/// A tracked context and its autosave loop.
struct OpenContext {
    context: Arc<SessionContext>,
    autosave: Arc<AutosaveCoordinator>,
}

impl OpenContext {
    /// Tracked for `path` and the model factory, whatever its load state.
    fn is_for(&self, path: &str, model_factory_name: &str) -> bool {
        !self.context.is_disposed()
            && self.context.path() == path
            && self
                .context
                .model_factory_name()
                .eq_ignore_ascii_case(model_factory_name)
    }

    fn has_failed(&self) -> bool {
        matches!(self.context.ready_state(), ReadyState::Failed(_))
    }

    /// Loading or ready context for `path` and the model factory.
    fn matches(&self, path: &str, model_factory_name: &str) -> bool {
        self.is_for(path, model_factory_name) && !self.has_failed()
    }
}

/// A widget and the context it is bound to.
struct WidgetBinding {
    widget: Arc<dyn DocumentWidget>,
    context: Arc<SessionContext>,
}

/// Session manager for shared document contexts.
///
/// Finds or creates the single context for a `(path, model factory)` pair,
/// binds widgets to it, and drives its autosave loop. Lock order is
/// contexts before bindings.
pub struct SessionManager {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn ContentStore>,
    dialog: Arc<dyn ConflictDialog>,
    lifecycle: Arc<dyn WidgetLifecycle>,
    autosave: Arc<StdRwLock<AutosaveSettings>>,
    contexts: RwLock<Vec<OpenContext>>,
    bindings: RwLock<Vec<WidgetBinding>>,
    disposed: AtomicBool,
}

impl SessionManager {
    /// Create a new session manager.
    #[must_use]
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn ContentStore>,
        dialog: Arc<dyn ConflictDialog>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            registry,
            store,
            dialog,
            lifecycle: Arc::new(NoopLifecycle),
            autosave: Arc::new(StdRwLock::new(AutosaveSettings {
                enabled: config.autosave.enabled,
                interval: config.autosave.interval(),
            })),
            contexts: RwLock::new(Vec::new()),
            bindings: RwLock::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Use a host lifecycle policy instead of [`NoopLifecycle`].
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn WidgetLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// The registry used for factory resolution.
    #[must_use]
    pub const fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Whether [`Self::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Open `path` with a widget factory (`"default"` resolves by extension).
    ///
    /// Reuses the live context for the path and model factory without
    /// reloading it; otherwise creates one and loads it from the store in
    /// the background. A context whose load failed is closed with its
    /// widgets and replaced. Returns `None` when no factory resolves.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn open(
        &self,
        path: &str,
        widget_factory_name: &str,
        hint: Option<&OpenHint>,
    ) -> Option<Arc<dyn DocumentWidget>> {
        self.ensure_live();
        let (widget_factory, model_factory) = self.resolve(path, widget_factory_name)?;

        let mut contexts = self.contexts.write().await;
        self.evict_failed(&mut contexts, path, model_factory.name()).await;
        let context = if let Some(open) = contexts
            .iter()
            .find(|open| open.matches(path, model_factory.name()))
        {
            tracing::debug!(path = %path, "Reusing open context");
            Arc::clone(&open.context)
        } else {
            let open = self.new_open_context(path, &model_factory, false);
            let context = Arc::clone(&open.context);
            contexts.push(open);
            context
        };
        let widget = self.bind_widget(&widget_factory, context, hint).await;
        drop(contexts);
        Some(widget)
    }

    /// Create `path` as a new, empty document and save it.
    ///
    /// Always builds a fresh context; a live context for the same path and
    /// model factory is closed first, together with its widgets.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn create_new(
        &self,
        path: &str,
        widget_factory_name: &str,
        hint: Option<&OpenHint>,
    ) -> Option<Arc<dyn DocumentWidget>> {
        self.ensure_live();
        let (widget_factory, model_factory) = self.resolve(path, widget_factory_name)?;

        let mut contexts = self.contexts.write().await;
        let (stale, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *contexts)
            .into_iter()
            .partition(|open| open.is_for(path, model_factory.name()));
        *contexts = keep;
        for open in stale {
            tracing::info!(path = %path, "Replacing open context with a new document");
            self.close_context(open).await;
        }
        let open = self.new_open_context(path, &model_factory, true);
        let context = Arc::clone(&open.context);
        contexts.push(open);
        let widget = self.bind_widget(&widget_factory, context, hint).await;
        drop(contexts);
        Some(widget)
    }

    /// Find an existing widget for `path` built by a widget factory.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn find_widget(
        &self,
        path: &str,
        widget_factory_name: &str,
    ) -> Option<Arc<dyn DocumentWidget>> {
        self.ensure_live();
        let (widget_factory, model_factory) = self.resolve(path, widget_factory_name)?;

        let contexts = self.contexts.read().await;
        let open = contexts
            .iter()
            .find(|open| open.matches(path, model_factory.name()))?;
        self.bindings
            .read()
            .await
            .iter()
            .find(|binding| {
                Arc::ptr_eq(&binding.context, &open.context)
                    && !binding.widget.is_disposed()
                    && binding
                        .widget
                        .factory_name()
                        .eq_ignore_ascii_case(widget_factory.name())
            })
            .map(|binding| Arc::clone(&binding.widget))
    }

    /// Return the existing widget for `path`, or open a new one.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn open_or_reveal(
        &self,
        path: &str,
        widget_factory_name: &str,
        hint: Option<&OpenHint>,
    ) -> Option<Arc<dyn DocumentWidget>> {
        if let Some(widget) = self.find_widget(path, widget_factory_name).await {
            return Some(widget);
        }
        self.open(path, widget_factory_name, hint).await
    }

    /// Context a widget is bound to.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn context_for_widget(&self, widget_id: WidgetId) -> Option<Arc<SessionContext>> {
        self.ensure_live();
        self.bindings
            .read()
            .await
            .iter()
            .find(|binding| binding.widget.id() == widget_id)
            .map(|binding| Arc::clone(&binding.context))
    }

    /// Widgets bound to any context for `path`.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn widgets_for_path(&self, path: &str) -> Vec<Arc<dyn DocumentWidget>> {
        self.ensure_live();
        self.bindings
            .read()
            .await
            .iter()
            .filter(|binding| binding.context.path() == path)
            .map(|binding| Arc::clone(&binding.widget))
            .collect()
    }

    /// Contexts currently open.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn open_contexts(&self) -> Vec<Arc<SessionContext>> {
        self.ensure_live();
        self.contexts
            .read()
            .await
            .iter()
            .map(|open| Arc::clone(&open.context))
            .collect()
    }

    /// Autosave coordinator of an open context.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn autosave_for(
        &self,
        context: &Arc<SessionContext>,
    ) -> Option<Arc<AutosaveCoordinator>> {
        self.ensure_live();
        self.contexts
            .read()
            .await
            .iter()
            .find(|open| Arc::ptr_eq(&open.context, context))
            .map(|open| Arc::clone(&open.autosave))
    }

    /// Close one widget.
    ///
    /// Closing the last widget of a dirty document asks the lifecycle to
    /// confirm; a refusal returns `Ok(false)` and changes nothing. Closing
    /// the last widget of a context closes the context.
    ///
    /// # Errors
    /// Returns error if no widget has this id.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn close_widget(&self, widget_id: WidgetId) -> Result<bool, ManagerError> {
        self.ensure_live();
        let mut confirmed = false;
        loop {
            let mut contexts = self.contexts.write().await;
            let mut bindings = self.bindings.write().await;
            let pos = bindings
                .iter()
                .position(|binding| binding.widget.id() == widget_id)
                .ok_or(ManagerError::WidgetNotFound(widget_id))?;
            let context = Arc::clone(&bindings[pos].context);
            let is_last = bindings
                .iter()
                .filter(|other| Arc::ptr_eq(&other.context, &context))
                .count()
                == 1;

            // Bindings may change while the host is asked; re-check after.
            if is_last && !confirmed && context.model().is_dirty() {
                let widget = Arc::clone(&bindings[pos].widget);
                drop(bindings);
                drop(contexts);
                if !self.lifecycle.confirm_close(&widget).await {
                    tracing::debug!(path = %context.path(), "Close cancelled");
                    return Ok(false);
                }
                confirmed = true;
                continue;
            }

            let binding = bindings.remove(pos);
            drop(bindings);
            binding.widget.dispose();
            self.lifecycle.disposed(widget_id);

            if is_last {
                if let Some(pos) = contexts
                    .iter()
                    .position(|open| Arc::ptr_eq(&open.context, &context))
                {
                    let open = contexts.remove(pos);
                    self.close_context(open).await;
                }
            }
            return Ok(true);
        }
    }

    /// Dispose every widget and context for `path`.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn close_file(&self, path: &str) {
        self.ensure_live();
        let mut contexts = self.contexts.write().await;
        let (closing, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *contexts)
            .into_iter()
            .partition(|open| open.context.path() == path);
        *contexts = keep;
        for open in closing {
            self.close_context(open).await;
        }
    }

    /// Close every open context.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn close_all(&self) {
        self.ensure_live();
        self.close_everything().await;
    }

    /// Rename a file in the store; open contexts follow it.
    ///
    /// Contexts already tracked for `new_path` with the same model factory
    /// as a moving context are closed, so at most one stays live.
    ///
    /// # Errors
    /// Returns error if the store rejects the rename, or if such a context
    /// at `new_path` is loaded and has unsaved changes.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), ManagerError> {
        self.ensure_live();
        let mut contexts = self.contexts.write().await;
        let moving: Vec<String> = contexts
            .iter()
            .filter(|open| !open.context.is_disposed() && open.context.path() == old_path)
            .map(|open| open.context.model_factory_name().to_string())
            .collect();
        let collides = |open: &OpenContext| {
            moving
                .iter()
                .any(|model| open.is_for(new_path, model))
        };

        if contexts
            .iter()
            .any(|open| collides(open) && !open.has_failed() && open.context.model().is_dirty())
        {
            tracing::warn!(from = %old_path, to = %new_path, "Rename target has unsaved changes");
            return Err(ManagerError::UnsavedTarget(new_path.to_string()));
        }

        self.store.rename(old_path, new_path).await?;

        let (replaced, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *contexts)
            .into_iter()
            .partition(collides);
        *contexts = keep;
        for open in replaced {
            tracing::info!(path = %new_path, "Closing context replaced by rename");
            self.close_context(open).await;
        }
        for open in contexts
            .iter()
            .filter(|open| !open.context.is_disposed() && open.context.path() == old_path)
        {
            open.context.set_path(new_path);
        }
        Ok(())
    }

    /// Close `path` and delete it from the store.
    ///
    /// # Errors
    /// Returns error if the store rejects the delete.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn delete_file(&self, path: &str) -> Result<(), ManagerError> {
        self.close_file(path).await;
        self.store.delete(path).await?;
        Ok(())
    }

    /// Enable or disable autosave for all current and future contexts.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn set_autosave(&self, enabled: bool) {
        self.ensure_live();
        sync::write(&self.autosave).enabled = enabled;
        for open in self.contexts.read().await.iter() {
            if !enabled {
                open.autosave.stop();
            } else if open.context.is_ready() {
                open.autosave.start();
            }
        }
    }

    /// Set the autosave interval for all current and future contexts.
    ///
    /// # Panics
    /// Panics if the manager has been disposed.
    pub async fn set_autosave_interval(&self, interval: Duration) {
        self.ensure_live();
        sync::write(&self.autosave).interval = interval;
        for open in self.contexts.read().await.iter() {
            open.autosave.set_save_interval(interval);
        }
    }

    /// Dispose every context and widget. Idempotent; any other call after
    /// this panics.
    pub async fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        self.close_everything().await;
        self.disposed.store(true, Ordering::SeqCst);
        tracing::debug!("Session manager disposed");
    }

    fn ensure_live(&self) {
        assert!(
            !self.is_disposed(),
            "SessionManager used after it was disposed"
        );
    }

    fn resolve(
        &self,
        path: &str,
        widget_factory_name: &str,
    ) -> Option<(Arc<WidgetFactoryRecord>, Arc<ModelFactoryRecord>)> {
        let Some(widget_factory) = self
            .registry
            .resolve_widget_factory(path, widget_factory_name)
        else {
            tracing::debug!(path = %path, factory = %widget_factory_name, "No widget factory");
            return None;
        };
        let Some(model_factory) = self.registry.get_model_factory(widget_factory.model_name())
        else {
            tracing::debug!(
                path = %path,
                factory = %widget_factory.name(),
                model = %widget_factory.model_name(),
                "Model factory not registered"
            );
            return None;
        };
        Some((widget_factory, model_factory))
    }

    /// Build a context and its coordinator, and start loading it.
    fn new_open_context(
        &self,
        path: &str,
        model_factory: &ModelFactoryRecord,
        is_new: bool,
    ) -> OpenContext {
        let settings = *sync::read(&self.autosave);
        let context = Arc::new(SessionContext::new(
            path,
            model_factory.name(),
            model_factory.content_type(),
            model_factory.create_model(),
            Arc::clone(&self.store),
        ));
        let autosave = Arc::new(AutosaveCoordinator::new(
            Arc::clone(&context),
            Arc::clone(&self.dialog),
            settings.interval,
        ));
        tracing::debug!(path = %path, model = %model_factory.name(), is_new, "Created context");

        let initializing = Arc::clone(&context);
        let coordinator = Arc::clone(&autosave);
        let live_settings = Arc::clone(&self.autosave);
        tokio::spawn(async move {
            if initializing.initialize(is_new).await.is_ok() && sync::read(&live_settings).enabled {
                coordinator.start();
            }
        });

        OpenContext { context, autosave }
    }

    async fn bind_widget(
        &self,
        factory: &WidgetFactoryRecord,
        context: Arc<SessionContext>,
        hint: Option<&OpenHint>,
    ) -> Arc<dyn DocumentWidget> {
        let widget = factory.create_widget(Arc::clone(&context), hint);
        debug_assert!(
            Arc::ptr_eq(widget.context(), &context),
            "widget factory {} bound a widget to a different context",
            factory.name()
        );
        self.lifecycle.adopt(&widget, hint);
        self.bindings.write().await.push(WidgetBinding {
            widget: Arc::clone(&widget),
            context,
        });
        widget
    }

    /// Close tracked contexts for the pair whose initial load failed.
    async fn evict_failed(
        &self,
        contexts: &mut Vec<OpenContext>,
        path: &str,
        model_factory_name: &str,
    ) {
        let (failed, keep): (Vec<_>, Vec<_>) = std::mem::take(contexts)
            .into_iter()
            .partition(|open| open.is_for(path, model_factory_name) && open.has_failed());
        *contexts = keep;
        for open in failed {
            tracing::info!(path = %path, "Replacing context that failed to load");
            self.close_context(open).await;
        }
    }

    /// Dispose a context that is no longer tracked, and its widgets.
    async fn close_context(&self, open: OpenContext) {
        let widgets: Vec<Arc<dyn DocumentWidget>> = {
            let mut bindings = self.bindings.write().await;
            let (closing, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *bindings)
                .into_iter()
                .partition(|binding| Arc::ptr_eq(&binding.context, &open.context));
            *bindings = keep;
            closing.into_iter().map(|binding| binding.widget).collect()
        };
        for widget in widgets {
            widget.dispose();
            self.lifecycle.disposed(widget.id());
        }
        open.autosave.stop();
        open.context.dispose();
        tracing::debug!(path = %open.context.path(), "Closed context");
    }

    async fn close_everything(&self) {
        let mut contexts = self.contexts.write().await;
        for open in std::mem::take(&mut *contexts) {
            self.close_context(open).await;
        }
        self.bindings.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use docsession_core::{AutoResolve, AutosaveConfig, Content, ContextError};
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{autosave::MIN_SAVE_INTERVAL, storage::MemoryContentStore};

    fn registry() -> Arc<TypeRegistry> {
        let registry = Arc::new(TypeRegistry::new());
        let _ = registry.add_model_factory(ModelFactoryRecord::text());
        let _ = registry.add_widget_factory(
            WidgetFactoryRecord::builder("Editor", "text")
                .file_extensions([".txt", ".md"])
                .default_for([".txt", ".md"])
                .build(),
        );
        let _ = registry.add_widget_factory(
            WidgetFactoryRecord::builder("Viewer", "text")
                .file_extensions([".txt"])
                .build(),
        );
        registry
    }

    fn setup_with(config: &SessionConfig) -> (SessionManager, Arc<MemoryContentStore>) {
        let store = Arc::new(MemoryContentStore::new());
        store.write_external("a.txt", Content::Text("hello".into()));
        let manager = SessionManager::new(
            registry(),
            Arc::clone(&store) as _,
            Arc::new(AutoResolve::default()),
            config,
        );
        (manager, store)
    }

    fn setup() -> (SessionManager, Arc<MemoryContentStore>) {
        setup_with(&SessionConfig::default())
    }

    #[derive(Default)]
    struct RefuseClose {
        asked: AtomicUsize,
    }

    #[async_trait]
    impl WidgetLifecycle for RefuseClose {
        async fn confirm_close(&self, _widget: &Arc<dyn DocumentWidget>) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    /// Lifecycle that holds close confirmation until the test releases it.
    #[derive(Default)]
    struct GatedClose {
        prompts: AtomicUsize,
        asked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl WidgetLifecycle for GatedClose {
        async fn confirm_close(&self, _widget: &Arc<dyn DocumentWidget>) -> bool {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.asked.notify_one();
            self.release.notified().await;
            true
        }
    }

    #[tokio::test]
    async fn test_open_shares_context_and_loads_once() {
        let (manager, store) = setup();
        let first = manager.open("a.txt", "default", None).await.unwrap();
        let second = manager.open("a.txt", "default", None).await.unwrap();

        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(first.context(), second.context()));
        assert!(Arc::ptr_eq(first.context().model(), second.context().model()));

        assert_ok!(first.context().ready().await);
        assert_eq!(
            first.context().model().to_content(),
            Content::Text("hello".into())
        );
        assert_eq!(store.calls().content_reads, 1);
        assert_eq!(manager.open_contexts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_context() {
        let (manager, store) = setup();
        let (first, second) = tokio::join!(
            manager.open("a.txt", "Editor", None),
            manager.open("a.txt", "Viewer", None)
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(first.context(), second.context()));
        first.context().ready().await.unwrap();
        assert_eq!(store.calls().content_reads, 1);
    }

    #[tokio::test]
    async fn test_unresolvable_open_returns_none() {
        let (manager, store) = setup();
        assert!(manager.open("image.png", "default", None).await.is_none());
        assert!(manager.open("a.txt", "missing", None).await.is_none());
        assert!(manager.create_new("b.png", "default", None).await.is_none());
        assert_eq!(store.calls().total(), 0);
        assert!(manager.open_contexts().await.is_empty());
    }

    #[tokio::test]
    async fn test_find_widget_and_reveal() {
        let (manager, _store) = setup();
        assert!(manager.find_widget("a.txt", "default").await.is_none());

        let editor = manager.open("a.txt", "default", None).await.unwrap();
        let found = manager.find_widget("a.txt", "editor").await.unwrap();
        assert_eq!(found.id(), editor.id());
        assert!(manager.find_widget("a.txt", "Viewer").await.is_none());

        let revealed = manager.open_or_reveal("a.txt", "default", None).await.unwrap();
        assert_eq!(revealed.id(), editor.id());
        assert_eq!(manager.widgets_for_path("a.txt").await.len(), 1);

        let viewer = manager.open_or_reveal("a.txt", "Viewer", None).await.unwrap();
        assert_ne!(viewer.id(), editor.id());
        assert_eq!(viewer.factory_name(), "Viewer");
        assert!(Arc::ptr_eq(
            &manager.context_for_widget(viewer.id()).await.unwrap(),
            editor.context()
        ));
    }

    #[tokio::test]
    async fn test_create_new_saves_instead_of_loading() {
        let (manager, store) = setup();
        let widget = manager.create_new("notes.md", "default", None).await.unwrap();
        widget.context().ready().await.unwrap();

        assert_eq!(store.content("notes.md"), Some(Content::Text(String::new())));
        assert_eq!(store.calls().content_reads, 0);
        assert_eq!(store.calls().saves, 1);
        assert!(widget.context().remote_metadata().is_some());
    }

    #[tokio::test]
    async fn test_create_new_replaces_open_context() {
        let (manager, _store) = setup();
        let old = manager.open("a.txt", "default", None).await.unwrap();
        let fresh = manager.create_new("a.txt", "default", None).await.unwrap();

        assert!(old.is_disposed());
        assert!(old.context().is_disposed());
        assert!(!Arc::ptr_eq(old.context(), fresh.context()));
        assert_eq!(manager.open_contexts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_close_file_disposes_widgets_and_context() {
        let (manager, store) = setup();
        let first = manager.open("a.txt", "Editor", None).await.unwrap();
        let second = manager.open("a.txt", "Viewer", None).await.unwrap();
        first.context().ready().await.unwrap();

        manager.close_file("a.txt").await;

        assert!(first.is_disposed() && second.is_disposed());
        assert_eq!(first.context().ready_state(), ReadyState::Disposed);
        assert!(manager.context_for_widget(first.id()).await.is_none());

        let reopened = manager.open("a.txt", "default", None).await.unwrap();
        assert!(!Arc::ptr_eq(reopened.context(), first.context()));
        reopened.context().ready().await.unwrap();
        assert_eq!(store.calls().content_reads, 2);
    }

    #[tokio::test]
    async fn test_close_widget_asks_before_dropping_dirty_document() {
        let (manager, _store) = setup();
        let lifecycle = Arc::new(RefuseClose::default());
        let manager = manager.with_lifecycle(Arc::clone(&lifecycle) as _);

        let editor = manager.open("a.txt", "Editor", None).await.unwrap();
        let viewer = manager.open("a.txt", "Viewer", None).await.unwrap();
        editor.context().ready().await.unwrap();
        editor.context().model().set_dirty(true);

        assert!(manager.close_widget(viewer.id()).await.unwrap());
        assert_eq!(lifecycle.asked.load(Ordering::SeqCst), 0);
        assert!(viewer.is_disposed());

        assert!(!manager.close_widget(editor.id()).await.unwrap());
        assert_eq!(lifecycle.asked.load(Ordering::SeqCst), 1);
        assert!(!editor.is_disposed());
        assert!(!editor.context().is_disposed());

        assert!(matches!(
            manager.close_widget(viewer.id()).await,
            Err(ManagerError::WidgetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_closing_last_widget_closes_context() {
        let (manager, _store) = setup();
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        let context = Arc::clone(widget.context());
        context.ready().await.unwrap();
        let autosave = manager.autosave_for(&context).await.unwrap();
        assert!(autosave.is_active());

        assert!(manager.close_widget(widget.id()).await.unwrap());
        assert!(context.is_disposed());
        assert!(!autosave.is_active());
        assert!(manager.open_contexts().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_does_not_start_autosave() {
        let (manager, _store) = setup();
        let widget = manager.open("missing.txt", "default", None).await.unwrap();
        let context = Arc::clone(widget.context());
        assert!(matches!(
            context.ready().await,
            Err(ContextError::LoadFailed(_))
        ));
        assert!(!manager.autosave_for(&context).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_failed_load_is_replaced_on_next_open() {
        let (manager, store) = setup();
        store.set_available(false);
        let first = manager.open("a.txt", "default", None).await.unwrap();
        assert_err!(first.context().ready().await);

        store.set_available(true);
        let second = manager.open("a.txt", "default", None).await.unwrap();

        assert!(!Arc::ptr_eq(first.context(), second.context()));
        assert!(first.is_disposed());
        assert_ok!(second.context().ready().await);
        assert_eq!(
            second.context().model().to_content(),
            Content::Text("hello".into())
        );
        assert_eq!(store.calls().content_reads, 2);
        assert!(
            manager
                .autosave_for(second.context())
                .await
                .unwrap()
                .is_active()
        );
        assert_eq!(manager.open_contexts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_widget_opened_during_close_prompt_keeps_context() {
        let (manager, _store) = setup();
        let lifecycle = Arc::new(GatedClose::default());
        let manager = manager.with_lifecycle(Arc::clone(&lifecycle) as _);

        let editor = manager.open("a.txt", "Editor", None).await.unwrap();
        assert_ok!(editor.context().ready().await);
        editor.context().model().set_dirty(true);

        let (closed, viewer) = tokio::join!(manager.close_widget(editor.id()), async {
            lifecycle.asked.notified().await;
            let viewer = manager.open("a.txt", "Viewer", None).await.unwrap();
            lifecycle.release.notify_one();
            viewer
        });

        assert!(closed.unwrap());
        assert!(editor.is_disposed());
        assert!(Arc::ptr_eq(viewer.context(), editor.context()));
        assert!(!viewer.context().is_disposed());
        assert_eq!(manager.widgets_for_path("a.txt").await.len(), 1);
        assert_eq!(lifecycle.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_persists_edits() {
        let (manager, store) = setup();
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        let context = Arc::clone(widget.context());
        context.ready().await.unwrap();

        context
            .model()
            .load_content(Content::Text("edited".into()))
            .unwrap();
        context.model().set_dirty(true);
        tokio::time::sleep(Duration::from_secs(121)).await;

        assert_eq!(store.content("a.txt"), Some(Content::Text("edited".into())));
        assert!(!context.model().is_dirty());
    }

    #[tokio::test]
    async fn test_autosave_settings_propagate() {
        let config = SessionConfig {
            autosave: AutosaveConfig {
                enabled: false,
                interval_secs: 30,
            },
        };
        let (manager, _store) = setup_with(&config);
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        let context = Arc::clone(widget.context());
        context.ready().await.unwrap();
        let autosave = manager.autosave_for(&context).await.unwrap();
        assert!(!autosave.is_active());
        assert_eq!(autosave.save_interval(), Duration::from_secs(30));

        manager.set_autosave(true).await;
        assert!(autosave.is_active());
        manager.set_autosave_interval(Duration::from_secs(5)).await;
        assert_eq!(autosave.save_interval(), Duration::from_secs(5));
        manager.set_autosave_interval(Duration::ZERO).await;
        assert_eq!(autosave.save_interval(), MIN_SAVE_INTERVAL);
        manager.set_autosave(false).await;
        assert!(!autosave.is_active());
    }

    #[tokio::test]
    async fn test_rename_file_moves_contexts() {
        let (manager, store) = setup();
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        widget.context().ready().await.unwrap();
        let mut events = widget.context().subscribe();

        assert_ok!(manager.rename_file("a.txt", "b.txt").await);

        assert_eq!(widget.context().path(), "b.txt");
        assert!(store.contains("b.txt"));
        assert_eq!(
            manager.find_widget("b.txt", "default").await.unwrap().id(),
            widget.id()
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            docsession_core::ContextEvent::PathChanged(path) if path == "b.txt"
        ));
        assert!(matches!(
            manager.rename_file("a.txt", "c.txt").await,
            Err(ManagerError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_rename_onto_open_path_keeps_one_context() {
        let (manager, store) = setup();
        let moved = manager.open("a.txt", "default", None).await.unwrap();
        assert_ok!(moved.context().ready().await);
        let stale = manager.open("b.txt", "default", None).await.unwrap();
        assert_err!(stale.context().ready().await);

        assert_ok!(manager.rename_file("a.txt", "b.txt").await);

        assert!(stale.is_disposed());
        let at_target: Vec<_> = manager
            .open_contexts()
            .await
            .into_iter()
            .filter(|context| context.path() == "b.txt")
            .collect();
        assert_eq!(at_target.len(), 1);
        assert!(Arc::ptr_eq(&at_target[0], moved.context()));
        assert!(store.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_rename_refuses_dirty_target() {
        let (manager, store) = setup();
        store.write_external("b.txt", Content::Text("other".into()));
        let source = manager.open("a.txt", "default", None).await.unwrap();
        let target = manager.open("b.txt", "default", None).await.unwrap();
        assert_ok!(target.context().ready().await);
        target.context().model().set_dirty(true);

        assert!(matches!(
            manager.rename_file("a.txt", "b.txt").await,
            Err(ManagerError::UnsavedTarget(path)) if path == "b.txt"
        ));
        assert!(store.contains("a.txt"));
        assert_eq!(source.context().path(), "a.txt");
        assert!(!target.is_disposed());
    }

    #[tokio::test]
    async fn test_delete_file_closes_and_removes() {
        let (manager, store) = setup();
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        assert_ok!(manager.delete_file("a.txt").await);
        assert!(widget.is_disposed());
        assert!(!store.contains("a.txt"));
    }

    #[tokio::test]
    async fn test_dispose_closes_everything() {
        let (manager, _store) = setup();
        let widget = manager.open("a.txt", "default", None).await.unwrap();
        manager.dispose().await;
        manager.dispose().await;
        assert!(manager.is_disposed());
        assert!(widget.is_disposed());
        assert!(widget.context().is_disposed());
    }

    #[tokio::test]
    #[should_panic(expected = "disposed")]
    async fn test_use_after_dispose_panics() {
        let (manager, _store) = setup();
        manager.dispose().await;
        let _ = manager.open("a.txt", "default", None).await;
    }
}

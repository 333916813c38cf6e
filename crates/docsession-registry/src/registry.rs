//! Factory registry and precedence resolution.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
};

use docsession_core::{Signal, sync};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    extension::{WILDCARD, extension_of, last_segment, normalize_extension},
    factory::{ModelFactoryRecord, WidgetFactoryRecord},
    file_type::FileType,
};

/// Name callers use to request the default widget factory.
pub const DEFAULT_FACTORY_NAME: &str = "default";

/// Kind of registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryKind {
    ModelFactory,
    WidgetFactory,
    FileType,
}

/// Registration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Duplicate {kind:?} name: {name}")]
    Duplicate { kind: FactoryKind, name: String },
    #[error("Invalid {kind:?} name: {name:?}")]
    InvalidName { kind: FactoryKind, name: String },
}

/// Registry lookup error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Widget factory not registered: {0}")]
    UnknownWidgetFactory(String),
    #[error("Widget factory {factory} does not handle {extension}")]
    ExtensionNotHandled { factory: String, extension: String },
}

/// Whether an entry was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

/// Registry change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
    pub kind: ChangeKind,
    pub target: FactoryKind,
    pub name: String,
}

/// Handle that removes a registration.
///
/// Dropping the handle keeps the registration; call [`Self::unregister`].
#[must_use = "dropping the handle makes the registration permanent"]
pub struct UnregisterHandle {
    action: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl std::fmt::Debug for UnregisterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnregisterHandle")
            .field("inert", &self.is_inert())
            .finish()
    }
}

impl UnregisterHandle {
    fn new(action: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A handle that does nothing.
    pub const fn inert() -> Self {
        Self { action: None }
    }

    /// Whether unregistering does nothing.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.action.is_none()
    }

    /// Remove the registration.
    pub fn unregister(mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

/// Outcome of adding an entry.
#[derive(Debug)]
#[must_use]
pub enum Registration {
    Registered(UnregisterHandle),
    Rejected(RegistrationError),
}

impl Registration {
    /// Whether the entry was added.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// Handle for the registration; inert when rejected.
    pub fn into_handle(self) -> UnregisterHandle {
        match self {
            Self::Registered(handle) => handle,
            Self::Rejected(_) => UnregisterHandle::inert(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    model_factories: HashMap<String, Arc<ModelFactoryRecord>>,
    model_order: Vec<String>,
    widget_factories: HashMap<String, Arc<WidgetFactoryRecord>>,
    widget_order: Vec<String>,
    /// Global default widget factory (registered for `*`).
    default_widget_factory: Option<String>,
    /// Extension → default widget factory.
    default_widget_factories: HashMap<String, String>,
    /// Extension → user-selected default, checked before anything else.
    default_overrides: HashMap<String, String>,
    /// Extension (or `*`) → widget factories in registration order.
    widget_factories_for_ext: HashMap<String, Vec<String>>,
    file_types: Vec<FileType>,
}

impl RegistryState {
    fn remove_model_factory(&mut self, key: &str) -> bool {
        self.model_order.retain(|name| name != key);
        self.model_factories.remove(key).is_some()
    }

    fn remove_widget_factory(&mut self, key: &str) -> bool {
        if self.widget_factories.remove(key).is_none() {
            return false;
        }
        self.widget_order.retain(|name| name != key);
        if self.default_widget_factory.as_deref() == Some(key) {
            self.default_widget_factory = None;
        }
        self.default_widget_factories.retain(|_, name| name != key);
        self.default_overrides.retain(|_, name| name != key);
        for names in self.widget_factories_for_ext.values_mut() {
            names.retain(|name| name != key);
        }
        self.widget_factories_for_ext.retain(|_, names| !names.is_empty());
        true
    }

    fn remove_file_type(&mut self, key: &str) -> bool {
        let before = self.file_types.len();
        self.file_types.retain(|ft| ft.name.to_lowercase() != key);
        self.file_types.len() != before
    }

    fn resolve(&self, extension: &str) -> Vec<Arc<WidgetFactoryRecord>> {
        let last = last_segment(extension);
        let compound = last != extension;

        let mut names: Vec<&str> = Vec::new();

        if let Some(name) = self.default_overrides.get(extension) {
            push_unique(&mut names, name);
        }
        if let Some(name) = self.default_widget_factories.get(extension) {
            push_unique(&mut names, name);
        }
        if compound {
            if let Some(name) = self.default_widget_factories.get(last) {
                push_unique(&mut names, name);
            }
        }
        if let Some(name) = &self.default_widget_factory {
            push_unique(&mut names, name);
        }
        for name in self.widget_factories_for_ext.get(extension).into_iter().flatten() {
            push_unique(&mut names, name);
        }
        if compound {
            for name in self.widget_factories_for_ext.get(last).into_iter().flatten() {
                push_unique(&mut names, name);
            }
        }
        for name in self.widget_factories_for_ext.get(WILDCARD).into_iter().flatten() {
            push_unique(&mut names, name);
        }

        names
            .into_iter()
            .filter_map(|name| self.widget_factories.get(name))
            .filter(|factory| {
                self.model_factories
                    .contains_key(&factory.model_name().to_lowercase())
            })
            .cloned()
            .collect()
    }
}

/// Registry of model factories, widget factories and file types.
///
/// Owned by the application root and passed to the components that need it.
/// Names are case-insensitive; registering a taken name is rejected, never
/// an overwrite.
pub struct TypeRegistry {
    state: Arc<RwLock<RegistryState>>,
    changes: Arc<Signal<RegistryChange>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            changes: Arc::new(Signal::new()),
        }
    }

    /// Subscribe to additions and removals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    /// Register a model factory.
    pub fn add_model_factory(&self, record: ModelFactoryRecord) -> Registration {
        let key = record.name().to_lowercase();
        if key.is_empty() {
            return reject(RegistrationError::InvalidName {
                kind: FactoryKind::ModelFactory,
                name: record.name().to_string(),
            });
        }

        let mut state = sync::write(&self.state);
        if state.model_factories.contains_key(&key) {
            drop(state);
            return reject(RegistrationError::Duplicate {
                kind: FactoryKind::ModelFactory,
                name: record.name().to_string(),
            });
        }
        let name = record.name().to_string();
        state.model_factories.insert(key.clone(), Arc::new(record));
        state.model_order.push(key.clone());
        drop(state);

        tracing::debug!(factory = %name, "Registered model factory");
        self.notify(ChangeKind::Added, FactoryKind::ModelFactory, &name);
        Registration::Registered(self.handle(FactoryKind::ModelFactory, key, name))
    }

    /// Register a widget factory.
    ///
    /// Each extension in the record's `default_for` that the record also
    /// handles makes it that extension's default (`*` sets the global
    /// default). Each handled extension lists the factory as a candidate.
    pub fn add_widget_factory(&self, record: WidgetFactoryRecord) -> Registration {
        let key = record.name().to_lowercase();
        if key.is_empty() || key == DEFAULT_FACTORY_NAME {
            return reject(RegistrationError::InvalidName {
                kind: FactoryKind::WidgetFactory,
                name: record.name().to_string(),
            });
        }

        let mut state = sync::write(&self.state);
        if state.widget_factories.contains_key(&key) {
            drop(state);
            return reject(RegistrationError::Duplicate {
                kind: FactoryKind::WidgetFactory,
                name: record.name().to_string(),
            });
        }

        for ext in record.default_for() {
            if !record.handles(ext) {
                continue;
            }
            if ext == WILDCARD {
                state.default_widget_factory = Some(key.clone());
            } else {
                state
                    .default_widget_factories
                    .insert(ext.clone(), key.clone());
            }
        }
        for ext in record.file_extensions() {
            state
                .widget_factories_for_ext
                .entry(ext.clone())
                .or_default()
                .push(key.clone());
        }
        let name = record.name().to_string();
        state.widget_factories.insert(key.clone(), Arc::new(record));
        state.widget_order.push(key.clone());
        drop(state);

        tracing::debug!(factory = %name, "Registered widget factory");
        self.notify(ChangeKind::Added, FactoryKind::WidgetFactory, &name);
        Registration::Registered(self.handle(FactoryKind::WidgetFactory, key, name))
    }

    /// Register a file type.
    pub fn add_file_type(&self, file_type: FileType) -> Registration {
        let key = file_type.name.to_lowercase();
        if key.is_empty() {
            return reject(RegistrationError::InvalidName {
                kind: FactoryKind::FileType,
                name: file_type.name,
            });
        }

        let mut state = sync::write(&self.state);
        if state
            .file_types
            .iter()
            .any(|ft| ft.name.to_lowercase() == key)
        {
            drop(state);
            return reject(RegistrationError::Duplicate {
                kind: FactoryKind::FileType,
                name: file_type.name,
            });
        }
        let name = file_type.name.clone();
        state.file_types.push(file_type);
        drop(state);

        self.notify(ChangeKind::Added, FactoryKind::FileType, &name);
        Registration::Registered(self.handle(FactoryKind::FileType, key, name))
    }

    /// Look up a model factory by name (case-insensitive).
    #[must_use]
    pub fn get_model_factory(&self, name: &str) -> Option<Arc<ModelFactoryRecord>> {
        sync::read(&self.state)
            .model_factories
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Look up a widget factory by name (case-insensitive).
    #[must_use]
    pub fn get_widget_factory(&self, name: &str) -> Option<Arc<WidgetFactoryRecord>> {
        sync::read(&self.state)
            .widget_factories
            .get(&name.to_lowercase())
            .cloned()
    }

    /// Look up a file type by name (case-insensitive).
    #[must_use]
    pub fn get_file_type(&self, name: &str) -> Option<FileType> {
        let key = name.to_lowercase();
        sync::read(&self.state)
            .file_types
            .iter()
            .find(|ft| ft.name.to_lowercase() == key)
            .cloned()
    }

    /// Model factories in registration order.
    #[must_use]
    pub fn model_factories(&self) -> Vec<Arc<ModelFactoryRecord>> {
        let state = sync::read(&self.state);
        state
            .model_order
            .iter()
            .filter_map(|key| state.model_factories.get(key).cloned())
            .collect()
    }

    /// Widget factories in registration order.
    #[must_use]
    pub fn widget_factories(&self) -> Vec<Arc<WidgetFactoryRecord>> {
        let state = sync::read(&self.state);
        state
            .widget_order
            .iter()
            .filter_map(|key| state.widget_factories.get(key).cloned())
            .collect()
    }

    /// Ordered, deduplicated widget factories for an extension.
    ///
    /// Order: user override, default for the full extension, default for
    /// the last dot segment, global default, factories for the full
    /// extension, for the last segment, then for `*`. Factories whose model
    /// factory is not registered are skipped.
    #[must_use]
    pub fn preferred_widget_factories(&self, extension: &str) -> Vec<Arc<WidgetFactoryRecord>> {
        let extension = normalize_extension(extension);
        sync::read(&self.state).resolve(&extension)
    }

    /// [`Self::preferred_widget_factories`] for the extension of `path`.
    #[must_use]
    pub fn preferred_widget_factories_for_path(
        &self,
        path: &str,
    ) -> Vec<Arc<WidgetFactoryRecord>> {
        let extension = extension_of(path);
        sync::read(&self.state).resolve(&extension)
    }

    /// First preferred widget factory for an extension.
    #[must_use]
    pub fn default_widget_factory(&self, extension: &str) -> Option<Arc<WidgetFactoryRecord>> {
        self.preferred_widget_factories(extension).into_iter().next()
    }

    /// Resolve a widget factory by name, treating `default` as the default
    /// for the extension of `path`.
    #[must_use]
    pub fn resolve_widget_factory(
        &self,
        path: &str,
        widget_factory_name: &str,
    ) -> Option<Arc<WidgetFactoryRecord>> {
        if widget_factory_name.eq_ignore_ascii_case(DEFAULT_FACTORY_NAME) {
            self.preferred_widget_factories_for_path(path)
                .into_iter()
                .next()
        } else {
            self.get_widget_factory(widget_factory_name)
        }
    }

    /// Override (or with `None`, clear) the default widget factory for an
    /// extension.
    ///
    /// # Errors
    /// Returns error if the factory is unknown or does not handle the
    /// extension (directly or through `*`).
    pub fn set_default_widget_factory(
        &self,
        extension: &str,
        factory: Option<&str>,
    ) -> Result<(), RegistryError> {
        let extension = normalize_extension(extension);
        let mut state = sync::write(&self.state);
        let Some(name) = factory else {
            state.default_overrides.remove(&extension);
            return Ok(());
        };

        let key = name.to_lowercase();
        let record = state
            .widget_factories
            .get(&key)
            .ok_or_else(|| RegistryError::UnknownWidgetFactory(name.to_string()))?;
        if !record.handles(&extension) && !record.handles(WILDCARD) {
            return Err(RegistryError::ExtensionNotHandled {
                factory: name.to_string(),
                extension,
            });
        }
        state.default_overrides.insert(extension, key);
        Ok(())
    }

    /// File types matching `path`, longest matching extension first.
    #[must_use]
    pub fn file_types_for_path(&self, path: &str) -> Vec<FileType> {
        let file_name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_lowercase();
        let state = sync::read(&self.state);
        let mut matches: Vec<(usize, &FileType)> = state
            .file_types
            .iter()
            .filter_map(|ft| ft.match_len(&file_name).map(|len| (len, ft)))
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        matches.into_iter().map(|(_, ft)| ft.clone()).collect()
    }

    fn notify(&self, kind: ChangeKind, target: FactoryKind, name: &str) {
        self.changes.emit(RegistryChange {
            kind,
            target,
            name: name.to_string(),
        });
    }

    fn handle(&self, target: FactoryKind, key: String, name: String) -> UnregisterHandle {
        let state: Weak<RwLock<RegistryState>> = Arc::downgrade(&self.state);
        let changes = Arc::downgrade(&self.changes);
        UnregisterHandle::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let removed = {
                let mut state = sync::write(&state);
                match target {
                    FactoryKind::ModelFactory => state.remove_model_factory(&key),
                    FactoryKind::WidgetFactory => state.remove_widget_factory(&key),
                    FactoryKind::FileType => state.remove_file_type(&key),
                }
            };
            if !removed {
                return;
            }
            tracing::debug!(name = %name, kind = ?target, "Unregistered");
            if let Some(changes) = changes.upgrade() {
                changes.emit(RegistryChange {
                    kind: ChangeKind::Removed,
                    target,
                    name,
                });
            }
        })
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn reject(error: RegistrationError) -> Registration {
    tracing::warn!(%error, "Registration rejected");
    Registration::Rejected(error)
}

//! Model and widget factory registry.
//!
//! Provides:
//! - `TypeRegistry` - Owned registry of factories and file types
//! - Factory records and the widget builder
//! - Extension normalization and precedence resolution

pub mod extension;
pub mod factory;
pub mod file_type;
pub mod registry;
pub mod widget;

pub use extension::{extension_of, normalize_extension};
pub use factory::{ModelFactoryRecord, WidgetFactoryBuilder, WidgetFactoryRecord};
pub use file_type::FileType;
pub use registry::{
    ChangeKind, FactoryKind, Registration, RegistrationError, RegistryChange, RegistryError,
    TypeRegistry, UnregisterHandle,
};
pub use widget::{DocumentView, DocumentWidget, OpenHint, WidgetId};

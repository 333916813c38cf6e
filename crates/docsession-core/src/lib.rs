//! Core abstractions for shared document sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `DocumentModel` - In-memory document state plus text/base64 models
//! - `ContentStore` / `ConflictDialog` - Capabilities consumed from the host
//! - `SessionContext` - One live, shared handle per open document
//! - `Signal` - Subscribable event channel
//! - `SessionConfig` - Autosave configuration

pub mod config;
pub mod context;
pub mod dialog;
pub mod model;
pub mod signal;
pub mod store;
pub mod sync;

pub use config::{AutosaveConfig, ConfigError, SessionConfig};
pub use context::{ContextError, ContextEvent, ReadyState, SessionContext};
pub use dialog::{AutoResolve, ConflictDialog, ConflictPrompt, ConflictResolution};
pub use model::{Base64Model, Content, DocumentModel, FileFormat, ModelError, TextModel};
pub use signal::Signal;
pub use store::{Checkpoint, ContentStore, RemoteFile, RemoteMetadata, SaveRequest, StoreError};

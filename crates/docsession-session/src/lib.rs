//! Session orchestration for shared documents.
//!
//! Provides:
//! - `SessionManager` - One context per open document, widgets bound to it
//! - `AutosaveCoordinator` - Adaptive autosave with conflict arbitration
//! - `WidgetLifecycle` - Host hooks for widget placement and close confirmation
//! - Storage implementations (memory)

pub mod autosave;
pub mod lifecycle;
pub mod manager;
pub mod storage;

pub use autosave::{AutosaveCoordinator, AutosaveState, MIN_SAVE_INTERVAL, next_interval};
pub use lifecycle::{NoopLifecycle, WidgetLifecycle};
pub use manager::{ManagerError, SessionManager};
#[cfg(feature = "memory")]
pub use storage::{MemoryContentStore, StoreCalls};

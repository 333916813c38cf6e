//! Conflict arbitration capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// User decision for an autosave conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Do nothing this cycle.
    Cancel,
    /// Discard local changes and reload from the store.
    Revert,
    /// Save local changes over the remote file.
    Overwrite,
}

/// Description of a detected conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPrompt {
    /// Path of the conflicting document.
    pub path: String,
    /// Modification time the session last observed.
    pub known_last_modified: Option<i64>,
    /// Modification time currently reported by the store.
    pub remote_last_modified: i64,
}

impl ConflictPrompt {
    /// Human-readable body for a dialog.
    #[must_use]
    pub fn body(&self) -> String {
        match self.known_last_modified {
            Some(known) => format!(
                "\"{}\" has changed on disk since it was last read or written \
                 (known {known}, now {}). Revert to the disk version or overwrite it?",
                self.path, self.remote_last_modified
            ),
            None => format!(
                "\"{}\" has changed on disk. Revert to the disk version or overwrite it?",
                self.path
            ),
        }
    }
}

/// Trait for presenting a conflict to the user.
///
/// Implement this trait to integrate with your dialog UI.
/// The framework detects the conflict; your app implements the UX.
#[async_trait]
pub trait ConflictDialog: Send + Sync {
    /// Ask how to resolve a conflict.
    async fn ask(&self, prompt: &ConflictPrompt) -> ConflictResolution;
}

/// Dialog that always answers with a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct AutoResolve(pub ConflictResolution);

impl Default for AutoResolve {
    fn default() -> Self {
        Self(ConflictResolution::Cancel)
    }
}

#[async_trait]
impl ConflictDialog for AutoResolve {
    async fn ask(&self, prompt: &ConflictPrompt) -> ConflictResolution {
        tracing::info!(path = %prompt.path, resolution = ?self.0, "Auto-resolving conflict");
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_body_mentions_path() {
        let prompt = ConflictPrompt {
            path: "notes.txt".into(),
            known_last_modified: Some(1),
            remote_last_modified: 2,
        };
        assert!(prompt.body().contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_auto_resolve_answers_fixed() {
        let dialog = AutoResolve(ConflictResolution::Overwrite);
        let prompt = ConflictPrompt {
            path: "a".into(),
            known_last_modified: None,
            remote_last_modified: 0,
        };
        assert_eq!(dialog.ask(&prompt).await, ConflictResolution::Overwrite);
    }
}

//! Document models.

use std::sync::{
    RwLock,
    atomic::{AtomicBool, Ordering},
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sync;

/// Serialization format of a document's content in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Text,
    Json,
    Base64,
}

/// Document content as exchanged with a content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "content", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Json(Value),
    Base64(String),
}

impl Content {
    /// Format tag of this content.
    #[must_use]
    pub const fn format(&self) -> FileFormat {
        match self {
            Self::Text(_) => FileFormat::Text,
            Self::Json(_) => FileFormat::Json,
            Self::Base64(_) => FileFormat::Base64,
        }
    }

    /// Approximate serialized size in bytes.
    #[must_use]
    pub fn approx_bytes(&self) -> u64 {
        let len = match self {
            Self::Text(s) | Self::Base64(s) => s.len(),
            Self::Json(v) => v.to_string().len(),
        };
        len as u64
    }
}

/// Model error.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model expects {expected:?} content, got {actual:?}")]
    FormatMismatch {
        expected: FileFormat,
        actual: FileFormat,
    },
    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// In-memory state of one document.
///
/// Models are shared by every widget bound to a context, so all methods
/// take `&self` and implementations use interior mutability.
pub trait DocumentModel: Send + Sync {
    /// Whether the model has changes not yet persisted.
    fn is_dirty(&self) -> bool;

    /// Set the dirty flag.
    fn set_dirty(&self, dirty: bool);

    /// Whether the model refuses to be persisted.
    fn is_read_only(&self) -> bool;

    /// Set the read-only flag.
    fn set_read_only(&self, read_only: bool);

    /// Serialize the model for the store.
    fn to_content(&self) -> Content;

    /// Replace the model state with content from the store.
    ///
    /// # Errors
    /// Returns error if the content cannot be represented by this model.
    fn load_content(&self, content: Content) -> Result<(), ModelError>;
}

/// Flags shared by the bundled models.
#[derive(Debug, Default)]
struct ModelFlags {
    dirty: AtomicBool,
    read_only: AtomicBool,
}

/// Plain-text document model.
#[derive(Debug, Default)]
pub struct TextModel {
    text: RwLock<String>,
    flags: ModelFlags,
}

impl TextModel {
    /// Create an empty, clean text model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text.
    #[must_use]
    pub fn text(&self) -> String {
        sync::read(&self.text).clone()
    }

    /// Replace the text and mark the model dirty.
    pub fn set_text(&self, text: impl Into<String>) {
        *sync::write(&self.text) = text.into();
        self.set_dirty(true);
    }
}

impl DocumentModel for TextModel {
    fn is_dirty(&self) -> bool {
        self.flags.dirty.load(Ordering::SeqCst)
    }

    fn set_dirty(&self, dirty: bool) {
        self.flags.dirty.store(dirty, Ordering::SeqCst);
    }

    fn is_read_only(&self) -> bool {
        self.flags.read_only.load(Ordering::SeqCst)
    }

    fn set_read_only(&self, read_only: bool) {
        self.flags.read_only.store(read_only, Ordering::SeqCst);
    }

    fn to_content(&self) -> Content {
        Content::Text(self.text())
    }

    fn load_content(&self, content: Content) -> Result<(), ModelError> {
        let text = match content {
            Content::Text(text) => text,
            Content::Json(value) => serde_json::to_string_pretty(&value).unwrap_or_default(),
            Content::Base64(_) => {
                return Err(ModelError::FormatMismatch {
                    expected: FileFormat::Text,
                    actual: FileFormat::Base64,
                });
            }
        };
        *sync::write(&self.text) = text;
        Ok(())
    }
}

/// Binary document model persisted as base64.
#[derive(Debug, Default)]
pub struct Base64Model {
    bytes: RwLock<Vec<u8>>,
    flags: ModelFlags,
}

impl Base64Model {
    /// Create an empty, clean binary model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        sync::read(&self.bytes).clone()
    }

    /// Replace the bytes and mark the model dirty.
    pub fn set_bytes(&self, bytes: impl Into<Vec<u8>>) {
        *sync::write(&self.bytes) = bytes.into();
        self.set_dirty(true);
    }
}

impl DocumentModel for Base64Model {
    fn is_dirty(&self) -> bool {
        self.flags.dirty.load(Ordering::SeqCst)
    }

    fn set_dirty(&self, dirty: bool) {
        self.flags.dirty.store(dirty, Ordering::SeqCst);
    }

    fn is_read_only(&self) -> bool {
        self.flags.read_only.load(Ordering::SeqCst)
    }

    fn set_read_only(&self, read_only: bool) {
        self.flags.read_only.store(read_only, Ordering::SeqCst);
    }

    fn to_content(&self) -> Content {
        Content::Base64(BASE64.encode(&*sync::read(&self.bytes)))
    }

    fn load_content(&self, content: Content) -> Result<(), ModelError> {
        let Content::Base64(encoded) = content else {
            return Err(ModelError::FormatMismatch {
                expected: FileFormat::Base64,
                actual: content.format(),
            });
        };
        // Stores commonly wrap base64 payloads at 76 columns.
        let compact: String = encoded.split_whitespace().collect();
        *sync::write(&self.bytes) = BASE64.decode(compact)?;
        Ok(())
    }
}

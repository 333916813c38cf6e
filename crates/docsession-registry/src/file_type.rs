//! File type descriptors.

use docsession_core::FileFormat;
use serde::{Deserialize, Serialize};

use crate::extension::normalize_extension;

/// A named family of files, matched by extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    /// Unique name (case-insensitive).
    pub name: String,
    /// Normalized extensions, e.g. `.ipynb` or `.table.json`.
    pub extensions: Vec<String>,
    /// Associated MIME types.
    #[serde(default)]
    pub mime_types: Vec<String>,
    /// Content type used when creating files of this type.
    pub content_type: String,
    /// Store format of the content.
    pub file_format: FileFormat,
}

impl FileType {
    /// Create a file type; extensions are normalized.
    #[must_use]
    pub fn new<I>(
        name: impl Into<String>,
        extensions: I,
        content_type: impl Into<String>,
        file_format: FileFormat,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
            mime_types: Vec::new(),
            content_type: content_type.into(),
            file_format,
        }
    }

    /// Attach MIME types.
    #[must_use]
    pub fn with_mime_types<I>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Length of the longest extension matching `file_name` (lower-cased).
    pub(crate) fn match_len(&self, file_name: &str) -> Option<usize> {
        self.extensions
            .iter()
            .filter(|ext| file_name.len() > ext.len() && file_name.ends_with(ext.as_str()))
            .map(String::len)
            .max()
    }
}

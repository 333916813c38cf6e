//! Factory records.

use std::sync::Arc;

use docsession_core::{Base64Model, DocumentModel, FileFormat, SessionContext, TextModel};

use crate::{
    extension::normalize_extension,
    widget::{DocumentView, DocumentWidget, OpenHint},
};

type ModelBuilder = Arc<dyn Fn() -> Arc<dyn DocumentModel> + Send + Sync>;
type WidgetBuilder =
    Arc<dyn Fn(Arc<SessionContext>, Option<&OpenHint>) -> Arc<dyn DocumentWidget> + Send + Sync>;

/// A registered way to build document models.
#[derive(Clone)]
pub struct ModelFactoryRecord {
    name: String,
    content_type: String,
    file_format: FileFormat,
    builder: ModelBuilder,
}

impl std::fmt::Debug for ModelFactoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFactoryRecord")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("file_format", &self.file_format)
            .finish_non_exhaustive()
    }
}

impl ModelFactoryRecord {
    /// Create a record from a model constructor.
    #[must_use]
    pub fn new<F>(
        name: impl Into<String>,
        content_type: impl Into<String>,
        file_format: FileFormat,
        builder: F,
    ) -> Self
    where
        F: Fn() -> Arc<dyn DocumentModel> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            file_format,
            builder: Arc::new(builder),
        }
    }

    /// Plain-text files (`text`).
    #[must_use]
    pub fn text() -> Self {
        Self::new("text", "file", FileFormat::Text, || {
            Arc::new(TextModel::new()) as Arc<dyn DocumentModel>
        })
    }

    /// Binary files persisted as base64 (`base64`).
    #[must_use]
    pub fn base64() -> Self {
        Self::new("base64", "file", FileFormat::Base64, || {
            Arc::new(Base64Model::new()) as Arc<dyn DocumentModel>
        })
    }

    /// Factory name as registered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content type sent with saves.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Store format of the content.
    #[must_use]
    pub const fn file_format(&self) -> FileFormat {
        self.file_format
    }

    /// Build a fresh, empty model.
    #[must_use]
    pub fn create_model(&self) -> Arc<dyn DocumentModel> {
        (self.builder)()
    }
}

/// A registered way to build widgets for file extensions.
#[derive(Clone)]
pub struct WidgetFactoryRecord {
    name: String,
    file_extensions: Vec<String>,
    default_for: Vec<String>,
    model_name: String,
    builder: Option<WidgetBuilder>,
}

impl std::fmt::Debug for WidgetFactoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetFactoryRecord")
            .field("name", &self.name)
            .field("file_extensions", &self.file_extensions)
            .field("default_for", &self.default_for)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl WidgetFactoryRecord {
    /// Start building a record.
    #[must_use]
    pub fn builder(name: impl Into<String>, model_name: impl Into<String>) -> WidgetFactoryBuilder {
        WidgetFactoryBuilder::new(name, model_name)
    }

    /// Factory name as registered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized extensions this factory handles, in declaration order.
    #[must_use]
    pub fn file_extensions(&self) -> &[String] {
        &self.file_extensions
    }

    /// Normalized extensions this factory asks to be the default for.
    #[must_use]
    pub fn default_for(&self) -> &[String] {
        &self.default_for
    }

    /// Model factory this widget factory requires.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether the factory declares `extension` (normalized).
    #[must_use]
    pub fn handles(&self, extension: &str) -> bool {
        self.file_extensions.iter().any(|ext| ext == extension)
    }

    /// Build a widget bound to `context`.
    #[must_use]
    pub fn create_widget(
        &self,
        context: Arc<SessionContext>,
        hint: Option<&OpenHint>,
    ) -> Arc<dyn DocumentWidget> {
        match &self.builder {
            Some(builder) => builder(context, hint),
            None => Arc::new(DocumentView::new(&self.name, context, hint.cloned())),
        }
    }
}

/// Builder for [`WidgetFactoryRecord`].
pub struct WidgetFactoryBuilder {
    name: String,
    model_name: String,
    file_extensions: Vec<String>,
    default_for: Vec<String>,
    builder: Option<WidgetBuilder>,
}

impl WidgetFactoryBuilder {
    /// Create a builder for a factory requiring model factory `model_name`.
    #[must_use]
    pub fn new(name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_name: model_name.into(),
            file_extensions: Vec::new(),
            default_for: Vec::new(),
            builder: None,
        }
    }

    /// Add handled extensions.
    #[must_use]
    pub fn file_extensions<I>(mut self, extensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        push_normalized(&mut self.file_extensions, extensions);
        self
    }

    /// Add extensions this factory should be the default for.
    #[must_use]
    pub fn default_for<I>(mut self, extensions: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        push_normalized(&mut self.default_for, extensions);
        self
    }

    /// Use a custom widget constructor instead of [`DocumentView`].
    #[must_use]
    pub fn widget<F>(mut self, builder: F) -> Self
    where
        F: Fn(Arc<SessionContext>, Option<&OpenHint>) -> Arc<dyn DocumentWidget>
            + Send
            + Sync
            + 'static,
    {
        self.builder = Some(Arc::new(builder));
        self
    }

    /// Finish the record.
    #[must_use]
    pub fn build(self) -> WidgetFactoryRecord {
        WidgetFactoryRecord {
            name: self.name,
            file_extensions: self.file_extensions,
            default_for: self.default_for,
            model_name: self.model_name,
            builder: self.builder,
        }
    }
}

fn push_normalized<I>(target: &mut Vec<String>, extensions: I)
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for ext in extensions {
        let ext = normalize_extension(ext.as_ref());
        if !target.contains(&ext) {
            target.push(ext);
        }
    }
}

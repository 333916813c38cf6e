//! Widgets bound to session contexts.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use docsession_core::SessionContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Widget identifier.
pub type WidgetId = Uuid;

/// Placement hint forwarded untouched to widget builders and the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenHint {
    /// Insertion mode such as `tab-after` or `split-right`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Reference widget or area for the mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A viewer or editor bound to exactly one context for its whole life.
pub trait DocumentWidget: Send + Sync {
    /// Widget identifier.
    fn id(&self) -> WidgetId;

    /// Name of the widget factory that built this widget.
    fn factory_name(&self) -> &str;

    /// The context this widget views. Never changes.
    fn context(&self) -> &Arc<SessionContext>;

    /// Release the widget.
    fn dispose(&self);

    /// Whether the widget has been released.
    fn is_disposed(&self) -> bool;
}

/// Minimal widget: an identity, a factory name and a context.
///
/// Rendering is the host's concern; this is what factories build when they
/// have no richer widget type.
#[derive(Debug)]
pub struct DocumentView {
    id: WidgetId,
    factory_name: String,
    context: Arc<SessionContext>,
    hint: Option<OpenHint>,
    disposed: AtomicBool,
}

impl DocumentView {
    /// Create a view.
    #[must_use]
    pub fn new(
        factory_name: impl Into<String>,
        context: Arc<SessionContext>,
        hint: Option<OpenHint>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            factory_name: factory_name.into(),
            context,
            hint,
            disposed: AtomicBool::new(false),
        }
    }

    /// Hint the view was opened with.
    #[must_use]
    pub const fn hint(&self) -> Option<&OpenHint> {
        self.hint.as_ref()
    }
}

impl DocumentWidget for DocumentView {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn factory_name(&self) -> &str {
        &self.factory_name
    }

    fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

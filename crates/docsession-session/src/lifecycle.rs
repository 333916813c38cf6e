//! Host hooks for widget creation and closing.

use std::sync::Arc;

use async_trait::async_trait;
use docsession_registry::{DocumentWidget, OpenHint, WidgetId};

/// Trait for the host's widget lifecycle policy.
///
/// The manager builds and disposes widgets; the host places them and owns
/// the "unsaved changes" confirmation UX.
#[async_trait]
pub trait WidgetLifecycle: Send + Sync {
    /// A widget was created and bound to its context.
    fn adopt(&self, _widget: &Arc<dyn DocumentWidget>, _hint: Option<&OpenHint>) {}

    /// Whether closing the last widget of a dirty document may proceed.
    async fn confirm_close(&self, _widget: &Arc<dyn DocumentWidget>) -> bool {
        true
    }

    /// A widget was disposed.
    fn disposed(&self, _widget_id: WidgetId) {}
}

/// Lifecycle that accepts everything.
#[derive(Debug, Default, Clone)]
pub struct NoopLifecycle;

#[async_trait]
impl WidgetLifecycle for NoopLifecycle {}

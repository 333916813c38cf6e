//! Adaptive, conflict-aware autosave.
//!
//! One coordinator per context. While active, a single timer is always
//! pending; each firing reschedules first and then runs one attempt as its
//! own task, so a slow or failed save never delays the next tick. Only
//! [`AutosaveCoordinator::stop`] or disposal of the context ends the loop.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use docsession_core::{
    ConflictDialog, ConflictPrompt, ConflictResolution, ContextEvent, RemoteMetadata,
    SessionContext, sync,
};
use tokio::{
    sync::{
        Notify,
        broadcast::{self, error::RecvError},
    },
    task::JoinHandle,
    time::Instant,
};

/// Interval multiplier applied to the measured save duration.
pub const INTERVAL_MULTIPLIER: u32 = 10;

/// Shortest configurable interval; smaller values are raised to it.
pub const MIN_SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Next autosave interval after a save that took `save_duration`.
///
/// Ten times the save latency, never below `min_interval`.
#[must_use]
pub fn next_interval(save_duration: Duration, min_interval: Duration) -> Duration {
    save_duration
        .saturating_mul(INTERVAL_MULTIPLIER)
        .max(min_interval)
}

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_SAVE_INTERVAL {
        tracing::warn!(
            requested_ms = interval.as_millis(),
            "Autosave interval below minimum; using {}s",
            MIN_SAVE_INTERVAL.as_secs()
        );
        MIN_SAVE_INTERVAL
    } else {
        interval
    }
}

/// Snapshot of a coordinator's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveState {
    /// Interval requested by configuration.
    pub configured_interval: Duration,
    /// Floor for the adaptive interval.
    pub min_interval: Duration,
    /// Interval used for the next timer.
    pub current_interval: Duration,
    /// Whether the loop is running.
    pub is_active: bool,
    /// Whether a conflict dialog is open.
    pub is_arbitrating_conflict: bool,
}

struct Shared {
    context: Arc<SessionContext>,
    dialog: Arc<dyn ConflictDialog>,
    state: RwLock<AutosaveState>,
    reschedule: Notify,
}

/// Clears the arbitration latch when the dialog resolves or is abandoned.
struct ArbitrationGuard<'a>(&'a Shared);

impl Drop for ArbitrationGuard<'_> {
    fn drop(&mut self) {
        sync::write(&self.0.state).is_arbitrating_conflict = false;
    }
}

impl Shared {
    fn snapshot(&self) -> AutosaveState {
        *sync::read(&self.state)
    }

    fn is_active(&self) -> bool {
        sync::read(&self.state).is_active
    }

    fn begin_arbitration(&self) -> Option<ArbitrationGuard<'_>> {
        let mut state = sync::write(&self.state);
        if state.is_arbitrating_conflict {
            return None;
        }
        state.is_arbitrating_conflict = true;
        drop(state);
        Some(ArbitrationGuard(self))
    }

    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ContextEvent>) {
        loop {
            let interval = sync::read(&self.state).current_interval;
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let attempt = Arc::clone(&self);
                    tokio::spawn(async move { attempt.attempt().await });
                }
                () = self.reschedule.notified() => {}
                event = events.recv() => match event {
                    Ok(ContextEvent::Disposed) | Err(RecvError::Closed) => {
                        tracing::debug!(path = %self.context.path(), "Context disposed; autosave stopped");
                        sync::write(&self.state).is_active = false;
                        break;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                },
            }
        }
    }

    async fn attempt(&self) {
        if !self.is_active() {
            return;
        }
        let model = self.context.model();
        if !model.is_dirty() || model.is_read_only() || self.snapshot().is_arbitrating_conflict {
            return;
        }

        let path = self.context.path();
        match self.context.fetch_metadata().await {
            Ok(remote) => {
                let known = self.context.remote_metadata().map(|m| m.last_modified);
                if known != Some(remote.last_modified) && !self.arbitrate(known, remote).await {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Remote check failed; saving anyway");
            }
        }

        if self.is_active() {
            self.finish_save().await;
        }
    }

    /// Returns whether the save should proceed.
    async fn arbitrate(&self, known: Option<i64>, remote: RemoteMetadata) -> bool {
        let Some(_guard) = self.begin_arbitration() else {
            return false;
        };
        let prompt = ConflictPrompt {
            path: self.context.path(),
            known_last_modified: known,
            remote_last_modified: remote.last_modified,
        };
        tracing::info!(
            path = %prompt.path,
            known = ?known,
            remote = remote.last_modified,
            "File changed on disk; asking for resolution"
        );

        match self.dialog.ask(&prompt).await {
            ConflictResolution::Cancel => false,
            ConflictResolution::Revert => {
                if let Err(e) = self.context.revert().await {
                    tracing::error!(path = %prompt.path, error = %e, "Revert after conflict failed");
                }
                false
            }
            ConflictResolution::Overwrite => true,
        }
    }

    async fn finish_save(&self) {
        let start = Instant::now();
        if let Err(e) = self.context.save().await {
            tracing::error!(path = %self.context.path(), error = %e, "Autosave failed");
            return;
        }
        let duration = start.elapsed();

        let mut state = sync::write(&self.state);
        if !state.is_active {
            return;
        }
        state.current_interval = next_interval(duration, state.min_interval);
        let interval = state.current_interval;
        drop(state);

        tracing::debug!(
            path = %self.context.path(),
            duration_ms = duration.as_millis(),
            interval_ms = interval.as_millis(),
            "Autosaved"
        );
        self.reschedule.notify_one();
    }
}

/// Periodically persists a dirty model, arbitrating remote conflicts.
pub struct AutosaveCoordinator {
    shared: Arc<Shared>,
    timer: RwLock<Option<JoinHandle<()>>>,
}

impl AutosaveCoordinator {
    /// Create a stopped coordinator for `context`.
    #[must_use]
    pub fn new(
        context: Arc<SessionContext>,
        dialog: Arc<dyn ConflictDialog>,
        interval: Duration,
    ) -> Self {
        let interval = clamp_interval(interval);
        Self {
            shared: Arc::new(Shared {
                context,
                dialog,
                state: RwLock::new(AutosaveState {
                    configured_interval: interval,
                    min_interval: interval,
                    current_interval: interval,
                    is_active: false,
                    is_arbitrating_conflict: false,
                }),
                reschedule: Notify::new(),
            }),
            timer: RwLock::new(None),
        }
    }

    /// The context being saved.
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.shared.context
    }

    /// Start the loop. No-op if already active or the context is disposed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut timer = sync::write(&self.timer);
        // Subscribe before checking so a disposal racing with start is seen.
        let events = self.shared.context.subscribe();
        if self.shared.context.is_disposed() {
            tracing::warn!(path = %self.shared.context.path(), "Not starting autosave on a disposed context");
            return;
        }
        let mut state = sync::write(&self.shared.state);
        if state.is_active {
            return;
        }
        state.is_active = true;
        drop(state);

        if let Some(stale) = timer.take() {
            stale.abort();
        }
        tracing::debug!(path = %self.shared.context.path(), "Autosave started");
        *timer = Some(tokio::spawn(Arc::clone(&self.shared).run(events)));
    }

    /// Stop the loop. In-flight saves complete but no longer recalibrate.
    pub fn stop(&self) {
        let mut timer = sync::write(&self.timer);
        sync::write(&self.shared.state).is_active = false;
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::debug!(path = %self.shared.context.path(), "Autosave stopped");
        }
    }

    /// Whether the loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Configured interval. The interval adapted to save latency is
    /// [`Self::current_interval`].
    #[must_use]
    pub fn save_interval(&self) -> Duration {
        sync::read(&self.shared.state).configured_interval
    }

    /// Interval until the next attempt, after adapting to save latency.
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        sync::read(&self.shared.state).current_interval
    }

    /// Set the configured, minimum and current interval, restarting a
    /// pending timer. Values below [`MIN_SAVE_INTERVAL`] are raised to it.
    pub fn set_save_interval(&self, interval: Duration) {
        let interval = clamp_interval(interval);
        let mut state = sync::write(&self.shared.state);
        state.configured_interval = interval;
        state.min_interval = interval;
        state.current_interval = interval;
        let active = state.is_active;
        drop(state);
        if active {
            self.shared.reschedule.notify_one();
        }
    }

    /// Snapshot of the scheduling state.
    #[must_use]
    pub fn state(&self) -> AutosaveState {
        self.shared.snapshot()
    }
}

impl Drop for AutosaveCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

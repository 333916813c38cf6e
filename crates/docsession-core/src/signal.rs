//! Subscribable event channel.

use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 64;

/// Broadcast event channel.
///
/// Subscribing returns a receiver; dropping the receiver unsubscribes.
/// Emitting with no subscribers is not an error.
#[derive(Debug)]
pub struct Signal<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Signal<T> {
    /// Create a signal with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a signal buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: T) {
        let _ = self.sender.send(event);
    }

    /// Get a receiver for future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

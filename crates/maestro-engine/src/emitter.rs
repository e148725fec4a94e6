//! Per-execution event channel.
//!
//! One broadcast channel per execution; subscribers read with backpressure
//! (bounded buffer, drop-oldest). A subscriber that lags is told once via
//! the `Lagged` error rather than blocking the emitter.

use maestro_core::ExecutionEvent;
use tokio::sync::broadcast;

/// Default buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast emitter for execution events.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    /// Emitter with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Emitter with an explicit buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Lossy when nobody listens.
    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

//! Single-consumer observer sinks.
//!
//! The engine offers raw inbound lines, raw outbound lines, and captured
//! errors to three sinks. Each sink is single-producer (the engine task),
//! single-consumer: a dedicated worker drains the queue and runs the user
//! callback, so callback latency never stalls the engine and per-sink
//! ordering is preserved.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// A non-blocking drop-off point for observed values.
pub trait Sink<T>: Send + Sync {
    /// Offer a value. Must not block; losing the value when nobody listens
    /// is acceptable.
    fn offer(&self, value: T);
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl<T> Sink<T> for NullSink {
    fn offer(&self, _value: T) {}
}

/// A sink drained by a dedicated worker task that invokes a user callback.
pub struct ListenerSink<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> ListenerSink<T> {
    /// Spawn the draining worker and return the sink feeding it.
    pub fn spawn<F>(mut callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(value) = rx.recv().await {
                callback(value);
            }
        });
        Self { tx }
    }
}

impl<T: Send> Sink<T> for ListenerSink<T> {
    fn offer(&self, value: T) {
        // Worker gone means the client was dropped mid-flight.
        let _ = self.tx.send(value);
    }
}

/// A reassignable sink slot. Offers go to whatever sink is installed at
/// that moment, so listeners are safe to swap at any time.
pub(crate) struct SinkSlot<T> {
    slot: RwLock<Arc<dyn Sink<T>>>,
}

impl<T> SinkSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RwLock::new(Arc::new(NullSink)),
        }
    }

    pub(crate) fn set(&self, sink: Arc<dyn Sink<T>>) {
        *self.slot.write() = sink;
    }

    pub(crate) fn offer(&self, value: T) {
        self.slot.read().offer(value);
    }
}

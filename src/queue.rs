//! Outbound queue and flood-control pacer.
//!
//! Non-priority lines wait in a lock-free FIFO; the pacer releases at most
//! one per period. Priority lines never touch the queue, they go straight
//! to the transport. The period is read fresh at every reschedule, so a
//! delay change takes effect after the already-scheduled fire: the next
//! emission never happens earlier than it would have under the old period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tokio::time::Instant;

/// Thread-safe FIFO of pending non-priority lines.
///
/// Enqueue happens from any thread through the control API; only the
/// connection task pops.
#[derive(Default)]
pub(crate) struct OutboundQueue {
    fifo: SegQueue<String>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, line: String) {
        self.fifo.push(line);
    }

    pub(crate) fn pop(&self) -> Option<String> {
        self.fifo.pop()
    }

    pub(crate) fn clear(&self) {
        while self.fifo.pop().is_some() {}
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.fifo.len()
    }
}

/// Shared, atomically-tunable pacing period in milliseconds.
#[derive(Debug)]
pub(crate) struct PacerPeriod(AtomicU64);

impl PacerPeriod {
    pub(crate) fn new(delay: Duration) -> Self {
        Self(AtomicU64::new(delay.as_millis() as u64))
    }

    pub(crate) fn set(&self, delay: Duration) {
        self.0.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed).max(1))
    }
}

/// The pacer's schedule: an absolute next-fire deadline.
///
/// Fixed-rate semantics: each fire advances the deadline by the period as
/// read at that moment. If the engine lags past a deadline, the late fire
/// happens immediately and the schedule re-anchors to now, it does not
/// burst to catch up.
#[derive(Debug)]
pub(crate) struct Pacer {
    next_fire: Instant,
}

impl Pacer {
    /// Start pacing; the first fire is immediate.
    pub(crate) fn start() -> Self {
        Self {
            next_fire: Instant::now(),
        }
    }

    /// Wait until the next scheduled fire.
    pub(crate) async fn tick(&self) {
        tokio::time::sleep_until(self.next_fire).await;
    }

    /// Advance the schedule after a fire.
    pub(crate) fn advance(&mut self, period: Duration) {
        let due = self.next_fire + period;
        let now = Instant::now();
        self.next_fire = if due < now { now } else { due };
    }

    #[cfg(test)]
    fn next_fire(&self) -> Instant {
        self.next_fire
    }
}

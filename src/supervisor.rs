//! Process-wide connection supervision.
//!
//! The supervisor is a typed value, not an ambient global: clients hold an
//! `Arc<Supervisor>` and register every live connection with it. The tokio
//! runtime plays the reactor role, so "tearing down the reactor" becomes a
//! signal the embedding application can await: once the last connection
//! closes without a reconnect pending, [`Supervisor::closed`] resolves.
//! Registering a new connection re-arms an idle supervisor.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

struct Inner {
    live: usize,
    next_id: u64,
}

/// Registry of live connections sharing one runtime.
pub struct Supervisor {
    inner: Mutex<Inner>,
    idle_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// Create an idle supervisor.
    pub fn new() -> Arc<Self> {
        let (idle_tx, _) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(Inner { live: 0, next_id: 0 }),
            idle_tx,
        })
    }

    /// Register a connection attempt; returns its supervision id.
    pub(crate) fn register(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.live += 1;
        inner.next_id += 1;
        let id = inner.next_id;
        // A fresh registration un-shuts the supervisor.
        self.idle_tx.send_replace(false);
        debug!(connection = id, live = inner.live, "connection registered");
        id
    }

    /// Remove a closed connection. When nothing is left and no reconnect is
    /// pending, the shutdown signal fires.
    pub(crate) fn deregister(&self, id: u64, reconnecting: bool) {
        let mut inner = self.inner.lock();
        inner.live = inner.live.saturating_sub(1);
        debug!(
            connection = id,
            live = inner.live,
            reconnecting,
            "connection deregistered"
        );
        if !reconnecting && inner.live == 0 {
            self.idle_tx.send_replace(true);
        }
    }

    /// Number of live connections.
    pub fn live_connections(&self) -> usize {
        self.inner.lock().live
    }

    /// Resolves once the last connection has closed voluntarily.
    ///
    /// Resolves immediately if that has already happened. Intended for
    /// embedding applications that want to exit when all clients are done.
    pub async fn closed(&self) {
        let mut rx = self.idle_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

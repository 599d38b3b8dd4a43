//! The client facade.
//!
//! [`Client`] is the thin surface user code talks to. Calls translate into
//! enqueued lines and engine-state changes; nothing here touches the
//! socket. A client owns at most one live connection; the supervisor may
//! replace it with a successor on reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::auth::AuthStrategy;
use crate::config::ClientConfig;
use crate::ctcp;
use crate::element::{Channel, MessageRecipient};
use crate::engine::{self, Cmd, EngineState};
use crate::error::ClientError;
use crate::event::{Event, EventBus, EventChannel, EventReceiver, NullEventBus};
use crate::queue::{OutboundQueue, PacerPeriod};
use crate::sink::{ListenerSink, Sink, SinkSlot};
use crate::supervisor::Supervisor;
use crate::tls::{AcceptAllCertificates, TrustDecider};

/// Handle to the live connection's entry points.
pub(crate) struct ConnectionHandle {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    queue: Arc<OutboundQueue>,
}

/// State shared between the facade and the engine task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    /// Nick the client currently holds.
    pub(crate) nick: Mutex<String>,
    /// Nick the client wants to hold and will reclaim.
    pub(crate) intended_nick: Mutex<String>,
    /// Channels the client occupies, keyed by folded name.
    pub(crate) channels: Mutex<HashMap<String, Channel>>,
    pub(crate) message_delay: PacerPeriod,
    pub(crate) auth: Mutex<Option<Arc<dyn AuthStrategy>>>,
    pub(crate) input_sink: SinkSlot<String>,
    pub(crate) output_sink: SinkSlot<String>,
    pub(crate) exception_sink: SinkSlot<ClientError>,
    bus: RwLock<Arc<dyn EventBus>>,
    trust: RwLock<Arc<dyn TrustDecider>>,
    state: Mutex<EngineState>,
    conn: Mutex<Option<ConnectionHandle>>,
    /// True from `connect` until a close with no reconnect pending.
    active: AtomicBool,
}

impl Shared {
    pub(crate) fn dispatch(&self, event: Event) {
        let bus = self.bus.read().clone();
        bus.dispatch(event);
    }

    pub(crate) fn trust_decider(&self) -> Arc<dyn TrustDecider> {
        self.trust.read().clone()
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    pub(crate) fn install_connection(
        &self,
        cmd_tx: mpsc::UnboundedSender<Cmd>,
        queue: Arc<OutboundQueue>,
    ) {
        *self.conn.lock() = Some(ConnectionHandle { cmd_tx, queue });
    }

    pub(crate) fn clear_connection(&self) {
        self.conn.lock().take();
    }

    pub(crate) fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// An IRC client bound to one server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    supervisor: Arc<Supervisor>,
}

impl Client {
    /// Create a client with its own supervisor.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_supervisor(config, Supervisor::new())
    }

    /// Create a client sharing a supervisor with other clients.
    pub fn with_supervisor(config: ClientConfig, supervisor: Arc<Supervisor>) -> Self {
        let shared = Arc::new(Shared {
            nick: Mutex::new(config.nick.clone()),
            intended_nick: Mutex::new(config.nick.clone()),
            channels: Mutex::new(HashMap::new()),
            message_delay: PacerPeriod::new(config.message_delay),
            auth: Mutex::new(None),
            input_sink: SinkSlot::new(),
            output_sink: SinkSlot::new(),
            exception_sink: SinkSlot::new(),
            bus: RwLock::new(Arc::new(NullEventBus)),
            trust: RwLock::new(Arc::new(AcceptAllCertificates)),
            state: Mutex::new(EngineState::Closed),
            conn: Mutex::new(None),
            active: AtomicBool::new(false),
            config,
        });
        Self { shared, supervisor }
    }

    /// Start connecting. No-op while a connection (or a pending reconnect)
    /// is already in flight; a client never has two live connections.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.shared.active.swap(true, Ordering::SeqCst) {
            return;
        }
        engine::spawn(self.shared.clone(), self.supervisor.clone());
    }

    /// Install an [`EventChannel`] bus and return its receiver.
    ///
    /// Replaces any previously installed bus.
    pub fn events(&self) -> EventReceiver {
        let (bus, rx) = EventChannel::new();
        self.set_event_bus(Arc::new(bus));
        rx
    }

    /// Route engine events to a custom bus.
    pub fn set_event_bus(&self, bus: Arc<dyn EventBus>) {
        *self.shared.bus.write() = bus;
    }

    /// Replace the TLS trust decision. Applies to the next (re)connect.
    pub fn set_trust_decider(&self, decider: Arc<dyn TrustDecider>) {
        *self.shared.trust.write() = decider;
    }

    /// Set services authentication, used on the next registration.
    pub fn set_auth(&self, auth: Arc<dyn AuthStrategy>) {
        *self.shared.auth.lock() = Some(auth);
    }

    /// Observe every raw inbound line. The callback runs on its own worker.
    pub fn set_input_listener<F>(&self, callback: F)
    where
        F: FnMut(String) + Send + 'static,
    {
        self.shared
            .input_sink
            .set(Arc::new(ListenerSink::spawn(callback)));
    }

    /// Observe every raw outbound line. The callback runs on its own worker.
    pub fn set_output_listener<F>(&self, callback: F)
    where
        F: FnMut(String) + Send + 'static,
    {
        self.shared
            .output_sink
            .set(Arc::new(ListenerSink::spawn(callback)));
    }

    /// Observe captured errors. The callback runs on its own worker.
    pub fn set_exception_listener<F>(&self, callback: F)
    where
        F: FnMut(ClientError) + Send + 'static,
    {
        self.shared
            .exception_sink
            .set(Arc::new(ListenerSink::spawn(callback)));
    }

    /// Install a custom sink for raw inbound lines.
    pub fn set_input_sink(&self, sink: Arc<dyn Sink<String>>) {
        self.shared.input_sink.set(sink);
    }

    /// Install a custom sink for raw outbound lines.
    pub fn set_output_sink(&self, sink: Arc<dyn Sink<String>>) {
        self.shared.output_sink.set(sink);
    }

    /// Install a custom sink for captured errors.
    pub fn set_exception_sink(&self, sink: Arc<dyn Sink<ClientError>>) {
        self.shared.exception_sink.set(sink);
    }

    /// Queue a raw line behind the pacer. Dropped silently when no
    /// connection exists; held until `Ready` otherwise.
    pub fn send_raw_line(&self, line: impl Into<String>) {
        if let Some(conn) = &*self.shared.conn.lock() {
            conn.queue.push(line.into());
        }
    }

    /// Send a raw line immediately, bypassing the pacer. Flood control is
    /// your problem now.
    pub fn send_raw_line_immediately(&self, line: impl Into<String>) {
        if let Some(conn) = &*self.shared.conn.lock() {
            let _ = conn.cmd_tx.send(Cmd::Priority(line.into()));
        }
    }

    /// Send a message to a channel or user.
    pub fn send_message(&self, target: impl MessageRecipient, text: &str) {
        self.send_raw_line(format!("PRIVMSG {} :{}", target.message_target(), text));
    }

    /// Send a notice to a channel or user.
    pub fn send_notice(&self, target: impl MessageRecipient, text: &str) {
        self.send_raw_line(format!("NOTICE {} :{}", target.message_target(), text));
    }

    /// Send a CTCP message; the payload is delimited and quoted.
    pub fn send_ctcp_message(&self, target: impl MessageRecipient, payload: &str) {
        self.send_raw_line(format!(
            "PRIVMSG {} :{}",
            target.message_target(),
            ctcp::wrap(payload)
        ));
    }

    /// Ask to join a channel. Membership is recorded once the server echoes
    /// the JOIN.
    pub fn join(&self, channel: &str) {
        self.send_raw_line(format!("JOIN {}", channel));
    }

    /// Ask to leave a channel.
    pub fn part(&self, channel: &str, reason: &str) {
        if reason.is_empty() {
            self.send_raw_line(format!("PART {}", channel));
        } else {
            self.send_raw_line(format!("PART {} :{}", channel, reason));
        }
    }

    /// The nick currently held.
    pub fn nick(&self) -> String {
        self.shared.nick.lock().clone()
    }

    /// The nick the client tries to maintain.
    pub fn intended_nick(&self) -> String {
        self.shared.intended_nick.lock().clone()
    }

    /// Change the intended nick and request it from the server.
    pub fn set_nick(&self, nick: &str) {
        *self.shared.intended_nick.lock() = nick.to_string();
        if let Some(conn) = &*self.shared.conn.lock() {
            let _ = conn.cmd_tx.send(Cmd::Priority(format!("NICK {}", nick)));
        }
    }

    /// The diagnostic client name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Snapshot of the channels the client occupies.
    pub fn channels(&self) -> Vec<Channel> {
        self.shared.channels.lock().values().cloned().collect()
    }

    /// Snapshot of one channel, by name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.shared
            .channels
            .lock()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Current delay between paced outbound lines.
    pub fn message_delay(&self) -> Duration {
        self.shared.message_delay.get()
    }

    /// Retune the pacer. The already-scheduled next flush keeps its
    /// deadline; the new period applies from then on.
    pub fn set_message_delay(&self, delay: Duration) {
        self.shared.message_delay.set(delay);
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        *self.shared.state.lock()
    }

    /// Shut the connection down: `QUIT` goes out as priority, queued lines
    /// are dropped, and no reconnect is scheduled.
    pub fn shutdown(&self, reason: Option<&str>) {
        if let Some(conn) = &*self.shared.conn.lock() {
            let _ = conn.cmd_tx.send(Cmd::Shutdown {
                reason: reason.map(str::to_string),
                reconnect: false,
            });
        } else {
            self.shared.mark_inactive();
        }
    }

    /// The supervisor this client registers its connections with.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client::new(ClientConfig::builder("irc.example.test", "kitten").build())
    }

    #[test]
    fn test_unconnected_sends_are_silent() {
        let client = test_client();
        client.send_raw_line("PRIVMSG #x :dropped");
        client.send_message("#x", "dropped");
        client.shutdown(Some("bye"));
        assert_eq!(client.state(), EngineState::Closed);
    }

    #[test]
    fn test_nick_tracking_defaults() {
        let client = test_client();
        assert_eq!(client.nick(), "kitten");
        assert_eq!(client.intended_nick(), "kitten");
        client.set_nick("tiger");
        assert_eq!(client.intended_nick(), "tiger");
        // Current nick only changes when the server confirms.
        assert_eq!(client.nick(), "kitten");
    }

    #[test]
    fn test_message_delay_tuning() {
        let client = test_client();
        assert_eq!(client.message_delay(), Duration::from_millis(1200));
        client.set_message_delay(Duration::from_millis(400));
        assert_eq!(client.message_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_queued_lines_wait_for_engine() {
        let client = test_client();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let queue = OutboundQueue::new();
        client.shared.install_connection(cmd_tx, queue.clone());

        client.send_message("#rust", "hello");
        client.send_ctcp_message("alice", "VERSION");
        assert_eq!(queue.pop().as_deref(), Some("PRIVMSG #rust :hello"));
        assert_eq!(
            queue.pop().as_deref(),
            Some("PRIVMSG alice :\u{1}VERSION\u{1}")
        );

        client.send_raw_line_immediately("PONG :now");
        match cmd_rx.try_recv() {
            Ok(Cmd::Priority(line)) => assert_eq!(line, "PONG :now"),
            _ => panic!("expected a priority command"),
        }
    }

    #[test]
    fn test_shutdown_reaches_engine() {
        let client = test_client();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        client.shared.install_connection(cmd_tx, OutboundQueue::new());

        client.shutdown(Some("bye"));
        match cmd_rx.try_recv() {
            Ok(Cmd::Shutdown { reason, reconnect }) => {
                assert_eq!(reason.as_deref(), Some("bye"));
                assert!(!reconnect);
            }
            _ => panic!("expected a shutdown command"),
        }
    }
}

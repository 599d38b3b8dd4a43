//! Typed events dispatched to user code.
//!
//! Inbound traffic the engine understands becomes a variant of [`Event`];
//! everything else arrives as [`Event::ServerLine`]. Events are dispatched
//! in the order lines arrive on the socket.

use tokio::sync::mpsc;

use crate::line::{ServerLine, Source};

/// An event produced by the connection engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Registration completed; the connection is ready for traffic.
    Connected,
    /// The connection closed. `reconnect` tells whether a new attempt is
    /// scheduled.
    ConnectionClosed {
        /// Whether the supervisor will reconnect.
        reconnect: bool,
    },
    /// The server acknowledged these capabilities.
    CapabilitiesAcknowledged {
        /// Capability names, as acknowledged.
        capabilities: Vec<String>,
    },
    /// The server rejected a capability request.
    CapabilitiesRejected {
        /// The full set that was requested.
        requested: Vec<String>,
    },
    /// A message to a channel the client occupies.
    ChannelMessage {
        /// Channel the message went to.
        channel: String,
        /// Who sent it.
        sender: Source,
        /// Message text.
        text: String,
    },
    /// A message addressed directly to the client.
    PrivateMessage {
        /// Who sent it.
        sender: Source,
        /// Message text.
        text: String,
    },
    /// A notice to a channel.
    ChannelNotice {
        /// Channel the notice went to.
        channel: String,
        /// Who sent it.
        sender: Source,
        /// Notice text.
        text: String,
    },
    /// A notice addressed directly to the client.
    PrivateNotice {
        /// Who sent it.
        sender: Source,
        /// Notice text.
        text: String,
    },
    /// A CTCP query (CTCP-wrapped `PRIVMSG`), payload unquoted.
    CtcpQuery {
        /// Who sent it.
        sender: Source,
        /// Original target (channel or this client).
        target: String,
        /// Unquoted payload.
        payload: String,
    },
    /// A CTCP reply (CTCP-wrapped `NOTICE`), payload unquoted.
    CtcpReply {
        /// Who sent it.
        sender: Source,
        /// Original target.
        target: String,
        /// Unquoted payload.
        payload: String,
    },
    /// This client joined a channel.
    ChannelJoined {
        /// The channel joined.
        channel: String,
    },
    /// This client left a channel, voluntarily or via KICK.
    ChannelLeft {
        /// The channel left.
        channel: String,
        /// PART or KICK reason, when one was given.
        reason: Option<String>,
    },
    /// Another user joined a channel the client occupies.
    UserJoined {
        /// The channel.
        channel: String,
        /// Who joined.
        user: Source,
    },
    /// Another user left a channel the client occupies.
    UserParted {
        /// The channel.
        channel: String,
        /// Who left.
        user: Source,
        /// PART reason, when one was given.
        reason: Option<String>,
    },
    /// A user was kicked from a channel the client occupies.
    UserKicked {
        /// The channel.
        channel: String,
        /// Nick of the user removed.
        kicked: String,
        /// Who did the kicking.
        kicker: Source,
        /// KICK reason, when one was given.
        reason: Option<String>,
    },
    /// A user quit the network.
    UserQuit {
        /// Who quit.
        user: Source,
        /// Quit reason, when one was given.
        reason: Option<String>,
    },
    /// A user changed nick. When `old` is this client's nick the client
    /// model follows.
    NickChanged {
        /// Previous nick.
        old: String,
        /// New nick.
        new: String,
    },
    /// The server rejected a nick (numeric 433) after registration. The
    /// engine keeps trying to reclaim the intended nick.
    NickRejected {
        /// The nick that was refused.
        rejected: String,
    },
    /// The server sent `ERROR`.
    ServerError {
        /// Text carried by the ERROR line.
        message: String,
    },
    /// Any inbound line the engine has no dedicated variant for.
    ServerLine {
        /// The tokenized line.
        line: ServerLine,
    },
}

impl Event {
    /// The channel this event concerns, when it is channel-scoped.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Event::ChannelMessage { channel, .. }
            | Event::ChannelNotice { channel, .. }
            | Event::ChannelJoined { channel }
            | Event::ChannelLeft { channel, .. }
            | Event::UserJoined { channel, .. }
            | Event::UserParted { channel, .. }
            | Event::UserKicked { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// True when this event changes some channel's user list.
    pub fn changes_user_list(&self) -> bool {
        matches!(
            self,
            Event::ChannelJoined { .. }
                | Event::ChannelLeft { .. }
                | Event::UserJoined { .. }
                | Event::UserParted { .. }
                | Event::UserKicked { .. }
                | Event::UserQuit { .. }
                | Event::NickChanged { .. }
        )
    }
}

/// Dispatch target for engine events.
///
/// The engine only needs `dispatch`; fan-out to subscribers is the
/// implementor's concern. Dispatch must not block.
pub trait EventBus: Send + Sync {
    /// Deliver one event.
    fn dispatch(&self, event: Event);
}

/// An event bus that drops everything.
#[derive(Debug, Default)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn dispatch(&self, _event: Event) {}
}

/// A bus that forwards events into an unbounded channel.
#[derive(Debug)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventChannel {
    /// Create a bus and the receiver draining it.
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventReceiver { rx })
    }
}

impl EventBus for EventChannel {
    fn dispatch(&self, event: Event) {
        // Receiver dropped means nobody is listening; that is fine.
        let _ = self.tx.send(event);
    }
}

/// Receiving half of an [`EventChannel`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking poll for a pending event.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

//! # slirc-client
//!
//! An async IRC client connection engine. One [`Client`] keeps one
//! persistent, optionally TLS-protected connection to one server, keeps a
//! model of its channels and users in sync with server state, dispatches
//! inbound traffic as typed [`Event`]s, and paces outbound lines so the
//! server's flood control never bites.
//!
//! ## What the engine does for you
//!
//! - Line framing with the protocol's 512-byte limit, truncation included
//! - Registration (`CAP LS`, `PASS`, `NICK`, `USER`) and IRCv3 capability
//!   negotiation on every (re)connect
//! - Flood-control pacing with a priority bypass for protocol-critical
//!   lines (`PONG`, `QUIT`, registration)
//! - Keepalive pings and dead-connection detection from idle timers
//! - Automatic reconnect with state carryover, supervised per process
//!
//! ## Quick start
//!
//! ```no_run
//! use slirc_client::{Client, ClientConfig, Event};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::builder("irc.libera.chat", "slirc_demo")
//!         .realname("slirc demo")
//!         .build();
//!     let client = Client::new(config);
//!     let mut events = client.events();
//!     client.connect();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Connected => client.join("#slirc"),
//!             Event::ChannelMessage { channel, sender, text } => {
//!                 println!("[{}] <{}> {}", channel, sender.nick, text);
//!             }
//!             Event::ConnectionClosed { reconnect: false } => break,
//!             _ => {}
//!         }
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod ctcp;
pub mod element;
mod engine;
pub mod error;
pub mod event;
pub mod line;
mod queue;
pub mod sink;
pub mod supervisor;
pub mod tls;
pub mod transport;

pub use self::auth::{AuthStrategy, NickServAuth};
pub use self::client::Client;
pub use self::codec::{LineCodec, MAX_LINE_LEN};
pub use self::config::{ClientConfig, ClientConfigBuilder};
pub use self::element::{Channel, MessageRecipient};
pub use self::engine::EngineState;
pub use self::error::{ClientError, LineParseError};
pub use self::event::{Event, EventBus, EventChannel, EventReceiver};
pub use self::line::{ServerLine, Source};
pub use self::sink::{ListenerSink, NullSink, Sink};
pub use self::supervisor::Supervisor;
pub use self::tls::{AcceptAllCertificates, TrustDecider};
pub use self::transport::Transport;

//! The connection engine.
//!
//! One engine task drives one connection: it sequences registration and
//! capability negotiation, dispatches inbound lines as typed events, pops
//! the paced queue, watches the idle deadlines, and hands the close back to
//! the supervisor. All engine state mutates on this single task; the
//! control API reaches in only through the lock-free queue, the command
//! channel, and atomic tunables.

use std::cmp;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace, warn, Instrument};

use crate::client::Shared;
use crate::ctcp;
use crate::element::{is_channel_name, Channel};
use crate::error::ClientError;
use crate::event::Event;
use crate::line::ServerLine;
use crate::queue::{OutboundQueue, Pacer};
use crate::supervisor::Supervisor;
use crate::transport::Transport;

/// How often the engine re-attempts the intended nick after a rejection in
/// steady state.
const NICK_RECLAIM_PERIOD: Duration = Duration::from_secs(60);

/// Capabilities this client knows how to consume and requests by default.
const KNOWN_CAPS: &[&str] = &[
    "multi-prefix",
    "userhost-in-names",
    "away-notify",
    "account-notify",
    "extended-join",
    "account-tag",
    "server-time",
    "message-tags",
    "chghost",
    "cap-notify",
    "echo-message",
    "invite-notify",
    "setname",
    "standard-replies",
    "batch",
];

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// TCP connect in progress.
    Connecting,
    /// TLS handshake in progress.
    TlsHandshaking,
    /// Sending the registration burst.
    Registering,
    /// Awaiting the capability exchange or the welcome numeric.
    CapNegotiating,
    /// Registered; normal traffic flows.
    Ready,
    /// QUIT sent, teardown in progress.
    ShuttingDown,
    /// Connection gone.
    Closed,
}

/// Control-API requests crossing into the engine task.
pub(crate) enum Cmd {
    /// Write this line immediately, bypassing the pacer.
    Priority(String),
    /// Send QUIT, close the socket, drop queued lines.
    Shutdown {
        reason: Option<String>,
        reconnect: bool,
    },
}

enum Wake {
    Cmd(Option<Cmd>),
    Line(Result<Option<String>, ClientError>),
    PacerFire,
    CapTimeout,
    ReaderIdle,
    AllIdle,
    Reclaim,
}

/// Start a connection attempt for this client.
///
/// Registers with the supervisor, connects, runs the engine to completion,
/// and schedules the reconnect when the close calls for one.
pub(crate) fn spawn(shared: Arc<Shared>, supervisor: Arc<Supervisor>) {
    let span = tracing::info_span!("connection", client = %shared.config.name);
    tokio::spawn(connect_and_run(shared, supervisor).instrument(span));
}

async fn connect_and_run(shared: Arc<Shared>, supervisor: Arc<Supervisor>) {
    let id = supervisor.register();
    shared.set_state(EngineState::Connecting);

    let decider = shared.trust_decider();
    let attempt = async {
        let stream = Transport::connect_plain(&shared.config).await?;
        if shared.config.tls {
            shared.set_state(EngineState::TlsHandshaking);
            Transport::tls_upgrade(stream, &shared.config, decider).await
        } else {
            Ok(Transport::tcp(stream))
        }
    };
    let transport = match attempt.await {
        Ok(t) => t,
        Err(e) => {
            let reconnect = !e.is_fatal();
            warn!(error = %e, "connection attempt failed");
            shared.exception_sink.offer(e);
            shared.set_state(EngineState::Closed);
            finish(shared, supervisor, id, reconnect);
            return;
        }
    };

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let queue = OutboundQueue::new();
    shared.install_connection(cmd_tx, queue.clone());

    let engine = Engine::new(shared.clone(), transport, queue, cmd_rx);
    let reconnect = engine.run().await;

    shared.clear_connection();
    finish(shared, supervisor, id, reconnect);
}

fn finish(shared: Arc<Shared>, supervisor: Arc<Supervisor>, id: u64, reconnect: bool) {
    shared.dispatch(Event::ConnectionClosed { reconnect });
    supervisor.deregister(id, reconnect);
    if reconnect {
        let delay = shared.config.reconnect_delay;
        debug!(?delay, "scheduling reconnect");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            spawn(shared, supervisor);
        });
    } else {
        shared.mark_inactive();
    }
}

struct Engine {
    shared: Arc<Shared>,
    transport: Transport,
    queue: Arc<OutboundQueue>,
    cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    state: EngineState,
    attempt_nick: String,
    advertised: Vec<String>,
    requested: Option<Vec<String>>,
    cap_done: bool,
    cap_deadline: Option<Instant>,
    pacer: Option<Pacer>,
    last_read: Instant,
    last_write: Instant,
    reader_idle_fired: bool,
    all_idle_fired: bool,
    reclaim_at: Option<Instant>,
    reconnect: bool,
}

impl Engine {
    fn new(
        shared: Arc<Shared>,
        transport: Transport,
        queue: Arc<OutboundQueue>,
        cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    ) -> Self {
        let attempt_nick = shared.intended_nick.lock().clone();
        let now = Instant::now();
        Self {
            shared,
            transport,
            queue,
            cmd_rx,
            state: EngineState::Registering,
            attempt_nick,
            advertised: Vec::new(),
            requested: None,
            cap_done: false,
            cap_deadline: None,
            pacer: None,
            last_read: now,
            last_write: now,
            reader_idle_fired: false,
            all_idle_fired: false,
            reclaim_at: None,
            reconnect: true,
        }
    }

    async fn run(mut self) -> bool {
        if self.register().await.is_err() {
            return self.close().await;
        }

        loop {
            let read_deadline = self.last_read + self.shared.config.reader_idle;
            let all_deadline =
                cmp::max(self.last_read, self.last_write) + self.shared.config.ping_idle;

            let wake = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => Wake::Cmd(cmd),
                res = self.transport.read_line() => Wake::Line(res),
                _ = tick_opt(&self.pacer) => Wake::PacerFire,
                _ = sleep_opt(self.cap_deadline), if self.cap_deadline.is_some() => Wake::CapTimeout,
                _ = tokio::time::sleep_until(read_deadline), if !self.reader_idle_fired => Wake::ReaderIdle,
                _ = tokio::time::sleep_until(all_deadline), if !self.all_idle_fired => Wake::AllIdle,
                _ = sleep_opt(self.reclaim_at), if self.reclaim_at.is_some() => Wake::Reclaim,
            };

            match wake {
                Wake::Cmd(Some(Cmd::Priority(line))) => {
                    if self.send(line).await.is_err() {
                        break;
                    }
                }
                Wake::Cmd(Some(Cmd::Shutdown { reason, reconnect })) => {
                    self.shutdown(reason, reconnect).await;
                    break;
                }
                Wake::Cmd(None) => {
                    // The client itself is gone.
                    self.shutdown(None, false).await;
                    break;
                }
                Wake::Line(Ok(Some(line))) => {
                    self.last_read = Instant::now();
                    self.reader_idle_fired = false;
                    self.all_idle_fired = false;
                    if self.handle_line(line).await.is_err() {
                        break;
                    }
                }
                Wake::Line(Ok(None)) => {
                    debug!("server closed the connection");
                    break;
                }
                Wake::Line(Err(e)) => {
                    warn!(error = %e, "read failed");
                    self.shared.exception_sink.offer(e);
                    break;
                }
                Wake::PacerFire => {
                    let period = self.shared.message_delay.get();
                    if let Some(pacer) = self.pacer.as_mut() {
                        pacer.advance(period);
                    }
                    if let Some(line) = self.queue.pop() {
                        if self.send(line).await.is_err() {
                            break;
                        }
                    }
                }
                Wake::CapTimeout => {
                    debug!("no CAP LS reply in time, ending negotiation");
                    if self.finish_negotiation(false).await.is_err() {
                        break;
                    }
                }
                Wake::ReaderIdle => {
                    self.reader_idle_fired = true;
                    warn!("reader idle, recycling connection");
                    self.shared
                        .exception_sink
                        .offer(ClientError::IdleTimeout(self.shared.config.reader_idle));
                    self.shutdown(Some("Reconnecting...".to_string()), true).await;
                    break;
                }
                Wake::AllIdle => {
                    self.all_idle_fired = true;
                    let token: u32 = rand::random();
                    if self.send(format!("PING :{:08x}", token)).await.is_err() {
                        break;
                    }
                }
                Wake::Reclaim => {
                    let intended = self.shared.intended_nick.lock().clone();
                    let current = self.shared.nick.lock().clone();
                    if current.eq_ignore_ascii_case(&intended) {
                        self.reclaim_at = None;
                    } else {
                        if self.send(format!("NICK {}", intended)).await.is_err() {
                            break;
                        }
                        self.reclaim_at = Some(Instant::now() + NICK_RECLAIM_PERIOD);
                    }
                }
            }
        }

        self.close().await
    }

    async fn close(mut self) -> bool {
        self.set_state(EngineState::Closed);
        self.transport.close().await;
        self.reconnect
    }

    fn set_state(&mut self, state: EngineState) {
        trace!(?state, "engine state");
        self.state = state;
        self.shared.set_state(state);
    }

    /// Write one line to the wire, mirroring it to the output sink.
    async fn send(&mut self, line: String) -> Result<(), ()> {
        self.shared.output_sink.offer(line.clone());
        trace!(line = %line, "send");
        match self.transport.write_line(line).await {
            Ok(()) => {
                self.last_write = Instant::now();
                self.all_idle_fired = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "write failed");
                self.shared.exception_sink.offer(e);
                if self.state != EngineState::ShuttingDown {
                    self.reconnect = true;
                }
                Err(())
            }
        }
    }

    /// The registration burst: `CAP LS`, optional `PASS`, `NICK`, `USER`.
    async fn register(&mut self) -> Result<(), ()> {
        self.set_state(EngineState::Registering);
        *self.shared.nick.lock() = self.attempt_nick.clone();

        self.send("CAP LS".to_string()).await?;
        if let Some(pass) = self.shared.config.server_password.clone() {
            self.send(format!("PASS {}", pass)).await?;
        }
        let nick = self.attempt_nick.clone();
        self.send(format!("NICK {}", nick)).await?;
        let username = self.shared.config.username.clone();
        let realname = self.shared.config.realname.clone();
        self.send(format!("USER {} 0 * :{}", username, realname)).await?;

        self.set_state(EngineState::CapNegotiating);
        self.cap_deadline = Some(Instant::now() + self.shared.config.cap_timeout);
        Ok(())
    }

    async fn handle_line(&mut self, raw: String) -> Result<(), ()> {
        self.shared.input_sink.offer(raw.clone());
        trace!(line = %raw, "recv");

        let line = match ServerLine::parse(&raw) {
            Ok(line) => line,
            Err(cause) => {
                self.shared
                    .exception_sink
                    .offer(ClientError::Protocol { line: raw, cause });
                return Ok(());
            }
        };

        // A server that never speaks CAP answers the burst with ordinary
        // numerics; close negotiation on the first one.
        if line.is_numeric() && self.state == EngineState::CapNegotiating && !self.cap_done {
            self.finish_negotiation(false).await?;
        }

        match line.command.to_ascii_uppercase().as_str() {
            "PING" => {
                let reply = match line.params.last() {
                    Some(token) => format!("PONG :{}", token),
                    None => "PONG".to_string(),
                };
                self.send(reply).await?;
            }
            "CAP" => self.on_cap(&line).await?,
            "ERROR" => {
                let message = line.trailing().unwrap_or_default().to_string();
                debug!(message = %message, "server error");
                self.shared.dispatch(Event::ServerError { message });
            }
            "001" => {
                if let Some(actual) = line.params.first() {
                    *self.shared.nick.lock() = actual.clone();
                }
                self.enter_ready().await?;
            }
            "433" => self.on_nick_in_use(&line).await?,
            "JOIN" => self.on_join(&line),
            "PART" => self.on_part(&line),
            "KICK" => self.on_kick(&line),
            "NICK" => self.on_nick(&line),
            "QUIT" => self.on_quit(&line),
            "PRIVMSG" => self.on_privmsg(&line),
            "NOTICE" => self.on_notice(&line),
            _ => self.shared.dispatch(Event::ServerLine { line }),
        }
        Ok(())
    }

    fn capability_request(&self) -> Vec<String> {
        let wanted: Vec<String> = match &self.shared.config.requested_caps {
            Some(list) => list.clone(),
            None => KNOWN_CAPS.iter().map(|s| s.to_string()).collect(),
        };
        wanted
            .into_iter()
            .filter(|cap| self.advertised.iter().any(|a| a == cap))
            .collect()
    }

    async fn on_cap(&mut self, line: &ServerLine) -> Result<(), ()> {
        let sub = line
            .params
            .get(1)
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_default();
        match sub.as_str() {
            "LS" => {
                // CAP 302 splits long advertisements across lines, marked
                // by a `*` before the capability list.
                let more = line.params.get(2).map(|p| p == "*").unwrap_or(false);
                let caps = if more { line.params.get(3) } else { line.params.get(2) };
                if let Some(caps) = caps {
                    self.advertised.extend(
                        caps.split_whitespace()
                            .map(|c| c.split('=').next().unwrap_or(c).to_string()),
                    );
                }
                if !more
                    && self.state == EngineState::CapNegotiating
                    && self.requested.is_none()
                    && !self.cap_done
                {
                    let want = self.capability_request();
                    if want.is_empty() {
                        self.finish_negotiation(false).await?;
                    } else {
                        self.cap_deadline = None;
                        let req = format!("CAP REQ :{}", want.join(" "));
                        self.requested = Some(want);
                        self.send(req).await?;
                    }
                }
            }
            "ACK" => {
                let capabilities: Vec<String> = line
                    .trailing()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                info!(?capabilities, "capabilities acknowledged");
                self.requested = None;
                self.shared
                    .dispatch(Event::CapabilitiesAcknowledged { capabilities });
                self.finish_negotiation(true).await?;
            }
            "NAK" => {
                let requested = self.requested.take().unwrap_or_else(|| {
                    line.trailing()
                        .unwrap_or_default()
                        .split_whitespace()
                        .map(str::to_string)
                        .collect()
                });
                info!(?requested, "capabilities rejected");
                self.shared.dispatch(Event::CapabilitiesRejected { requested });
                self.finish_negotiation(true).await?;
            }
            _ => self.shared.dispatch(Event::ServerLine { line: line.clone() }),
        }
        Ok(())
    }

    /// Send `CAP END` once. `enter_ready` short-circuits waiting for the
    /// welcome numeric, which is right after an explicit ACK/NAK.
    async fn finish_negotiation(&mut self, enter_ready: bool) -> Result<(), ()> {
        if self.cap_done {
            return Ok(());
        }
        self.cap_done = true;
        self.cap_deadline = None;
        self.send("CAP END".to_string()).await?;
        if enter_ready {
            self.enter_ready().await?;
        }
        Ok(())
    }

    async fn enter_ready(&mut self) -> Result<(), ()> {
        if matches!(self.state, EngineState::Ready | EngineState::ShuttingDown) {
            return Ok(());
        }
        self.cap_done = true;
        self.cap_deadline = None;
        self.set_state(EngineState::Ready);
        self.pacer = Some(Pacer::start());
        info!(nick = %self.shared.nick.lock(), "registered");
        self.shared.dispatch(Event::Connected);

        let auth = self.shared.auth.lock().clone();
        if let Some(auth) = auth {
            for line in auth.registration_lines() {
                self.send(line).await?;
            }
        }

        // Carried-over channels from before a reconnect are not memberships
        // on this connection; re-request them and let the server echoes
        // rebuild the model.
        let rejoin: Vec<String> = {
            let mut channels = self.shared.channels.lock();
            let names = channels.values().map(|c| c.name().to_string()).collect();
            channels.clear();
            names
        };
        for name in rejoin {
            self.queue.push(format!("JOIN {}", name));
        }
        Ok(())
    }

    async fn on_nick_in_use(&mut self, line: &ServerLine) -> Result<(), ()> {
        if self.state == EngineState::Ready {
            let rejected = line.params.get(1).cloned().unwrap_or_default();
            debug!(nick = %rejected, "nick rejected, will retry");
            self.shared.dispatch(Event::NickRejected { rejected });
            if self.reclaim_at.is_none() {
                self.reclaim_at = Some(Instant::now() + NICK_RECLAIM_PERIOD);
            }
        } else {
            // Disambiguate and retry while registering.
            self.attempt_nick.push('_');
            let attempt = self.attempt_nick.clone();
            debug!(nick = %attempt, "nick in use, retrying");
            *self.shared.nick.lock() = attempt.clone();
            self.send(format!("NICK {}", attempt)).await?;
        }
        Ok(())
    }

    fn on_join(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let channel = line.params.first().cloned().unwrap_or_default();
        let me = self.shared.nick.lock().clone();
        if src.is_nick(&me) {
            self.shared
                .channels
                .lock()
                .insert(channel.to_ascii_lowercase(), Channel::new(channel.as_str()));
            info!(channel = %channel, "joined");
            self.shared.dispatch(Event::ChannelJoined { channel });
        } else {
            if let Some(chan) = self
                .shared
                .channels
                .lock()
                .get_mut(&channel.to_ascii_lowercase())
            {
                chan.add_user(&src.nick);
            }
            self.shared.dispatch(Event::UserJoined { channel, user: src });
        }
    }

    fn on_part(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let channel = line.params.first().cloned().unwrap_or_default();
        let reason = line.params.get(1).cloned();
        let me = self.shared.nick.lock().clone();
        if src.is_nick(&me) {
            self.shared
                .channels
                .lock()
                .remove(&channel.to_ascii_lowercase());
            info!(channel = %channel, "parted");
            self.shared.dispatch(Event::ChannelLeft { channel, reason });
        } else {
            if let Some(chan) = self
                .shared
                .channels
                .lock()
                .get_mut(&channel.to_ascii_lowercase())
            {
                chan.remove_user(&src.nick);
            }
            self.shared.dispatch(Event::UserParted {
                channel,
                user: src,
                reason,
            });
        }
    }

    fn on_kick(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let channel = line.params.first().cloned().unwrap_or_default();
        let kicked = line.params.get(1).cloned().unwrap_or_default();
        let reason = line.params.get(2).cloned();
        let me = self.shared.nick.lock().clone();
        let key = channel.to_ascii_lowercase();
        if kicked.eq_ignore_ascii_case(&me) {
            self.shared.channels.lock().remove(&key);
            info!(channel = %channel, "kicked from channel");
        } else if let Some(chan) = self.shared.channels.lock().get_mut(&key) {
            chan.remove_user(&kicked);
        }
        self.shared.dispatch(Event::UserKicked {
            channel,
            kicked,
            kicker: src,
            reason,
        });
    }

    fn on_nick(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let new = line.params.first().cloned().unwrap_or_default();
        let old = src.nick.clone();
        let me = self.shared.nick.lock().clone();
        if src.is_nick(&me) {
            *self.shared.nick.lock() = new.clone();
            let intended = self.shared.intended_nick.lock().clone();
            if new.eq_ignore_ascii_case(&intended) {
                self.reclaim_at = None;
            }
        }
        for chan in self.shared.channels.lock().values_mut() {
            chan.rename_user(&old, &new);
        }
        self.shared.dispatch(Event::NickChanged { old, new });
    }

    fn on_quit(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let reason = line.params.first().cloned();
        for chan in self.shared.channels.lock().values_mut() {
            chan.remove_user(&src.nick);
        }
        self.shared.dispatch(Event::UserQuit { user: src, reason });
    }

    fn on_privmsg(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let target = line.params.first().cloned().unwrap_or_default();
        let text = line.params.get(1).cloned().unwrap_or_default();
        if ctcp::is_ctcp(&text) {
            let payload = ctcp::extract(&text).unwrap_or_default();
            self.shared.dispatch(Event::CtcpQuery {
                sender: src,
                target,
                payload,
            });
        } else if is_channel_name(&target) {
            self.shared.dispatch(Event::ChannelMessage {
                channel: target,
                sender: src,
                text,
            });
        } else {
            self.shared.dispatch(Event::PrivateMessage { sender: src, text });
        }
    }

    fn on_notice(&mut self, line: &ServerLine) {
        let Some(src) = line.source() else {
            self.shared.dispatch(Event::ServerLine { line: line.clone() });
            return;
        };
        let target = line.params.first().cloned().unwrap_or_default();
        let text = line.params.get(1).cloned().unwrap_or_default();
        if ctcp::is_ctcp(&text) {
            let payload = ctcp::extract(&text).unwrap_or_default();
            self.shared.dispatch(Event::CtcpReply {
                sender: src,
                target,
                payload,
            });
        } else if is_channel_name(&target) {
            self.shared.dispatch(Event::ChannelNotice {
                channel: target,
                sender: src,
                text,
            });
        } else {
            self.shared.dispatch(Event::PrivateNotice { sender: src, text });
        }
    }

    /// Voluntary or idle-driven teardown: QUIT as priority, queue dropped.
    async fn shutdown(&mut self, reason: Option<String>, reconnect: bool) {
        self.reconnect = reconnect;
        self.set_state(EngineState::ShuttingDown);
        let quit = match reason {
            Some(reason) => format!("QUIT :{}", reason),
            None => "QUIT".to_string(),
        };
        let _ = self.send(quit).await;
        self.queue.clear();
    }
}

async fn tick_opt(pacer: &Option<Pacer>) {
    match pacer {
        Some(pacer) => pacer.tick().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

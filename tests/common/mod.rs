//! Scripted in-process server for driving the client over real sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use slirc_client::{ClientConfigBuilder, ClientConfig, Event, EventReceiver};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A listener the client under test connects to.
pub struct MockServer {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    /// Configuration pointed at this server, with test-sized timings.
    pub fn config(&self, nick: &str) -> ClientConfigBuilder {
        ClientConfig::builder(self.addr.ip().to_string(), nick)
            .port(self.addr.port())
            .name("test")
    }

    pub async fn accept(&self) -> ServerConn {
        let (stream, _) = tokio::time::timeout(RECV_TIMEOUT, self.listener.accept())
            .await
            .expect("timed out waiting for the client to connect")
            .unwrap();
        ServerConn::new(stream)
    }
}

/// One accepted connection, line-oriented.
pub struct ServerConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ServerConn {
    fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer: write,
        }
    }

    /// Next line from the client, terminator stripped.
    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a client line")
            .expect("read error")
            .expect("client closed the connection")
    }

    /// Next line, or `None` when the client closed.
    pub async fn recv_or_eof(&mut self) -> Option<String> {
        tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a client line")
            .expect("read error")
    }

    pub async fn expect(&mut self, expected: &str) {
        let line = self.recv().await;
        assert_eq!(line, expected);
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Consume the registration burst and welcome the client.
    pub async fn complete_registration(&mut self, nick: &str) {
        self.expect("CAP LS").await;
        self.expect(&format!("NICK {}", nick)).await;
        let user = self.recv().await;
        assert!(user.starts_with("USER "), "expected USER, got {:?}", user);
        self.send(&format!(":irc.test 001 {} :Welcome", nick)).await;
        self.expect("CAP END").await;
    }
}

/// Next event, failing loudly on a stall.
pub async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches.
pub async fn wait_for(rx: &mut EventReceiver, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

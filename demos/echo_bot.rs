//! A small echo bot.
//!
//! Connects to an IRC server, joins a channel, replies to greetings, and
//! answers CTCP VERSION queries. Run with:
//!
//! ```text
//! cargo run --example echo_bot -- irc.libera.chat 6667 '#slirc-demo'
//! ```

use std::sync::Arc;

use slirc_client::{Client, ClientConfig, Event, NickServAuth};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slirc_client=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "irc.libera.chat".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("6667").parse()?;
    let channel = args.next().unwrap_or_else(|| "#slirc-demo".to_string());

    let config = ClientConfig::builder(host, "slirc_echo")
        .port(port)
        .realname("slirc echo bot")
        .name("echo-bot")
        .build();

    let client = Client::new(config);
    if let Ok(password) = std::env::var("NICKSERV_PASSWORD") {
        client.set_auth(Arc::new(NickServAuth::new("slirc_echo", password)));
    }

    let mut events = client.events();
    client.connect();

    while let Some(event) = events.recv().await {
        match event {
            Event::Connected => {
                println!("connected, joining {}", channel);
                client.join(&channel);
            }
            Event::ChannelMessage {
                channel,
                sender,
                text,
            } => {
                println!("[{}] <{}> {}", channel, sender.nick, text);
                if text.contains("hello") {
                    client.send_message(&channel, &format!("hello, {}!", sender.nick));
                }
            }
            Event::PrivateMessage { sender, text } => {
                client.send_message(&sender, &format!("you said: {}", text));
            }
            Event::CtcpQuery { sender, payload, .. } => {
                if payload == "VERSION" {
                    client.send_notice(&sender, "\u{1}VERSION slirc-client\u{1}");
                }
            }
            Event::ConnectionClosed { reconnect } => {
                println!("connection closed (reconnect: {})", reconnect);
                if !reconnect {
                    break;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

//! Registration and capability negotiation against a scripted server.

mod common;

use std::time::Duration;

use common::{next_event, wait_for, MockServer};
use slirc_client::{Client, EngineState, Event};

#[tokio::test]
async fn plain_registration_sends_burst_in_order() {
    let server = MockServer::bind().await;
    let client = Client::new(server.config("kitten").realname("real").username("user").build());
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    conn.expect("USER user 0 * :real").await;

    // Ordinary notices do not end capability negotiation.
    conn.send("NOTICE AUTH :*** looking up your hostname").await;
    conn.send(":irc.test 001 kitten :Welcome to the network").await;

    // The welcome numeric closes negotiation, then the engine goes ready.
    conn.expect("CAP END").await;
    let event = wait_for(&mut events, |e| matches!(e, Event::Connected)).await;
    assert!(matches!(event, Event::Connected));
    assert_eq!(client.state(), EngineState::Ready);
    assert_eq!(client.nick(), "kitten");

    client.shutdown(None);
}

#[tokio::test]
async fn cap_negotiation_requests_and_acknowledges() {
    let server = MockServer::bind().await;
    let client = Client::new(
        server
            .config("kitten")
            .request_caps(vec!["multi-prefix".to_string()])
            .build(),
    );
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    conn.send(":irc.test CAP * LS :multi-prefix sasl").await;
    conn.expect("CAP REQ :multi-prefix").await;
    conn.send(":irc.test CAP * ACK :multi-prefix").await;
    conn.expect("CAP END").await;

    let event = wait_for(&mut events, |e| {
        matches!(e, Event::CapabilitiesAcknowledged { .. })
    })
    .await;
    match event {
        Event::CapabilitiesAcknowledged { capabilities } => {
            assert_eq!(capabilities, vec!["multi-prefix".to_string()]);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // ACK completes negotiation without waiting for the welcome numeric.
    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;
    assert_eq!(client.state(), EngineState::Ready);

    client.shutdown(None);
}

#[tokio::test]
async fn cap_nak_carries_full_request() {
    let server = MockServer::bind().await;
    let client = Client::new(
        server
            .config("kitten")
            .request_caps(vec!["multi-prefix".to_string(), "away-notify".to_string()])
            .build(),
    );
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    conn.send(":irc.test CAP * LS :multi-prefix away-notify").await;
    conn.expect("CAP REQ :multi-prefix away-notify").await;
    conn.send(":irc.test CAP * NAK :multi-prefix away-notify").await;
    conn.expect("CAP END").await;

    let event = wait_for(&mut events, |e| {
        matches!(e, Event::CapabilitiesRejected { .. })
    })
    .await;
    match event {
        Event::CapabilitiesRejected { requested } => {
            assert_eq!(
                requested,
                vec!["multi-prefix".to_string(), "away-notify".to_string()]
            );
        }
        other => panic!("unexpected event {:?}", other),
    }

    client.shutdown(None);
}

#[tokio::test]
async fn cap_ls_with_no_overlap_ends_immediately() {
    let server = MockServer::bind().await;
    let client = Client::new(
        server
            .config("kitten")
            .request_caps(vec!["multi-prefix".to_string()])
            .build(),
    );
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    // Nothing the client wants, so no REQ at all.
    conn.send(":irc.test CAP * LS :sasl").await;
    conn.expect("CAP END").await;
    conn.send(":irc.test 001 kitten :Welcome").await;

    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;
    client.shutdown(None);
}

#[tokio::test]
async fn cap_ls_timeout_falls_back_to_plain_registration() {
    let server = MockServer::bind().await;
    let client = Client::new(
        server
            .config("kitten")
            .cap_timeout(Duration::from_millis(150))
            .build(),
    );
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    // Say nothing; the engine gives up on CAP by itself.
    conn.expect("CAP END").await;
    conn.send(":irc.test 001 kitten :Welcome").await;
    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;

    client.shutdown(None);
}

#[tokio::test]
async fn nick_collision_appends_disambiguator() {
    let server = MockServer::bind().await;
    let client = Client::new(server.config("kitten").build());
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    conn.send(":irc.test 433 * kitten :Nickname is already in use").await;
    // The numeric also closes capability negotiation.
    conn.expect("CAP END").await;
    conn.expect("NICK kitten_").await;

    conn.send(":irc.test 433 * kitten_ :Nickname is already in use").await;
    conn.expect("NICK kitten__").await;

    conn.send(":irc.test 001 kitten__ :Welcome").await;
    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;
    assert_eq!(client.nick(), "kitten__");
    // The original nick is still the goal.
    assert_eq!(client.intended_nick(), "kitten");

    client.shutdown(None);
}

#[tokio::test]
async fn services_auth_runs_after_registration() {
    use slirc_client::NickServAuth;
    use std::sync::Arc;

    let server = MockServer::bind().await;
    let client = Client::new(server.config("kitten").build());
    client.set_auth(Arc::new(NickServAuth::new("kitten", "hunter2")));
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.complete_registration("kitten").await;
    conn.expect("PRIVMSG NickServ :IDENTIFY kitten hunter2").await;
    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;

    client.shutdown(None);
}

#[tokio::test]
async fn server_password_goes_out_before_nick() {
    let server = MockServer::bind().await;
    let client = Client::new(server.config("kitten").server_password("hunter2").build());
    let mut events = client.events();
    client.connect();

    let mut conn = server.accept().await;
    conn.expect("CAP LS").await;
    conn.expect("PASS hunter2").await;
    conn.expect("NICK kitten").await;
    let _user = conn.recv().await;

    conn.send(":irc.test 001 kitten :Welcome").await;
    conn.expect("CAP END").await;
    let _ = next_event(&mut events).await;

    client.shutdown(None);
}

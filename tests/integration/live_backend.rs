// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end tests: two engines on one live backend.
//!
//! Each engine runs the real [`WsConnector`] and [`HttpBackend`] against an
//! in-process [`solace_backend`] server, exercising the whole stack: room
//! setup over REST, socket frames both ways, echo reconciliation, delivery
//! confirmation, and read receipts crossing between clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use solace_backend::server;
use solace_proto::message::{Origin, UserId};
use solace_sync::api::HttpBackend;
use solace_sync::auth::StaticAuth;
use solace_sync::config::EngineConfig;
use solace_sync::connection::ConnectionState;
use solace_sync::session::{SessionEngine, SessionEvent};
use solace_sync::store::StatusField;
use solace_sync::transport::ws::WsConnector;

type LiveEngine = SessionEngine<WsConnector, HttpBackend<StaticAuth>, StaticAuth>;

fn test_config() -> EngineConfig {
    EngineConfig {
        reconnect_delay: Duration::from_millis(50),
        poll_interval: Duration::from_millis(30),
        ..EngineConfig::default()
    }
}

/// Engine wired to the live backend for both REST and the socket.
fn live_engine(
    backend: SocketAddr,
    token: &str,
    user: &str,
    name: &str,
) -> (LiveEngine, mpsc::Receiver<SessionEvent>) {
    let auth = StaticAuth::new(token, UserId::new(user), name);
    let api = HttpBackend::new(
        Url::parse(&format!("http://{backend}/")).unwrap(),
        Arc::new(auth.clone()),
    );
    let connector = WsConnector::new(Url::parse(&format!("ws://{backend}/")).unwrap());
    SessionEngine::new(connector, api, auth, test_config())
}

async fn wait_for_event(
    events: &mut mpsc::Receiver<SessionEvent>,
    mut matches: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn two_clients_exchange_messages_and_receipts() {
    let (addr, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let (asha, mut asha_events) = live_engine(addr, "3:Asha R", "3", "Asha R");
    let (dev, mut dev_events) = live_engine(addr, "7:Dev K", "7", "Dev K");

    // Asha opens the conversation and sends over the live socket.
    let room = asha.open(&UserId::new("7")).await.unwrap();
    assert_eq!(asha.connection_state(), ConnectionState::Connected);
    let hello_id = asha.send_message("hey Dev, checking in").await.unwrap();

    // The backend confirms delivery; the broadcast echo must not duplicate.
    wait_for_event(&mut asha_events, |e| {
        matches!(
            e,
            SessionEvent::StatusChanged {
                field: StatusField::Delivered,
                ..
            }
        )
    })
    .await;
    assert_eq!(asha.messages().len(), 1);
    assert!(asha.messages()[0].is_delivered);

    // Dev opens the same conversation: both participants resolve the same
    // room, the history is seeded, and opening marks it read.
    let dev_room = dev.open(&UserId::new("3")).await.unwrap();
    assert_eq!(dev_room, room);
    assert_eq!(dev.messages().len(), 1);
    assert_eq!(dev.messages()[0].content, "hey Dev, checking in");

    // Dev's mark-read reaches Asha as a read receipt on her message.
    let event = wait_for_event(&mut asha_events, |e| {
        matches!(
            e,
            SessionEvent::StatusChanged {
                field: StatusField::Read,
                ..
            }
        )
    })
    .await;
    let SessionEvent::StatusChanged { message_id, .. } = event else {
        unreachable!()
    };
    assert_eq!(message_id, hello_id);
    assert!(asha.messages()[0].is_read);

    // Dev replies over his socket; it lands in Asha's store as remote.
    dev.send_message("all good here").await.unwrap();
    let event = wait_for_event(&mut asha_events, |e| {
        matches!(e, SessionEvent::MessageAppended(m) if m.origin == Origin::Remote)
    })
    .await;
    let SessionEvent::MessageAppended(reply) = event else {
        unreachable!()
    };
    assert_eq!(reply.content, "all good here");
    assert_eq!(reply.author_id, Some(UserId::new("7")));

    // Dev's own echo did not duplicate his optimistic entry.
    wait_for_event(&mut dev_events, |e| {
        matches!(
            e,
            SessionEvent::StatusChanged {
                field: StatusField::Delivered,
                ..
            }
        )
    })
    .await;
    assert_eq!(dev.messages().len(), 2);
    assert_eq!(asha.messages().len(), 2);
}

#[tokio::test]
async fn socket_send_lands_in_rest_history() {
    let (addr, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let (asha, _events) = live_engine(addr, "3:Asha R", "3", "Asha R");

    let room = asha.open(&UserId::new("7")).await.unwrap();
    let id = asha.send_message("for the record").await.unwrap();

    // Give the backend a moment to process the socket frame.
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let history: serde_json::Value = client
            .get(format!("http://{addr}/chat/{room}/messages/"))
            .bearer_auth("7:Dev K")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if history.as_array().is_some_and(|a| !a.is_empty()) {
            assert_eq!(history[0]["id"], id.as_str());
            assert_eq!(history[0]["content"], "for the record");
            assert_eq!(history[0]["author_full_name"], "Asha R");
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "socket send never reached the backend history"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn reopening_against_the_backend_reuses_the_room() {
    let (addr, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let (asha, _events) = live_engine(addr, "3:Asha R", "3", "Asha R");

    let first = asha.open(&UserId::new("7")).await.unwrap();
    asha.send_message("before the restart").await.unwrap();
    asha.close().await;

    let second = asha.open(&UserId::new("7")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(asha.messages().len(), 1, "history survives a reopen");
    assert_eq!(asha.connection_state(), ConnectionState::Connected);
}

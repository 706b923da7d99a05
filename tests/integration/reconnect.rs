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

//! Integration tests for link loss handling.
//!
//! A clean close from the backend schedules a reconnect attempt; a read
//! error degrades the session to REST polling; closing the session stops
//! both. The loopback transport plays the backend so each failure mode can
//! be triggered precisely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use solace_proto::frame::OutboundFrame;
use solace_proto::message::{MessageId, RoomId, UserId};
use solace_sync::api::StubApi;
use solace_sync::auth::StaticAuth;
use solace_sync::config::EngineConfig;
use solace_sync::connection::{ConnectionState, DegradedMode};
use solace_sync::session::{SessionEngine, SessionEvent};
use solace_sync::transport::TransportError;
use solace_sync::transport::loopback::{self, LoopbackConnector, LoopbackPeer};

type LoopbackEngine = SessionEngine<LoopbackConnector, Arc<StubApi>, StaticAuth>;

fn test_config() -> EngineConfig {
    EngineConfig {
        reconnect_delay: Duration::from_millis(50),
        poll_interval: Duration::from_millis(30),
        ..EngineConfig::default()
    }
}

fn setup() -> (
    LoopbackEngine,
    mpsc::Receiver<SessionEvent>,
    mpsc::UnboundedReceiver<LoopbackPeer>,
    Arc<StubApi>,
) {
    let (connector, accepts) = loopback::pair();
    let api = Arc::new(StubApi::new(RoomId::new("12")));
    let auth = StaticAuth::new("tok", UserId::new("3"), "Asha R");
    let (engine, events) = SessionEngine::new(connector, Arc::clone(&api), auth, test_config());
    (engine, events, accepts, api)
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, target: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {target}"))
        .expect("state channel closed");
}

#[tokio::test]
async fn clean_close_reconnects_and_resumes_sending() {
    let (engine, _events, mut accepts, _api) = setup();
    let mut states = engine.subscribe_connection();

    engine.open(&UserId::new("7")).await.unwrap();
    let first = accepts.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    // Backend closes the socket cleanly.
    drop(first);
    wait_for_state(&mut states, ConnectionState::Disconnected).await;

    // After the delay a fresh connection comes in for the same room.
    let mut second = tokio::time::timeout(Duration::from_secs(5), accepts.recv())
        .await
        .expect("no reconnect attempt arrived")
        .unwrap();
    assert_eq!(second.room, RoomId::new("12"));
    wait_for_state(&mut states, ConnectionState::Connected).await;

    // Sends flow over the replacement socket.
    engine.send_message("still here").await.unwrap();
    let OutboundFrame::SendMessage { message, .. } = second.outbound.recv().await.unwrap();
    assert_eq!(message, "still here");
}

#[tokio::test]
async fn read_error_degrades_to_polling() {
    let (engine, _events, mut accepts, api) = setup();
    let mut states = engine.subscribe_connection();

    engine.open(&UserId::new("7")).await.unwrap();
    let peer = accepts.recv().await.unwrap();

    peer.inbound
        .send(Err(TransportError::Io(std::io::Error::other("reset"))))
        .unwrap();
    wait_for_state(&mut states, ConnectionState::Degraded(DegradedMode::Polling)).await;

    // Polling keeps the store in sync while the socket is down.
    api.push_message(solace_proto::message::Message {
        id: MessageId::new("9"),
        content: "missed you".into(),
        author_id: Some(UserId::new("7")),
        author_full_name: Some("Dev K".into()),
        timestamp: chrono::Utc::now(),
        is_delivered: true,
        is_read: false,
        origin: solace_proto::message::Origin::Remote,
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if engine
            .messages()
            .iter()
            .any(|m| m.id == MessageId::new("9"))
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("poll never picked up the server-side message");
}

#[tokio::test]
async fn closing_the_session_cancels_the_pending_reconnect() {
    let (engine, _events, mut accepts, _api) = setup();
    let mut states = engine.subscribe_connection();

    engine.open(&UserId::new("7")).await.unwrap();
    let peer = accepts.recv().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    drop(peer);
    wait_for_state(&mut states, ConnectionState::Disconnected).await;

    // Close before the reconnect timer fires.
    engine.close().await;
    assert_eq!(engine.connection_state(), ConnectionState::Closed);

    // Well past the reconnect delay, no new connection attempt shows up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(accepts.try_recv().is_err(), "reconnect was not cancelled");
}

#[tokio::test]
async fn reopening_after_close_starts_a_fresh_link() {
    let (engine, _events, mut accepts, _api) = setup();

    engine.open(&UserId::new("7")).await.unwrap();
    let _first = accepts.recv().await.unwrap();
    engine.close().await;

    engine.open(&UserId::new("7")).await.unwrap();
    let second = accepts.recv().await.unwrap();
    assert_eq!(second.room, RoomId::new("12"));
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
}

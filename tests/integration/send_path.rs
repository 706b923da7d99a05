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

//! Integration tests for the optimistic send path.
//!
//! Drives a [`SessionEngine`] over a loopback socket and a stub REST
//! backend through a full conversation: seeding history, the optimistic
//! append, the server echo, delivery confirmation, a peer reply, and the
//! read receipt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use solace_proto::frame::{InboundFrame, NewMessage, OutboundFrame};
use solace_proto::message::{Message, MessageId, Origin, RoomId, UserId};
use solace_sync::api::StubApi;
use solace_sync::auth::StaticAuth;
use solace_sync::config::EngineConfig;
use solace_sync::session::{SessionEngine, SessionEvent};
use solace_sync::store::StatusField;
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

fn peer_message(id: &str, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        content: content.into(),
        author_id: Some(UserId::new("7")),
        author_full_name: Some("Dev K".into()),
        timestamp: Utc::now(),
        is_delivered: true,
        is_read: true,
        origin: Origin::Remote,
    }
}

#[tokio::test]
async fn conversation_round_trip() {
    let (engine, mut events, mut accepts, api) = setup();
    api.seed(vec![peer_message("1", "hey, how have you been?")]);

    // Opening seeds history and binds the socket.
    let room = engine.open(&UserId::new("7")).await.unwrap();
    assert_eq!(room, RoomId::new("12"));
    assert_eq!(engine.messages().len(), 1);
    let mut peer = accepts.recv().await.unwrap();
    assert_eq!(peer.token, "tok");

    // The send appears locally before the backend has seen it.
    let id = engine.send_message("better, thanks for asking").await.unwrap();
    {
        let messages = engine.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].origin, Origin::Local);
        assert!(!messages[1].is_delivered);
    }

    // The frame that went over the wire carries the provisional id.
    let OutboundFrame::SendMessage {
        message,
        message_id,
        author_full_name,
    } = peer.outbound.recv().await.unwrap();
    assert_eq!(message, "better, thanks for asking");
    assert_eq!(message_id, id);
    assert_eq!(author_full_name, "Asha R");

    // The backend echoes the broadcast to the sender too, then confirms
    // delivery. The echo must not duplicate the optimistic entry.
    peer.inbound
        .send(Ok(InboundFrame::NewMessage(NewMessage {
            message_id: Some(id.clone()),
            content: "better, thanks for asking".into(),
            author_id: Some(UserId::new("3")),
            author_name: Some("Asha R".into()),
            timestamp: None,
        })))
        .unwrap();
    peer.inbound
        .send(Ok(InboundFrame::MessageDelivered {
            message_id: id.clone(),
        }))
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StatusChanged {
                field: StatusField::Delivered,
                ..
            }
        )
    })
    .await;
    assert_eq!(engine.messages().len(), 2);
    assert!(engine.messages()[1].is_delivered);

    // A reply from the peer appends as a remote message.
    peer.inbound
        .send(Ok(InboundFrame::NewMessage(NewMessage {
            message_id: Some(MessageId::new("2")),
            content: "glad to hear it".into(),
            author_id: Some(UserId::new("7")),
            author_name: Some("Dev K".into()),
            timestamp: None,
        })))
        .unwrap();
    wait_for_event(&mut events, |e| matches!(e, SessionEvent::MessageAppended(_))).await;

    // The peer reads our message.
    peer.inbound
        .send(Ok(InboundFrame::MessageRead {
            message_id: id.clone(),
        }))
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            SessionEvent::StatusChanged {
                field: StatusField::Read,
                ..
            }
        )
    })
    .await;

    let messages = engine.messages();
    assert_eq!(messages.len(), 3);
    let ours = messages.iter().find(|m| m.id == id).unwrap();
    assert!(ours.is_delivered);
    assert!(ours.is_read);
}

#[tokio::test]
async fn todays_messages_share_one_day_group() {
    let (engine, _events, mut accepts, api) = setup();
    api.seed(vec![peer_message("1", "first"), peer_message("2", "second")]);
    engine.open(&UserId::new("7")).await.unwrap();
    let _peer = accepts.recv().await.unwrap();

    engine.send_message("third").await.unwrap();

    let groups = engine.day_groups();
    assert_eq!(groups.len(), 1, "all three messages were sent today");
    assert_eq!(groups[0].messages.len(), 3);
    assert!(!groups[0].label.is_empty());
}

#[tokio::test]
async fn every_append_reaches_the_event_stream_in_order() {
    let (engine, mut events, mut accepts, _api) = setup();
    engine.open(&UserId::new("7")).await.unwrap();
    let peer = accepts.recv().await.unwrap();

    let id = engine.send_message("one").await.unwrap();
    peer.inbound
        .send(Ok(InboundFrame::NewMessage(NewMessage {
            message_id: Some(MessageId::new("2")),
            content: "two".into(),
            author_id: Some(UserId::new("7")),
            author_name: None,
            timestamp: None,
        })))
        .unwrap();

    let first = wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::MessageAppended(_))
    })
    .await;
    let SessionEvent::MessageAppended(first) = first else {
        unreachable!()
    };
    assert_eq!(first.id, id, "the optimistic append is reported first");

    let second = wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::MessageAppended(_))
    })
    .await;
    let SessionEvent::MessageAppended(second) = second else {
        unreachable!()
    };
    assert_eq!(second.id, MessageId::new("2"));
}

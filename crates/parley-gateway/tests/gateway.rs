//! Drives the gateway command surface end to end against an in-memory
//! store: two registered users exchanging, editing, and purging messages.

use std::sync::Arc;

use parley_db::Database;
use parley_gateway::connection::{Gateway, handle_command};
use parley_store::messages::MessageStore;
use parley_store::presence::PresenceRegistry;
use parley_types::events::{GatewayCommand, GatewayEvent, SignalPayload};

fn gateway() -> Gateway {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let registry = Arc::new(PresenceRegistry::new(db.clone()).unwrap());
    let store = Arc::new(MessageStore::new(db).unwrap());
    Gateway::new(registry, store, "test-secret".into())
}

fn send(gw: &Gateway, from: &str, to: &str, body: &str) {
    handle_command(
        gw,
        from,
        GatewayCommand::SendMessage {
            sender: from.into(),
            receiver: to.into(),
            body: body.into(),
        },
    );
}

#[test]
fn message_reaches_both_peers() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");
    let (_b, mut bob_rx) = gw.registry.register("bob");

    send(&gw, "alice", "bob", "hi");

    match bob_rx.try_recv().unwrap() {
        GatewayEvent::ReceiveMessage { message } => {
            assert_eq!(message.sender, "alice");
            assert_eq!(message.body, "hi");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    // Sender gets the self-echo too.
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::ReceiveMessage { .. }
    ));

    assert_eq!(gw.store.conversation("alice", "bob").unwrap().len(), 1);
}

#[test]
fn offline_peer_still_gets_message_stored() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");
    let (bob_conn, mut bob_rx) = gw.registry.register("bob");
    gw.registry.mark_offline(bob_conn);

    send(&gw, "alice", "bob", "you there?");

    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::ReceiveMessage { .. }
    ));
    assert!(bob_rx.try_recv().is_err());
    assert!(!gw.registry.is_online("bob"));
    assert_eq!(gw.store.conversation("bob", "alice").unwrap().len(), 1);
}

#[test]
fn status_query_answers_both_sides() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");
    let (_b, mut bob_rx) = gw.registry.register("bob");

    handle_command(
        &gw,
        "alice",
        GatewayCommand::GetUserStatus {
            sender: "alice".into(),
            receiver: "bob".into(),
        },
    );

    match alice_rx.try_recv().unwrap() {
        GatewayEvent::UserStatus { entry } => {
            assert_eq!(entry.username, "bob");
            assert!(entry.is_online());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match bob_rx.try_recv().unwrap() {
        GatewayEvent::UserStatus { entry } => assert_eq!(entry.username, "alice"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn edit_and_delete_ack_negatively_on_missing_target() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");

    handle_command(
        &gw,
        "alice",
        GatewayCommand::EditMessage {
            sender: "alice".into(),
            receiver: "bob".into(),
            id: None,
            timestamp: Some(12345),
            body: "edited".into(),
        },
    );
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::MessageEdited { is_edited: false }
    ));

    handle_command(
        &gw,
        "alice",
        GatewayCommand::DeleteMessage {
            sender: "alice".into(),
            receiver: "bob".into(),
            id: None,
            timestamp: Some(12345),
        },
    );
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::MessageDeleted { is_deleted: false }
    ));
}

#[test]
fn edit_acks_and_updates_store() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");

    send(&gw, "alice", "bob", "helo");
    let sent = match alice_rx.try_recv().unwrap() {
        GatewayEvent::ReceiveMessage { message } => message,
        other => panic!("unexpected event: {:?}", other),
    };

    handle_command(
        &gw,
        "alice",
        GatewayCommand::EditMessage {
            sender: "alice".into(),
            receiver: "bob".into(),
            id: Some(sent.id),
            timestamp: None,
            body: "hello".into(),
        },
    );
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::MessageEdited { is_edited: true }
    ));

    let convo = gw.store.conversation("alice", "bob").unwrap();
    assert_eq!(convo[0].body, "hello");
    assert!(convo[0].edited);
}

#[test]
fn purge_broadcasts_empty_conversation() {
    let gw = gateway();
    let (_a, mut alice_rx) = gw.registry.register("alice");
    let (_b, mut bob_rx) = gw.registry.register("bob");

    send(&gw, "alice", "bob", "one");
    send(&gw, "bob", "alice", "two");
    // Drain the deliveries before purging.
    while alice_rx.try_recv().is_ok() {}
    while bob_rx.try_recv().is_ok() {}

    handle_command(
        &gw,
        "alice",
        GatewayCommand::DeleteAllMessages {
            sender: "alice".into(),
            receiver: "bob".into(),
        },
    );

    for rx in [&mut alice_rx, &mut bob_rx] {
        match rx.try_recv().unwrap() {
            GatewayEvent::AllMessages { messages, .. } => assert!(messages.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // Purging again is harmless.
    handle_command(
        &gw,
        "alice",
        GatewayCommand::DeleteAllMessages {
            sender: "alice".into(),
            receiver: "bob".into(),
        },
    );
    assert!(gw.store.conversation("alice", "bob").unwrap().is_empty());
}

#[test]
fn signal_uses_connection_identity() {
    let gw = gateway();
    let (_a, _alice_rx) = gw.registry.register("alice");
    let (_b, mut bob_rx) = gw.registry.register("bob");

    handle_command(
        &gw,
        "alice",
        GatewayCommand::Signal {
            receiver: "bob".into(),
            payload: SignalPayload::CallRequest {
                call_type: "video".into(),
            },
        },
    );

    match bob_rx.try_recv().unwrap() {
        GatewayEvent::Signal { sender, payload } => {
            assert_eq!(sender, "alice");
            assert!(matches!(
                payload,
                SignalPayload::CallRequest { call_type } if call_type == "video"
            ));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

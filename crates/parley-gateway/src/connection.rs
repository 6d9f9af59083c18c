use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use parley_store::StoreError;
use parley_store::messages::MessageStore;
use parley_store::presence::PresenceRegistry;
use parley_types::events::{GatewayCommand, GatewayEvent};
use parley_types::models::MessageIdent;

use crate::relay::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket gets to send its Register frame.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection handler needs: the presence registry, the
/// message log, the dispatcher routing events to peers, and the secret for
/// validating Register tokens.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Arc<PresenceRegistry>,
    pub store: Arc<MessageStore>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

impl Gateway {
    pub fn new(registry: Arc<PresenceRegistry>, store: Arc<MessageStore>, jwt_secret: String) -> Self {
        let dispatcher = Dispatcher::new(registry.clone());
        Self {
            registry,
            store,
            dispatcher,
            jwt_secret,
        }
    }
}

/// Handle a single WebSocket connection. The first frame must be a
/// Register command carrying a valid token; everything after runs until
/// either side closes the socket, then the username goes offline.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for the Register command with a token
    let Some(username) = wait_for_register(&mut receiver, &gateway.jwt_secret).await else {
        warn!("WebSocket client failed to register, closing");
        return;
    };

    // Step 2: Go online and take over any stale connection
    let (conn_id, mut user_rx) = gateway.registry.register(&username);
    info!("{} connected to gateway", username);

    // Step 3: Confirm
    let ready = GatewayEvent::Ready {
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        gateway.registry.mark_offline(conn_id);
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let gateway_recv = gateway.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&gateway_recv, &username_recv, cmd);
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            username_recv,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.registry.mark_offline(conn_id);
    info!("{} disconnected from gateway", username);
}

async fn wait_for_register(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<String> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use parley_types::api::Claims;

    let timeout = tokio::time::timeout(REGISTER_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Register { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.username);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Apply one client command against the shared state. Split out from the
/// socket loop so the command surface can be driven without a WebSocket.
pub fn handle_command(gateway: &Gateway, username: &str, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Register { .. } => {} // Already handled

        GatewayCommand::GetUserStatus { sender, receiver } => {
            // Both peers learn about the other, matching the client's
            // expectation that opening a chat refreshes both sides.
            gateway.dispatcher.send_user_status(&sender, &receiver);
            gateway.dispatcher.send_user_status(&receiver, &sender);
        }

        GatewayCommand::GetAllMessages { sender, receiver } => {
            match gateway.store.conversation(&sender, &receiver) {
                Ok(messages) => {
                    debug!("Sending {} message(s) to {}", messages.len(), sender);
                    gateway.dispatcher.forward(
                        &sender,
                        GatewayEvent::AllMessages {
                            sender: sender.clone(),
                            receiver,
                            messages,
                        },
                    );
                }
                Err(e) => warn!("Conversation query for {} failed: {}", sender, e),
            }
        }

        GatewayCommand::SendMessage { sender, receiver, body } => {
            match gateway.store.append(&sender, &receiver, &body) {
                Ok(message) => {
                    debug!("Message {} from {} to {}", message.id, sender, receiver);
                    // Best-effort delivery to both ends; each forward is
                    // independent and an offline peer is a silent drop.
                    gateway.dispatcher.forward(
                        &sender,
                        GatewayEvent::ReceiveMessage { message: message.clone() },
                    );
                    let delivered = gateway
                        .dispatcher
                        .forward(&receiver, GatewayEvent::ReceiveMessage { message });
                    if !delivered {
                        debug!("{} is offline, message stored only", receiver);
                    }
                }
                Err(e) => warn!("Failed to store message from {}: {}", sender, e),
            }
        }

        GatewayCommand::EditMessage { sender, receiver, id, timestamp, body } => {
            let ident = MessageIdent {
                id,
                sender: sender.clone(),
                receiver,
                timestamp,
            };
            let is_edited = match gateway.store.edit(&ident, &body) {
                Ok(_) => true,
                Err(StoreError::NotFound) => false,
                Err(e) => {
                    warn!("Edit by {} failed: {}", sender, e);
                    false
                }
            };
            gateway
                .dispatcher
                .forward(&sender, GatewayEvent::MessageEdited { is_edited });
        }

        GatewayCommand::DeleteMessage { sender, receiver, id, timestamp } => {
            let ident = MessageIdent {
                id,
                sender: sender.clone(),
                receiver,
                timestamp,
            };
            let is_deleted = match gateway.store.delete(&ident) {
                Ok(()) => true,
                Err(StoreError::NotFound) => false,
                Err(e) => {
                    warn!("Delete by {} failed: {}", sender, e);
                    false
                }
            };
            gateway
                .dispatcher
                .forward(&sender, GatewayEvent::MessageDeleted { is_deleted });
        }

        GatewayCommand::DeleteAllMessages { sender, receiver } => {
            if let Err(e) = gateway.store.delete_conversation(&sender, &receiver) {
                warn!("Conversation purge by {} failed: {}", sender, e);
            }
            info!("Conversation between {} and {} purged", sender, receiver);

            // Both peers get the now-current (empty) conversation so stale
            // views are replaced rather than silently left behind.
            match gateway.store.conversation(&sender, &receiver) {
                Ok(messages) => {
                    gateway.dispatcher.forward(
                        &sender,
                        GatewayEvent::AllMessages {
                            sender: sender.clone(),
                            receiver: receiver.clone(),
                            messages: messages.clone(),
                        },
                    );
                    gateway.dispatcher.forward(
                        &receiver,
                        GatewayEvent::AllMessages {
                            sender: receiver.clone(),
                            receiver: sender.clone(),
                            messages,
                        },
                    );
                }
                Err(e) => warn!("Conversation re-read after purge failed: {}", e),
            }
        }

        GatewayCommand::Signal { receiver, payload } => {
            // The authenticated connection, not the payload, names the
            // caller. Pass-through: no call state is kept here.
            let delivered = gateway.dispatcher.forward_signal(username, &receiver, payload);
            if !delivered {
                debug!("Signal from {} dropped, {} is offline", username, receiver);
            }
        }
    }
}

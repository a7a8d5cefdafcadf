//! Per-connection task for SessionHub (spec.md §4.3): one task owns the
//! socket for its lifetime, alternating inbound command parsing and a
//! periodic drain of subscribed topics' broadcast channels, grounded on the
//! teacher's `run_connection` poll loop.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use relaykit_common::types::Topic;

use crate::messages::{ClientMessage, ServerFrame};
use crate::state::WsState;

const DRAIN_INTERVAL: Duration = Duration::from_millis(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MAX_MISSED_HEARTBEATS: u32 = 2;

/// Handle an upgraded connection for an already-authenticated user.
pub async fn handle_socket(socket: WebSocket, state: WsState, user_id: Uuid) {
    state.connection_opened();
    run_connection(socket, state.clone(), user_id).await;
    state.connection_closed();
}

async fn run_connection(socket: WebSocket, state: WsState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    // Every authenticated session implicitly subscribes to its own
    // notification topic (spec.md §4.3); all other subscriptions are
    // explicit client requests.
    let own_notifications = Topic::UserNotifications(user_id);
    let mut receivers: Vec<(Topic, broadcast::Receiver<relaykit_common::types::Envelope>)> =
        vec![(own_notifications, state.subscribe(own_notifications))];
    let mut subscribed: HashSet<Topic> = HashSet::from([own_notifications]);

    let mut last_heartbeat_sent = Instant::now();
    let mut missed_heartbeats = 0u32;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.message_received();
                        handle_client_message(&state, &mut sender, &mut receivers, &mut subscribed, user_id, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_heartbeats = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("websocket receive error: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            _ = tokio::time::sleep(DRAIN_INTERVAL) => {
                for (topic, rx) in receivers.iter_mut() {
                    loop {
                        match rx.try_recv() {
                            Ok(envelope) => {
                                let frame = ServerFrame::from_envelope(*topic, &envelope);
                                if let Ok(json) = frame.to_json() {
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        return;
                                    }
                                    state.message_sent();
                                }
                            }
                            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                                tracing::warn!("session for user {user_id} lagged {n} envelopes on topic {topic}");
                            }
                            Err(_) => break,
                        }
                    }
                }

                if last_heartbeat_sent.elapsed() >= HEARTBEAT_INTERVAL {
                    missed_heartbeats += 1;
                    if missed_heartbeats > MAX_MISSED_HEARTBEATS {
                        tracing::debug!("session for user {user_id} missed {missed_heartbeats} heartbeats, closing");
                        break;
                    }
                    if sender.send(Message::Text(crate::messages::ping_json().to_string().into())).await.is_err() {
                        break;
                    }
                    state.message_sent();
                    last_heartbeat_sent = Instant::now();
                }
            }
        }
    }

    tracing::debug!("websocket connection closed for user {user_id}");
}

async fn handle_client_message(
    state: &WsState,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    receivers: &mut Vec<(Topic, broadcast::Receiver<relaykit_common::types::Envelope>)>,
    subscribed: &mut HashSet<Topic>,
    user_id: Uuid,
    raw: &str,
) {
    let message = match ClientMessage::from_command(raw) {
        Ok(m) => m,
        Err(e) => {
            send_error(sender, state, e).await;
            return;
        }
    };

    match message {
        ClientMessage::Subscribe(topic) => {
            if !topic.subscribable_by(user_id) {
                send_error(sender, state, "not authorized to subscribe to this topic").await;
                return;
            }
            if subscribed.insert(topic) {
                receivers.push((topic, state.subscribe(topic)));
            }
        }
        ClientMessage::Unsubscribe(topic) => {
            if topic != Topic::UserNotifications(user_id) {
                subscribed.remove(&topic);
                receivers.retain(|(t, _)| *t != topic);
            }
        }
        ClientMessage::MarkRead(notification_id) => {
            if let Err(e) = state.engine.mark_notification_read(user_id, notification_id).await {
                send_error(sender, state, &e.to_string()).await;
            }
        }
        ClientMessage::MarkAllRead => {
            if let Err(e) = state.engine.mark_all_notifications_read(user_id).await {
                send_error(sender, state, &e.to_string()).await;
            }
        }
    }
}

async fn send_error(sender: &mut futures_util::stream::SplitSink<WebSocket, Message>, state: &WsState, message: &str) {
    if let Ok(json) = ServerFrame::error(message).to_json() {
        let _ = sender.send(Message::Text(json.into())).await;
        state.message_sent();
    }
}

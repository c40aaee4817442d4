//! WebSocket handler for Axum
//!
//! Upgrades the connection after token validation, pumps outbound events
//! through a per-connection channel, and dispatches inbound events to the
//! relay. Each inbound event is handled independently: a bad or failing
//! event is logged (and possibly answered with an `error` event) without
//! affecting the connection or any other event.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::ChatStore;

use super::{
    calls,
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    presence, relay,
    registry::Registry,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token (browsers cannot set headers on
/// WebSocket requests)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> ApiResult<Response> {
    let user_id = match app_state.jwt.validate_access_token(&params.token) {
        Ok(claims) => claims.sub,
        Err(e) => {
            tracing::warn!(error = ?e, "WebSocket auth failed: invalid token");
            return Err(ApiError::InvalidToken);
        }
    };

    tracing::info!(user_id = %user_id, "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: uuid::Uuid, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = Arc::new(Connection::new(user_id, tx));
    let session_id = conn.session_id;

    // Connection acknowledgment; the client answers with join_room
    let _ = conn.send(ServerEvent::Connected { session_id });

    // Pump outbound events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    let registry = Arc::clone(&app_state.registry);
    let store = Arc::clone(&app_state.store);

    // Handle incoming events
    while let Some(msg) = receiver.next().await {
        if let Ok(msg) = msg {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        handle_client_event(event, &conn, &registry, store.as_ref()).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = ?e,
                            session_id = %session_id,
                            "Failed to parse client event"
                        );
                        let _ = conn.send(ServerEvent::Error {
                            message: "Invalid event format".to_string(),
                        });
                    }
                },
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id, "WebSocket close frame received");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Axum handles ping/pong automatically
                }
                _ => {} // Ignore binary messages
            }
        }
    }

    // Cleanup on disconnect. A stale session (superseded by a newer join)
    // unregisters as a no-op and must not broadcast offline.
    tracing::info!(session_id = %session_id, user_id = %user_id, "WebSocket connection closing");
    if let Some(owner) = registry.unregister(&session_id).await {
        presence::announce(&registry, store.as_ref(), owner, false).await;
    }

    send_task.abort();
}

/// Dispatch one client event
pub async fn handle_client_event(
    event: ClientEvent,
    conn: &Arc<Connection>,
    registry: &Registry,
    store: &dyn ChatStore,
) {
    use ClientEvent::*;

    match event {
        JoinRoom { user_id } => {
            // The room id must match the token's subject
            if user_id != conn.user_id {
                tracing::warn!(
                    claimed = %user_id,
                    authenticated = %conn.user_id,
                    "join_room identity mismatch"
                );
                let _ = conn.send(ServerEvent::Error {
                    message: "Identity mismatch".to_string(),
                });
                return;
            }

            registry.register(Arc::clone(conn)).await;
            presence::announce(registry, store, user_id, true).await;
            relay::flush_pending(registry, store, user_id).await;
        }

        SendMessage {
            receiver_id,
            group_id,
            content,
        } => {
            relay::send_message(registry, store, conn, receiver_id, group_id, content).await;
        }

        MessageDelivered { message_id } => {
            relay::mark_delivered(registry, store, conn, message_id).await;
        }

        MessageRead { message_id } => {
            relay::mark_read(registry, store, conn, message_id).await;
        }

        MarkAllRead { sender_id } => {
            relay::mark_all_read(registry, store, conn, sender_id).await;
        }

        EditMessage {
            message_id,
            content,
        } => {
            relay::edit_message(registry, store, conn, message_id, content).await;
        }

        DeleteMessage { message_id } => {
            relay::delete_message(registry, store, conn, message_id).await;
        }

        UserTyping { receiver_id } => {
            let event = ServerEvent::UserTyping {
                user_id: conn.user_id,
            };
            relay::relay_indicator(registry, store, conn, receiver_id, event).await;
        }

        UserStopTyping { receiver_id } => {
            let event = ServerEvent::UserStopTyping {
                user_id: conn.user_id,
            };
            relay::relay_indicator(registry, store, conn, receiver_id, event).await;
        }

        UserRecording { receiver_id } => {
            let event = ServerEvent::UserRecording {
                user_id: conn.user_id,
            };
            relay::relay_indicator(registry, store, conn, receiver_id, event).await;
        }

        UserStopRecording { receiver_id } => {
            let event = ServerEvent::UserStopRecording {
                user_id: conn.user_id,
            };
            relay::relay_indicator(registry, store, conn, receiver_id, event).await;
        }

        BlockingUpdate { target_id } => {
            relay::relay_blocking_update(registry, conn, target_id).await;
        }

        CallUser {
            target_id,
            signal,
            call_type,
        } => {
            calls::call_user(registry, store, conn, target_id, call_type, signal).await;
        }

        AnswerCall { target_id, signal } => {
            calls::answer_call(registry, conn, target_id, signal).await;
        }

        IceCandidate {
            target_id,
            candidate,
        } => {
            calls::ice_candidate(registry, target_id, candidate).await;
        }

        EndCall { target_id } => {
            calls::end_call(registry, conn, target_id).await;
        }
    }
}

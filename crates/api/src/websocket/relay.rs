//! Message relay and delivery/read state machine
//!
//! Send path: block check, persist, fan out. Status path: every transition
//! funnels through the store's guarded update (the SQL twin of
//! [`MessageStatus::advance`]), and a status event reaches the original
//! sender only when a transition actually happened.
//!
//! Drop policy throughout: blocked targets and offline handles are silent
//! drops, storage failures are logged and nothing is emitted. The sender of
//! a blocked message must not be able to tell it was dropped.

use uuid::Uuid;

use parley_shared::MessageStatus;
use parley_shared::NewMessage;

use super::connection::Connection;
use super::events::ServerEvent;
use super::registry::Registry;
use crate::storage::ChatStore;

/// Relay a `send_message` event from `sender`.
pub async fn send_message(
    registry: &Registry,
    store: &dyn ChatStore,
    sender: &Connection,
    receiver_id: Option<Uuid>,
    group_id: Option<Uuid>,
    content: String,
) {
    let new = match (receiver_id, group_id) {
        (Some(receiver_id), None) => {
            match store.block_exists(sender.user_id, receiver_id).await {
                Ok(true) => {
                    // Silent drop; no feedback to the sender.
                    tracing::debug!(
                        sender_id = %sender.user_id,
                        receiver_id = %receiver_id,
                        "Dropped message due to block relationship"
                    );
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to check block relationship");
                    return;
                }
            }
            NewMessage::direct(sender.user_id, receiver_id, content)
        }
        (None, Some(group_id)) => NewMessage::group(sender.user_id, group_id, content),
        _ => {
            let _ = sender.send(ServerEvent::Error {
                message: "Message must target either a user or a group".to_string(),
            });
            return;
        }
    };

    let message = match store.create_message(new).await {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = ?e, sender_id = %sender.user_id, "Failed to persist message");
            return;
        }
    };

    if let Some(group_id) = message.group_id {
        let members = match store.group_members(group_id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(error = ?e, group_id = %group_id, "Failed to load group members");
                return;
            }
        };
        for member in members.into_iter().filter(|m| *m != sender.user_id) {
            if let Some(conn) = registry.lookup(&member).await {
                let _ = conn.send(ServerEvent::ReceiveMessage {
                    message: message.clone(),
                });
            }
        }
    } else if let Some(receiver_id) = message.receiver_id {
        if let Some(conn) = registry.lookup(&receiver_id).await {
            let _ = conn.send(ServerEvent::ReceiveMessage {
                message: message.clone(),
            });
        }
    }

    // Echo back for the sender's other devices.
    let _ = sender.send(ServerEvent::MessageSent { message });
}

/// Sweep messages that were sent while `user_id` was offline.
///
/// Runs on register. Each pending message advances to `delivered` through
/// the guarded update, so a second register racing this sweep cannot
/// produce a duplicate status event for the same message.
pub async fn flush_pending(registry: &Registry, store: &dyn ChatStore, user_id: Uuid) {
    let pending = match store.pending_for_user(user_id).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(error = ?e, user_id = %user_id, "Failed to load pending messages");
            return;
        }
    };

    for message in pending {
        match store
            .advance_message_status(message.id, user_id, MessageStatus::Delivered)
            .await
        {
            Ok(Some(updated)) => {
                if let Some(conn) = registry.lookup(&updated.sender_id).await {
                    let _ = conn.send(ServerEvent::MessageStatusUpdate {
                        message_id: updated.id,
                        status: updated.status,
                    });
                }
            }
            Ok(None) => {} // Another sweep got there first
            Err(e) => {
                tracing::error!(error = ?e, message_id = %message.id, "Failed to mark delivered");
            }
        }
    }
}

/// Receiving client acknowledged receipt of a message.
pub async fn mark_delivered(
    registry: &Registry,
    store: &dyn ChatStore,
    receiver: &Connection,
    message_id: Uuid,
) {
    advance_and_notify(registry, store, receiver, message_id, MessageStatus::Delivered).await;
}

/// Receiving client displayed a message.
pub async fn mark_read(
    registry: &Registry,
    store: &dyn ChatStore,
    receiver: &Connection,
    message_id: Uuid,
) {
    advance_and_notify(registry, store, receiver, message_id, MessageStatus::Read).await;
}

async fn advance_and_notify(
    registry: &Registry,
    store: &dyn ChatStore,
    receiver: &Connection,
    message_id: Uuid,
    requested: MessageStatus,
) {
    match store
        .advance_message_status(message_id, receiver.user_id, requested)
        .await
    {
        Ok(Some(updated)) => {
            if let Some(conn) = registry.lookup(&updated.sender_id).await {
                let _ = conn.send(ServerEvent::MessageStatusUpdate {
                    message_id: updated.id,
                    status: updated.status,
                });
            }
        }
        Ok(None) => {
            // Already advanced, regressing, or not addressed to this user.
            tracing::debug!(
                message_id = %message_id,
                user_id = %receiver.user_id,
                requested = %requested,
                "Status acknowledgment was a no-op"
            );
        }
        Err(e) => {
            tracing::error!(error = ?e, message_id = %message_id, "Failed to advance message status");
        }
    }
}

/// `reader` opened the conversation with `sender_id`: mark everything from
/// that sender as read and tell them once.
pub async fn mark_all_read(
    registry: &Registry,
    store: &dyn ChatStore,
    reader: &Connection,
    sender_id: Uuid,
) {
    match store.mark_conversation_read(sender_id, reader.user_id).await {
        Ok(0) => {} // Nothing changed; stay silent so repeats have no effect
        Ok(changed) => {
            tracing::debug!(
                sender_id = %sender_id,
                receiver_id = %reader.user_id,
                changed,
                "Conversation marked read"
            );
            if let Some(conn) = registry.lookup(&sender_id).await {
                let _ = conn.send(ServerEvent::AllMessagesRead {
                    receiver_id: reader.user_id,
                });
            }
        }
        Err(e) => {
            tracing::error!(error = ?e, sender_id = %sender_id, "Failed to mark conversation read");
        }
    }
}

/// Edit a message's content; only the sender may edit.
pub async fn edit_message(
    registry: &Registry,
    store: &dyn ChatStore,
    editor: &Connection,
    message_id: Uuid,
    content: String,
) {
    let updated = match store.edit_message(message_id, editor.user_id, content).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            let _ = editor.send(ServerEvent::Error {
                message: "Cannot edit this message".to_string(),
            });
            return;
        }
        Err(e) => {
            tracing::error!(error = ?e, message_id = %message_id, "Failed to edit message");
            return;
        }
    };

    fan_out_update(
        registry,
        store,
        editor,
        ServerEvent::MessageUpdated {
            message: updated.clone(),
        },
        updated.receiver_id,
        updated.group_id,
    )
    .await;
}

/// Soft-delete a message; only the sender may delete.
pub async fn delete_message(
    registry: &Registry,
    store: &dyn ChatStore,
    owner: &Connection,
    message_id: Uuid,
) {
    let deleted = match store.delete_message(message_id, owner.user_id).await {
        Ok(Some(deleted)) => deleted,
        Ok(None) => {
            let _ = owner.send(ServerEvent::Error {
                message: "Cannot delete this message".to_string(),
            });
            return;
        }
        Err(e) => {
            tracing::error!(error = ?e, message_id = %message_id, "Failed to delete message");
            return;
        }
    };

    fan_out_update(
        registry,
        store,
        owner,
        ServerEvent::MessageDeleted {
            message_id: deleted.id,
        },
        deleted.receiver_id,
        deleted.group_id,
    )
    .await;
}

/// Deliver an edit/delete notification to the other party (or group) and
/// echo it to the actor's own devices.
async fn fan_out_update(
    registry: &Registry,
    store: &dyn ChatStore,
    actor: &Connection,
    event: ServerEvent,
    receiver_id: Option<Uuid>,
    group_id: Option<Uuid>,
) {
    if let Some(group_id) = group_id {
        match store.group_members(group_id).await {
            Ok(members) => {
                for member in members.into_iter().filter(|m| *m != actor.user_id) {
                    if let Some(conn) = registry.lookup(&member).await {
                        let _ = conn.send(event.clone());
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = ?e, group_id = %group_id, "Failed to load group members");
            }
        }
    } else if let Some(receiver_id) = receiver_id {
        if let Some(conn) = registry.lookup(&receiver_id).await {
            let _ = conn.send(event.clone());
        }
    }

    let _ = actor.send(event);
}

/// Typing and voice-note recording indicators. Never persisted; suppressed
/// under a block relationship like any other relay.
pub async fn relay_indicator(
    registry: &Registry,
    store: &dyn ChatStore,
    from: &Connection,
    receiver_id: Uuid,
    event: ServerEvent,
) {
    match store.block_exists(from.user_id, receiver_id).await {
        Ok(true) => return,
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = ?e, "Failed to check block relationship");
            return;
        }
    }

    if let Some(conn) = registry.lookup(&receiver_id).await {
        let _ = conn.send(event);
    }
}

/// The actor changed their block list; the affected peer re-fetches it over
/// REST when told.
pub async fn relay_blocking_update(registry: &Registry, from: &Connection, target_id: Uuid) {
    if let Some(conn) = registry.lookup(&target_id).await {
        let _ = conn.send(ServerEvent::BlockingUpdate {
            user_id: from.user_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    async fn online(
        registry: &Registry,
        user_id: Uuid,
    ) -> (Arc<Connection>, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(user_id, tx));
        registry.register(Arc::clone(&conn)).await;
        (conn, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_direct_send_persists_and_fans_out() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (_bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;

        assert_eq!(store.message_count(), 1);
        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::ReceiveMessage { .. }]
        ));
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::MessageSent { .. }]
        ));
    }

    #[tokio::test]
    async fn test_blocked_send_is_silently_dropped() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        // Bob blocked Alice; the suppression works in both directions.
        store.add_block(bob, alice);
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (_bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;

        assert_eq!(store.message_count(), 0, "blocked message must not persist");
        assert!(drain(&mut bob_rx).is_empty());
        // The sender gets no error either; they must not learn they are blocked.
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_send_to_offline_receiver_stays_sent() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;

        assert_eq!(store.message_count(), 1);
        // Sender still gets the echo.
        let events = drain(&mut alice_rx);
        let [ServerEvent::MessageSent { message }] = events.as_slice() else {
            panic!("expected exactly the sender echo, got {events:?}");
        };
        assert_eq!(store.message_status(message.id), Some(MessageStatus::Sent));
    }

    #[tokio::test]
    async fn test_flush_pending_notifies_each_sender_exactly_once() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;

        // Two messages while Bob is offline.
        send_message(&registry, &store, &alice_conn, Some(bob), None, "one".into()).await;
        send_message(&registry, &store, &alice_conn, Some(bob), None, "two".into()).await;
        drain(&mut alice_rx);

        // Bob registers; back-to-back sweeps simulate rapid re-registration.
        flush_pending(&registry, &store, bob).await;
        flush_pending(&registry, &store, bob).await;

        let updates: Vec<_> = drain(&mut alice_rx)
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    ServerEvent::MessageStatusUpdate {
                        status: MessageStatus::Delivered,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(updates.len(), 2, "one delivered update per message, no duplicates");
    }

    #[tokio::test]
    async fn test_group_send_reaches_members_not_sender() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let group = Uuid::new_v4();
        store.add_group(group, &[alice, bob, carol]);

        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (_b, mut bob_rx) = online(&registry, bob).await;
        let (_c, mut carol_rx) = online(&registry, carol).await;

        send_message(&registry, &store, &alice_conn, None, Some(group), "hi".into()).await;

        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::ReceiveMessage { .. }]
        ));
        assert!(matches!(
            drain(&mut carol_rx).as_slice(),
            [ServerEvent::ReceiveMessage { .. }]
        ));
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::MessageSent { .. }]
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_target_rejected() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;

        send_message(&registry, &store, &alice_conn, None, None, "hi".into()).await;

        assert_eq!(store.message_count(), 0);
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::Error { .. }]
        ));
    }

    #[tokio::test]
    async fn test_delivery_acknowledgment_reaches_sender_once() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;
        drain(&mut alice_rx);
        let events = drain(&mut bob_rx);
        let [ServerEvent::ReceiveMessage { message }] = events.as_slice() else {
            panic!("expected receive_message");
        };

        mark_delivered(&registry, &store, &bob_conn, message.id).await;
        // A retried acknowledgment must be a silent no-op.
        mark_delivered(&registry, &store, &bob_conn, message.id).await;

        let updates = drain(&mut alice_rx);
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            updates[0],
            ServerEvent::MessageStatusUpdate {
                status: MessageStatus::Delivered,
                ..
            }
        ));
        assert_eq!(
            store.message_status(message.id),
            Some(MessageStatus::Delivered)
        );
    }

    #[tokio::test]
    async fn test_read_skips_delivered_but_never_regresses() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;
        drain(&mut alice_rx);
        let events = drain(&mut bob_rx);
        let [ServerEvent::ReceiveMessage { message }] = events.as_slice() else {
            panic!("expected receive_message");
        };

        // Read straight from `sent`.
        mark_read(&registry, &store, &bob_conn, message.id).await;
        assert_eq!(store.message_status(message.id), Some(MessageStatus::Read));

        // A late delivery acknowledgment must not regress the status.
        mark_delivered(&registry, &store, &bob_conn, message.id).await;
        assert_eq!(store.message_status(message.id), Some(MessageStatus::Read));

        let updates = drain(&mut alice_rx);
        assert_eq!(updates.len(), 1, "only the read transition notifies");
    }

    #[tokio::test]
    async fn test_mark_all_read_is_idempotent() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (bob_conn, _bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "one".into()).await;
        send_message(&registry, &store, &alice_conn, Some(bob), None, "two".into()).await;
        drain(&mut alice_rx);

        mark_all_read(&registry, &store, &bob_conn, alice).await;
        let events = drain(&mut alice_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::AllMessagesRead { receiver_id }] if *receiver_id == bob
        ));

        // No new messages: the second call is completely silent.
        mark_all_read(&registry, &store, &bob_conn, alice).await;
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_only_sender_may_edit() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;
        drain(&mut alice_rx);
        let events = drain(&mut bob_rx);
        let [ServerEvent::ReceiveMessage { message }] = events.as_slice() else {
            panic!("expected receive_message");
        };

        edit_message(&registry, &store, &bob_conn, message.id, "hacked".into()).await;
        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::Error { .. }]
        ));

        edit_message(&registry, &store, &alice_conn, message.id, "hello".into()).await;
        let events = drain(&mut bob_rx);
        let [ServerEvent::MessageUpdated { message }] = events.as_slice() else {
            panic!("expected message_updated, got {events:?}");
        };
        assert!(message.is_edited);
        assert_eq!(message.content, "hello");
    }

    #[tokio::test]
    async fn test_delete_notifies_both_parties_once() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = online(&registry, alice).await;
        let (_bob_conn, mut bob_rx) = online(&registry, bob).await;

        send_message(&registry, &store, &alice_conn, Some(bob), None, "hi".into()).await;
        let events = drain(&mut alice_rx);
        let [ServerEvent::MessageSent { message }] = events.as_slice() else {
            panic!("expected message_sent");
        };
        drain(&mut bob_rx);

        delete_message(&registry, &store, &alice_conn, message.id).await;
        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::MessageDeleted { .. }]
        ));
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::MessageDeleted { .. }]
        ));

        // Second delete: already gone, actor is told it cannot be deleted.
        delete_message(&registry, &store, &alice_conn, message.id).await;
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_indicator_blocked_pair_suppressed() {
        let registry = Registry::new();
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.add_block(alice, bob);
        let (alice_conn, _alice_rx) = online(&registry, alice).await;
        let (_bob_conn, mut bob_rx) = online(&registry, bob).await;

        relay_indicator(
            &registry,
            &store,
            &alice_conn,
            bob,
            ServerEvent::UserTyping { user_id: alice },
        )
        .await;

        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_blocking_update_relayed_to_target() {
        let registry = Registry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, _alice_rx) = online(&registry, alice).await;
        let (_bob_conn, mut bob_rx) = online(&registry, bob).await;

        relay_blocking_update(&registry, &alice_conn, bob).await;

        assert!(matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::BlockingUpdate { user_id }] if *user_id == alice
        ));
    }
}

//! Presence broadcaster
//!
//! Announce-on-change, not guaranteed delivery: peers that are offline or
//! unreachable simply miss the event and re-sync over REST.

use uuid::Uuid;

use super::events::ServerEvent;
use super::registry::Registry;
use crate::storage::ChatStore;

/// Broadcast a user's online/offline transition to interested peers.
///
/// Interested peers are all currently-registered users except the user
/// themselves and anyone with a block relationship in either direction. A
/// user with presence visibility disabled produces no events at all; the
/// stored online flag is still updated so REST reads stay truthful.
pub async fn announce(registry: &Registry, store: &dyn ChatStore, user_id: Uuid, is_online: bool) {
    if let Err(e) = store.set_online(user_id, is_online).await {
        tracing::error!(error = ?e, user_id = %user_id, "Failed to record online flag");
    }

    match store.shows_online_status(user_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(user_id = %user_id, "Presence broadcast suppressed by visibility setting");
            return;
        }
        Err(e) => {
            tracing::error!(error = ?e, user_id = %user_id, "Failed to read visibility setting");
            return;
        }
    }

    let event = ServerEvent::UserStatus { user_id, is_online };

    for peer in registry.online_users().await {
        if peer == user_id {
            continue;
        }
        match store.block_exists(user_id, peer).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = ?e, "Failed to check block relationship");
                continue;
            }
        }
        if let Some(conn) = registry.lookup(&peer).await {
            let _ = conn.send(event.clone());
        }
    }
}

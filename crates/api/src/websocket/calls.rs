//! Call signaling relay
//!
//! A stateless forwarder: offers, answers, ICE candidates and hang-ups move
//! between two connection handles without the server interpreting them or
//! tracking call state. Call lifecycle correctness belongs to the clients;
//! an offline target means the event vanishes and the caller's own timeout
//! ends the attempt.

use serde_json::Value;
use uuid::Uuid;

use parley_shared::CallKind;

use super::connection::Connection;
use super::events::ServerEvent;
use super::registry::Registry;
use crate::storage::ChatStore;

/// Forward a call offer to the callee, annotated with who is calling.
pub async fn call_user(
    registry: &Registry,
    store: &dyn ChatStore,
    caller: &Connection,
    target_id: Uuid,
    call_type: CallKind,
    signal: Value,
) {
    if target_id == caller.user_id {
        let _ = caller.send(ServerEvent::Error {
            message: "Cannot call yourself".to_string(),
        });
        return;
    }

    match store.block_exists(caller.user_id, target_id).await {
        Ok(true) => {
            // Same privacy property as messages: ringing a blocked pair is
            // dropped without telling the caller why.
            tracing::debug!(
                caller_id = %caller.user_id,
                target_id = %target_id,
                "Dropped call offer due to block relationship"
            );
            return;
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = ?e, "Failed to check block relationship");
            return;
        }
    }

    let Some(target) = registry.lookup(&target_id).await else {
        // Offline callee: the caller keeps ringing until their client-side
        // timeout fires. No server-side timeout exists.
        tracing::debug!(target_id = %target_id, "Call offer dropped, target offline");
        return;
    };

    let from_name = match store.display_name(caller.user_id).await {
        Ok(name) => name,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to load caller display name");
            return;
        }
    };

    tracing::info!(
        caller_id = %caller.user_id,
        target_id = %target_id,
        call_type = %call_type,
        "Relaying call offer"
    );

    let _ = target.send(ServerEvent::CallUser {
        from_user_id: caller.user_id,
        from_name,
        call_type,
        signal,
    });
}

/// Forward the callee's answer back to the caller.
pub async fn answer_call(registry: &Registry, callee: &Connection, target_id: Uuid, signal: Value) {
    let Some(target) = registry.lookup(&target_id).await else {
        tracing::debug!(target_id = %target_id, "Call answer dropped, caller offline");
        return;
    };

    tracing::info!(
        callee_id = %callee.user_id,
        target_id = %target_id,
        "Relaying call answer"
    );

    let _ = target.send(ServerEvent::CallAccepted { signal });
}

/// Forward an ICE candidate to the peer, opaquely.
pub async fn ice_candidate(registry: &Registry, target_id: Uuid, candidate: Value) {
    if let Some(target) = registry.lookup(&target_id).await {
        let _ = target.send(ServerEvent::IceCandidate { candidate });
    }
}

/// Forward a hang-up to the peer; no-op when they are offline.
pub async fn end_call(registry: &Registry, from: &Connection, target_id: Uuid) {
    let Some(target) = registry.lookup(&target_id).await else {
        return;
    };

    tracing::info!(
        from_user_id = %from.user_id,
        target_id = %target_id,
        "Relaying end of call"
    );

    let _ = target.send(ServerEvent::EndCall);
}

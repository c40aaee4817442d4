//! User/session registry
//!
//! Maps each authenticated user to at most one live connection handle. The
//! map is the only shared mutable structure in the coordinator; everything
//! else flows through it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;

/// Registry of live connections, keyed by user id. Last join wins.
#[derive(Default)]
pub struct Registry {
    by_user: RwLock<HashMap<Uuid, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for its user, replacing any prior handle.
    ///
    /// Returns the replaced handle so the caller can close it. The replaced
    /// session's later disconnect must not mark the user offline; see
    /// [`Registry::unregister`].
    pub async fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut by_user = self.by_user.write().await;
        let replaced = by_user.insert(conn.user_id, Arc::clone(&conn));

        tracing::info!(
            user_id = %conn.user_id,
            session_id = %conn.session_id,
            replaced = replaced.is_some(),
            online_users = by_user.len(),
            "Connection registered"
        );

        replaced
    }

    /// Remove the connection owning `session_id`, returning its user id.
    ///
    /// A session that no longer owns its user's entry (it was superseded by
    /// a newer join) is a no-op and returns `None`, as is a session that was
    /// never registered.
    pub async fn unregister(&self, session_id: &Uuid) -> Option<Uuid> {
        let mut by_user = self.by_user.write().await;
        let user_id = by_user
            .iter()
            .find(|(_, conn)| conn.session_id == *session_id)
            .map(|(user_id, _)| *user_id)?;
        by_user.remove(&user_id);

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            online_users = by_user.len(),
            "Connection unregistered"
        );

        Some(user_id)
    }

    /// Look up the live connection handle for a user
    pub async fn lookup(&self, user_id: &Uuid) -> Option<Arc<Connection>> {
        let by_user = self.by_user.read().await;
        by_user.get(user_id).cloned()
    }

    /// Whether a user currently has a live connection
    pub async fn is_online(&self, user_id: &Uuid) -> bool {
        let by_user = self.by_user.read().await;
        by_user.contains_key(user_id)
    }

    /// Snapshot of all currently-registered user ids
    pub async fn online_users(&self) -> Vec<Uuid> {
        let by_user = self.by_user.read().await;
        by_user.keys().copied().collect()
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        let by_user = self.by_user.read().await;
        by_user.len()
    }
}

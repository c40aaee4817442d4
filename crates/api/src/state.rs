//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::storage::{ChatStore, PgChatStore};
use crate::websocket::Registry;

/// State shared by every route and WebSocket connection
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub store: Arc<dyn ChatStore>,
    pub registry: Arc<Registry>,
    pub jwt: JwtManager,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret);
        Self {
            config: Arc::new(config),
            store: Arc::new(PgChatStore::new(pool.clone())),
            pool,
            registry: Arc::new(Registry::new()),
            jwt,
        }
    }
}

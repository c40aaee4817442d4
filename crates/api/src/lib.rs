//! Parley API Library
//!
//! This crate contains the realtime coordinator server for Parley: the
//! WebSocket registry, presence broadcaster, message relay, delivery/read
//! state machine, and call-signaling relay.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

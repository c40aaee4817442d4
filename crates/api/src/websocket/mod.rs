//! WebSocket support: the realtime coordinator
//!
//! Tracks which users are connected, relays chat events with delivery/read
//! state transitions, broadcasts presence, and forwards WebRTC call
//! signaling, enforcing block rules during relay.
//!
//! # Architecture
//!
//! - **Connection**: one authenticated user's live transport session
//! - **Registry**: user id → connection handle, at most one per user
//! - **Events**: type-safe wire vocabulary for client/server communication
//! - **Presence**: online/offline fan-out to interested peers
//! - **Relay**: message send path and the delivery/read state machine
//! - **Calls**: stateless WebRTC signaling forwarder
//! - **Handler**: Axum WebSocket route handler

pub mod calls;
pub mod connection;
pub mod events;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod relay;

pub use handler::ws_handler;
pub use registry::Registry;

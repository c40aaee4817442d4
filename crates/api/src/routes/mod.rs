//! HTTP routes
//!
//! The REST surface of the coordinator is deliberately thin: health probes
//! plus the WebSocket upgrade. Account, conversation-history, and block
//! CRUD live in their own service.

pub mod health;

//! WebSocket event types and serialization
//!
//! The full wire vocabulary of the coordinator, as internally-tagged JSON.
//! Payloads are validated here, at the boundary, before any of them reach
//! the relay; signaling payloads (`signal`, `candidate`) stay opaque
//! `serde_json::Value`s that the server forwards without interpreting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use parley_shared::{CallKind, Message, MessageStatus};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register this connection for the authenticated user
    JoinRoom { user_id: Uuid },

    /// Send a chat message to a user or a group
    SendMessage {
        #[serde(default)]
        receiver_id: Option<Uuid>,
        #[serde(default)]
        group_id: Option<Uuid>,
        content: String,
    },

    /// Receiving client acknowledges receipt of a message
    MessageDelivered { message_id: Uuid },

    /// Receiving client has displayed a message
    MessageRead { message_id: Uuid },

    /// Receiving client opened the conversation; mark everything from
    /// `sender_id` as read
    MarkAllRead { sender_id: Uuid },

    /// Replace the content of a previously sent message
    EditMessage { message_id: Uuid, content: String },

    /// Soft-delete a previously sent message
    DeleteMessage { message_id: Uuid },

    /// Typing indicator for a direct conversation
    UserTyping { receiver_id: Uuid },
    UserStopTyping { receiver_id: Uuid },

    /// Voice-note recording indicator for a direct conversation
    UserRecording { receiver_id: Uuid },
    UserStopRecording { receiver_id: Uuid },

    /// Block list changed; tell the affected peer to re-fetch it
    BlockingUpdate { target_id: Uuid },

    /// Start a call: forward the WebRTC offer to the callee
    CallUser {
        target_id: Uuid,
        signal: Value,
        call_type: CallKind,
    },

    /// Answer a call: forward the WebRTC answer to the caller
    AnswerCall { target_id: Uuid, signal: Value },

    /// Trickle an ICE candidate to the peer
    IceCandidate { target_id: Uuid, candidate: Value },

    /// Hang up
    EndCall { target_id: Uuid },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New message for this client
    ReceiveMessage { message: Message },

    /// Echo of a message this user sent (multi-device sync)
    MessageSent { message: Message },

    /// A message this user sent advanced to `delivered` or `read`
    MessageStatusUpdate {
        message_id: Uuid,
        status: MessageStatus,
    },

    /// Everything this user sent to `receiver_id` is now read
    AllMessagesRead { receiver_id: Uuid },

    /// A message in one of this user's conversations was edited
    MessageUpdated { message: Message },

    /// A message in one of this user's conversations was deleted
    MessageDeleted { message_id: Uuid },

    /// Peer typing/recording indicators
    UserTyping { user_id: Uuid },
    UserStopTyping { user_id: Uuid },
    UserRecording { user_id: Uuid },
    UserStopRecording { user_id: Uuid },

    /// Presence transition of a peer
    UserStatus { user_id: Uuid, is_online: bool },

    /// A peer changed their block list with respect to this user
    BlockingUpdate { user_id: Uuid },

    /// Incoming call offer
    CallUser {
        from_user_id: Uuid,
        from_name: String,
        call_type: CallKind,
        signal: Value,
    },

    /// The callee answered
    CallAccepted { signal: Value },

    /// ICE candidate from the peer
    IceCandidate { candidate: Value },

    /// The peer hung up
    EndCall,

    /// Error message
    Error { message: String },

    /// Connection acknowledged
    Connected { session_id: Uuid },
}

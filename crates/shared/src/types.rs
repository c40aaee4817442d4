//! Common types used across Parley

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Message Status State Machine
// =============================================================================

/// Delivery status of a direct message.
///
/// Status only ever moves forward: `Sent → Delivered → Read`. Every
/// transition in the system goes through [`MessageStatus::advance`]; handlers
/// never assign a status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Sent
    }
}

/// A requested status change that would regress or repeat the current status.
///
/// Callers treat this as "nothing to do", not a failure: acknowledgments are
/// retried by clients and must stay idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid message status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: MessageStatus,
    pub to: MessageStatus,
}

impl MessageStatus {
    /// Central transition table for the delivery state machine.
    ///
    /// Returns the new status for a legal forward move, or
    /// [`InvalidTransition`] for anything that would repeat or regress.
    pub fn advance(self, requested: MessageStatus) -> Result<MessageStatus, InvalidTransition> {
        use MessageStatus::*;
        match (self, requested) {
            (Sent, Delivered) | (Sent, Read) | (Delivered, Read) => Ok(requested),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

// =============================================================================
// Call Types
// =============================================================================

/// Media kind of a call attempt. The server never inspects the media itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Chat message model.
///
/// `content` is an opaque ciphertext blob as far as the server is concerned;
/// clients encrypt before sending. Exactly one of `receiver_id` / `group_id`
/// is set. Deletion is a soft delete via `deleted_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub content: String,
    pub status: MessageStatus,
    pub is_edited: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Payload for persisting a new message, before an id and timestamps exist.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub content: String,
}

impl NewMessage {
    /// New direct message addressed to a single user.
    pub fn direct(sender_id: Uuid, receiver_id: Uuid, content: String) -> Self {
        Self {
            sender_id,
            receiver_id: Some(receiver_id),
            group_id: None,
            content,
        }
    }

    /// New message addressed to a group.
    pub fn group(sender_id: Uuid, group_id: Uuid, content: String) -> Self {
        Self {
            sender_id,
            receiver_id: None,
            group_id: Some(group_id),
            content,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

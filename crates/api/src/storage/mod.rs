//! Storage boundary for the realtime coordinator
//!
//! The relay never embeds SQL: everything it needs from persistence goes
//! through [`ChatStore`]. The production implementation is
//! [`postgres::PgChatStore`]; tests exercise the relay against an in-memory
//! implementation with the same guarded-update semantics.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use parley_shared::{Message, MessageStatus, NewMessage, StoreError};

pub use postgres::PgChatStore;

/// Persistence operations required by the relay and presence broadcaster.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persist a new message with initial status `sent`.
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// Advance a message's status on behalf of its receiver.
    ///
    /// The update is guarded: it applies only when the stored status can
    /// legally advance to `requested` and `receiver_id` is the addressee.
    /// Returns the updated message, or `None` when the guard rejected the
    /// change (already advanced, regressing, or not the receiver). Guarding
    /// in the store is what keeps concurrent acknowledgments and pending
    /// sweeps down to one effective transition per message.
    async fn advance_message_status(
        &self,
        message_id: Uuid,
        receiver_id: Uuid,
        requested: MessageStatus,
    ) -> Result<Option<Message>, StoreError>;

    /// All direct messages addressed to `user_id` still in status `sent`.
    async fn pending_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Bulk-advance every unread message from `sender_id` to `receiver_id`
    /// to `read`. Returns the number of messages that changed.
    async fn mark_conversation_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Replace a message's content. Applies only when `editor_id` is the
    /// sender and the message is not deleted; returns `None` otherwise.
    async fn edit_message(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        content: String,
    ) -> Result<Option<Message>, StoreError>;

    /// Soft-delete a message. Applies only when `owner_id` is the sender;
    /// returns `None` otherwise. Idempotent: a second delete is a no-op.
    async fn delete_message(
        &self,
        message_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Message>, StoreError>;

    /// Whether a block relationship exists between two users, in either
    /// direction.
    async fn block_exists(&self, a: Uuid, b: Uuid) -> Result<bool, StoreError>;

    /// Member user ids of a group.
    async fn group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Display name for call annotations.
    async fn display_name(&self, user_id: Uuid) -> Result<String, StoreError>;

    /// Whether the user has presence visibility enabled.
    async fn shows_online_status(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Record the online flag and bump last-seen for REST reads.
    async fn set_online(&self, user_id: Uuid, online: bool) -> Result<(), StoreError>;
}

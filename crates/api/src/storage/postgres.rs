//! Postgres implementation of the storage boundary

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use parley_shared::{Message, MessageStatus, NewMessage, StoreError};

use super::ChatStore;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, group_id, content, status, is_edited, deleted_at, created_at";

/// [`ChatStore`] backed by Postgres.
///
/// Status transitions are enforced inside the UPDATE statements themselves,
/// so two concurrent acknowledgments (or pending sweeps racing a fresh
/// register) collapse to a single effective transition.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, group_id, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(new.group_id)
        .bind(new.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn advance_message_status(
        &self,
        message_id: Uuid,
        receiver_id: Uuid,
        requested: MessageStatus,
    ) -> Result<Option<Message>, StoreError> {
        // Same transition table as MessageStatus::advance, expressed as the
        // UPDATE guard so the check and the write are one atomic statement.
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET status = $3
            WHERE id = $1
              AND receiver_id = $2
              AND deleted_at IS NULL
              AND (
                (status = 'sent' AND $3 IN ('delivered', 'read'))
                OR (status = 'delivered' AND $3 = 'read')
              )
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(message_id)
        .bind(receiver_id)
        .bind(requested)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn pending_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE receiver_id = $1 AND status = 'sent' AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn mark_conversation_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'read'
            WHERE sender_id = $1
              AND receiver_id = $2
              AND status <> 'read'
              AND deleted_at IS NULL
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn edit_message(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        content: String,
    ) -> Result<Option<Message>, StoreError> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET content = $3, is_edited = TRUE
            WHERE id = $1 AND sender_id = $2 AND deleted_at IS NULL
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(message_id)
        .bind(editor_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Message>, StoreError> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET deleted_at = NOW()
            WHERE id = $1 AND sender_id = $2 AND deleted_at IS NULL
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(message_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn block_exists(&self, a: Uuid, b: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
              SELECT 1 FROM blocks
              WHERE (blocker_id = $1 AND blocked_id = $2)
                 OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let members =
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM group_members WHERE group_id = $1")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(members)
    }

    async fn display_name(&self, user_id: Uuid) -> Result<String, StoreError> {
        // Missing rows fall back to a placeholder rather than failing the
        // call attempt.
        let name =
            sqlx::query_scalar::<_, String>("SELECT display_name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(name.unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn shows_online_status(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let visible =
            sqlx::query_scalar::<_, bool>("SELECT show_online_status FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(visible.unwrap_or(true))
    }

    async fn set_online(&self, user_id: Uuid, online: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET is_online = $2, last_seen_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(online)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

//! In-memory storage used by relay tests
//!
//! Mirrors the Postgres implementation's guarded-update semantics so the
//! relay's idempotence properties can be exercised without a database.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use parley_shared::{Message, MessageStatus, NewMessage, StoreError};

use super::ChatStore;

#[derive(Default)]
struct UserRecord {
    display_name: String,
    show_online_status: bool,
    is_online: bool,
}

#[derive(Default)]
struct Inner {
    // Insertion order doubles as created_at order
    messages: Vec<Message>,
    blocks: HashSet<(Uuid, Uuid)>,
    groups: HashMap<Uuid, Vec<Uuid>>,
    users: HashMap<Uuid, UserRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: Uuid, display_name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(
            id,
            UserRecord {
                display_name: display_name.to_string(),
                show_online_status: true,
                is_online: false,
            },
        );
    }

    pub fn hide_online_status(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&id) {
            user.show_online_status = false;
        }
    }

    pub fn add_block(&self, blocker: Uuid, blocked: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.blocks.insert((blocker, blocked));
    }

    pub fn add_group(&self, group_id: Uuid, members: &[Uuid]) {
        let mut inner = self.inner.lock().unwrap();
        inner.groups.insert(group_id, members.to_vec());
    }

    pub fn message_status(&self, message_id: Uuid) -> Option<MessageStatus> {
        let inner = self.inner.lock().unwrap();
        inner
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.status)
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.users.get(&user_id).map(|u| u.is_online).unwrap_or(false)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            group_id: new.group_id,
            content: new.content,
            status: MessageStatus::Sent,
            is_edited: false,
            deleted_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn advance_message_status(
        &self,
        message_id: Uuid,
        receiver_id: Uuid,
        requested: MessageStatus,
    ) -> Result<Option<Message>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(message) = inner.messages.iter_mut().find(|m| {
            m.id == message_id && m.receiver_id == Some(receiver_id) && m.deleted_at.is_none()
        }) else {
            return Ok(None);
        };
        match message.status.advance(requested) {
            Ok(next) => {
                message.status = next;
                Ok(Some(message.clone()))
            }
            Err(_) => Ok(None),
        }
    }

    async fn pending_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .iter()
            .filter(|m| {
                m.receiver_id == Some(user_id)
                    && m.status == MessageStatus::Sent
                    && m.deleted_at.is_none()
            })
            .cloned()
            .collect())
    }

    async fn mark_conversation_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0u64;
        for message in inner.messages.iter_mut().filter(|m| {
            m.sender_id == sender_id
                && m.receiver_id == Some(receiver_id)
                && m.status != MessageStatus::Read
                && m.deleted_at.is_none()
        }) {
            message.status = MessageStatus::Read;
            changed += 1;
        }
        Ok(changed)
    }

    async fn edit_message(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        content: String,
    ) -> Result<Option<Message>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender_id == editor_id && m.deleted_at.is_none())
        else {
            return Ok(None);
        };
        message.content = content;
        message.is_edited = true;
        Ok(Some(message.clone()))
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Message>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(message) = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender_id == owner_id && m.deleted_at.is_none())
        else {
            return Ok(None);
        };
        message.deleted_at = Some(OffsetDateTime::now_utc());
        Ok(Some(message.clone()))
    }

    async fn block_exists(&self, a: Uuid, b: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.contains(&(a, b)) || inner.blocks.contains(&(b, a)))
    }

    async fn group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.groups.get(&group_id).cloned().unwrap_or_default())
    }

    async fn display_name(&self, user_id: Uuid) -> Result<String, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .get(&user_id)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn shows_online_status(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .get(&user_id)
            .map(|u| u.show_online_status)
            .unwrap_or(true))
    }

    async fn set_online(&self, user_id: Uuid, online: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.is_online = online;
        }
        Ok(())
    }
}

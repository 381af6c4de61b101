//! In-memory message store for tests

use async_trait::async_trait;
use atendo_shared::{CoreError, CoreResult, Message, Reaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::MessageStore;

#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<Mutex<HashMap<Uuid, Message>>>,
    /// (message_id, user_id) -> reaction
    reactions: Arc<Mutex<HashMap<(Uuid, Uuid), Reaction>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: Message) -> CoreResult<Message> {
        self.messages
            .lock()
            .await
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Message> {
        self.messages
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("message {id}")))
    }

    async fn feed(&self, conversation_id: Uuid) -> CoreResult<Vec<Message>> {
        let mut rows: Vec<Message> = self
            .messages
            .lock()
            .await
            .values()
            .filter(|m| m.conversation_id == conversation_id && !m.deleted)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn soft_delete(&self, id: Uuid) -> CoreResult<u64> {
        let mut messages = self.messages.lock().await;
        match messages.get_mut(&id) {
            Some(m) if !m.deleted => {
                m.deleted = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn reaction_for(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<Option<Reaction>> {
        Ok(self
            .reactions
            .lock()
            .await
            .get(&(message_id, user_id))
            .cloned())
    }

    async fn insert_reaction(&self, reaction: Reaction) -> CoreResult<()> {
        self.reactions
            .lock()
            .await
            .insert((reaction.message_id, reaction.user_id), reaction);
        Ok(())
    }

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        self.reactions.lock().await.remove(&(message_id, user_id));
        Ok(())
    }
}

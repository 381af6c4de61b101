//! In-memory conversation store
//!
//! Backs the assignment tests. Every method takes the single map lock for
//! its full duration, so `claim_pending` has the same compare-and-swap
//! semantics as the conditional UPDATE in the Postgres implementation.

use async_trait::async_trait;
use atendo_shared::{
    Conversation, ConversationMode, ConversationStatus, CoreError, CoreResult, UserRole,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{ConversationStore, NewConversation};

#[derive(Clone, Default)]
pub struct MemoryConversationStore {
    conversations: Arc<Mutex<HashMap<Uuid, Conversation>>>,
    roles: Arc<Mutex<HashMap<Uuid, UserRole>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user the store can answer role lookups for
    pub async fn add_user(&self, user_id: Uuid, role: UserRole) {
        self.roles.lock().await.insert(user_id, role);
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, id: Uuid) -> CoreResult<Conversation> {
        self.conversations
            .lock()
            .await
            .get(&id)
            .filter(|c| !c.deleted)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))
    }

    async fn insert(&self, conversation: NewConversation) -> CoreResult<Conversation> {
        let now = OffsetDateTime::now_utc();
        let row = Conversation {
            id: conversation.id,
            protocol_number: conversation.protocol_number,
            status: ConversationStatus::Pending,
            mode: conversation.mode,
            client_id: conversation.client_id,
            attendant_id: None,
            last_message: None,
            last_message_at: None,
            deleted: false,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        self.conversations.lock().await.insert(row.id, row.clone());
        Ok(row)
    }

    async fn claim_pending(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<u64> {
        let mut conversations = self.conversations.lock().await;
        match conversations.get_mut(&id) {
            Some(c) if !c.deleted && c.status == ConversationStatus::Pending => {
                c.status = ConversationStatus::Attending;
                c.attendant_id = Some(attendant_id);
                c.updated_at = OffsetDateTime::now_utc();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        closed_at: Option<OffsetDateTime>,
        clear_attendant: bool,
    ) -> CoreResult<()> {
        let mut conversations = self.conversations.lock().await;
        let c = conversations
            .get_mut(&id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;
        c.status = status;
        c.closed_at = closed_at;
        if clear_attendant {
            c.attendant_id = None;
        }
        c.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn assign_attendant(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<()> {
        let mut conversations = self.conversations.lock().await;
        let c = conversations
            .get_mut(&id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;
        c.attendant_id = Some(attendant_id);
        c.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_mode(&self, id: Uuid, mode: ConversationMode) -> CoreResult<()> {
        if let Some(c) = self.conversations.lock().await.get_mut(&id) {
            c.mode = mode;
            c.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn touch_last_message(
        &self,
        id: Uuid,
        preview: &str,
        at: OffsetDateTime,
    ) -> CoreResult<()> {
        if let Some(c) = self.conversations.lock().await.get_mut(&id) {
            c.last_message = Some(preview.to_string());
            c.last_message_at = Some(at);
            c.updated_at = at;
        }
        Ok(())
    }

    async fn user_role(&self, user_id: Uuid) -> CoreResult<UserRole> {
        self.roles
            .lock()
            .await
            .get(&user_id)
            .copied()
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))
    }
}

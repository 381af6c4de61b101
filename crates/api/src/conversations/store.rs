//! Durable conversation storage
//!
//! The service talks to storage through `ConversationStore` so the
//! assignment logic can be exercised against the in-memory implementation
//! in tests. `claim_pending` is the single conditional write in the
//! system; everything else is a plain last-writer-wins update.

use async_trait::async_trait;
use atendo_shared::{
    Conversation, ConversationMode, ConversationStatus, CoreError, CoreResult, UserRole,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fields for inserting a conversation
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub id: Uuid,
    pub protocol_number: String,
    pub client_id: Uuid,
    pub mode: ConversationMode,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation; soft-deleted rows count as not found
    async fn get(&self, id: Uuid) -> CoreResult<Conversation>;

    async fn insert(&self, conversation: NewConversation) -> CoreResult<Conversation>;

    /// The claim hot path: one conditional update equivalent to
    /// `SET status='attending', attendant_id=$2 WHERE id=$1 AND
    /// status='pending'`, reporting how many rows changed. A
    /// read-then-write here would let two attendants win the same
    /// conversation.
    async fn claim_pending(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<u64>;

    /// Plain status update for close / reopen / unassign
    async fn update_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        closed_at: Option<OffsetDateTime>,
        clear_attendant: bool,
    ) -> CoreResult<()>;

    /// Unconditional reassignment (transfer)
    async fn assign_attendant(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<()>;

    async fn set_mode(&self, id: Uuid, mode: ConversationMode) -> CoreResult<()>;

    /// Refresh the denormalized last-message cache
    async fn touch_last_message(
        &self,
        id: Uuid,
        preview: &str,
        at: OffsetDateTime,
    ) -> CoreResult<()>;

    /// Role lookup for transfer-target and mode-flip checks
    async fn user_role(&self, user_id: Uuid) -> CoreResult<UserRole>;
}

// =============================================================================
// Postgres implementation
// =============================================================================

#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONVERSATION_COLUMNS: &str = "id, protocol_number, status, mode, client_id, attendant_id, \
     last_message, last_message_at, deleted, created_at, updated_at, closed_at";

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn get(&self, id: Uuid) -> CoreResult<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 AND NOT deleted"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?;

        Ok(conversation)
    }

    async fn insert(&self, conversation: NewConversation) -> CoreResult<Conversation> {
        let row = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (id, protocol_number, status, mode, client_id)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(conversation.id)
        .bind(&conversation.protocol_number)
        .bind(conversation.mode)
        .bind(conversation.client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn claim_pending(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'attending', attendant_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND NOT deleted
            "#,
        )
        .bind(id)
        .bind(attendant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        closed_at: Option<OffsetDateTime>,
        clear_attendant: bool,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = $2,
                closed_at = $3,
                attendant_id = CASE WHEN $4 THEN NULL ELSE attendant_id END,
                updated_at = NOW()
            WHERE id = $1 AND NOT deleted
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(closed_at)
        .bind(clear_attendant)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn assign_attendant(&self, id: Uuid, attendant_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE conversations SET attendant_id = $2, updated_at = NOW() \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(attendant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn set_mode(&self, id: Uuid, mode: ConversationMode) -> CoreResult<()> {
        sqlx::query(
            "UPDATE conversations SET mode = $2, updated_at = NOW() WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(mode)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_last_message(
        &self,
        id: Uuid,
        preview: &str,
        at: OffsetDateTime,
    ) -> CoreResult<()> {
        sqlx::query(
            "UPDATE conversations SET last_message = $2, last_message_at = $3, updated_at = NOW() \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(preview)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_role(&self, user_id: Uuid) -> CoreResult<UserRole> {
        let role = sqlx::query_scalar::<_, UserRole>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))?;

        Ok(role)
    }
}

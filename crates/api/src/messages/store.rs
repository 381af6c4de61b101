//! Durable message and reaction storage

use async_trait::async_trait;
use atendo_shared::{CoreError, CoreResult, Message, Reaction};
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: Message) -> CoreResult<Message>;

    /// Fetch by id, soft-deleted rows included, so replies and forwards
    /// that reference a deleted message still resolve
    async fn get(&self, id: Uuid) -> CoreResult<Message>;

    /// The live feed: creation order ascending, ties broken by id,
    /// soft-deleted rows excluded
    async fn feed(&self, conversation_id: Uuid) -> CoreResult<Vec<Message>>;

    /// Flip the deleted flag; returns affected rows (0 when the message is
    /// missing or already deleted)
    async fn soft_delete(&self, id: Uuid) -> CoreResult<u64>;

    async fn reaction_for(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<Option<Reaction>>;

    async fn insert_reaction(&self, reaction: Reaction) -> CoreResult<()>;

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<()>;
}

// =============================================================================
// Postgres implementation
// =============================================================================

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, kind, content, media_url, \
     media_name, reply_to_id, forwarded_from_id, deleted, created_at";

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, message: Message) -> CoreResult<Message> {
        let row = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, kind, content, media_url, media_name,
                 reply_to_id, forwarded_from_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.kind)
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(&message.media_name)
        .bind(message.reply_to_id)
        .bind(message.forwarded_from_id)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Message> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("message {id}")))
    }

    async fn feed(&self, conversation_id: Uuid) -> CoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND NOT deleted \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn soft_delete(&self, id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("UPDATE messages SET deleted = TRUE WHERE id = $1 AND NOT deleted")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn reaction_for(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<Option<Reaction>> {
        let reaction = sqlx::query_as::<_, Reaction>(
            "SELECT message_id, user_id, emoji, created_at FROM reactions \
             WHERE message_id = $1 AND user_id = $2",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reaction)
    }

    async fn insert_reaction(&self, reaction: Reaction) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reactions (message_id, user_id, emoji, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (message_id, user_id)
            DO UPDATE SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(reaction.message_id)
        .bind(reaction.user_id)
        .bind(&reaction.emoji)
        .bind(reaction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_reaction(&self, message_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM reactions WHERE message_id = $1 AND user_id = $2")
            .bind(message_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

//! Common types used across Atendo

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Role of a platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Attendant,
    Admin,
}

impl UserRole {
    /// Attendants and admins act on behalf of the business
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Attendant | Self::Admin)
    }
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Attending,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attending => "attending",
            Self::Closed => "closed",
        }
    }

    /// Valid next states from this state.
    ///
    /// `pending -> attending` is reserved for the claim operation and is
    /// deliberately absent here; `change_status` handles the rest.
    pub fn valid_status_changes(&self) -> &'static [ConversationStatus] {
        match self {
            Self::Pending => &[],
            Self::Attending => &[Self::Closed, Self::Pending],
            Self::Closed => &[Self::Attending],
        }
    }

    pub fn can_change_to(&self, next: ConversationStatus) -> bool {
        self.valid_status_changes().contains(&next)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is currently answering the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ConversationMode {
    AiAgent,
    Attendant,
}

/// Media type of a message, matched exhaustively everywhere it is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    File,
}

/// How the dispatcher authenticates against a webhook subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuthMode {
    None,
    Bearer,
    Jwt,
    ApiKey,
}

/// Event names carried in outbound webhook envelopes.
///
/// Subscriptions store the names they opted into as plain text, so the set
/// a subscriber may reference is open-ended; this enum covers the events
/// this service emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "conversation.created")]
    ConversationCreated,
    #[serde(rename = "conversation.assigned")]
    ConversationAssigned,
    #[serde(rename = "conversation.closed")]
    ConversationClosed,
    #[serde(rename = "conversation.reopened")]
    ConversationReopened,
    #[serde(rename = "conversation.transferred")]
    ConversationTransferred,
    #[serde(rename = "conversation.updated")]
    ConversationUpdated,
    #[serde(rename = "conversation.deleted")]
    ConversationDeleted,
    #[serde(rename = "message.created")]
    MessageCreated,
    #[serde(rename = "message.forwarded")]
    MessageForwarded,
    #[serde(rename = "message.sent")]
    MessageSent,
    #[serde(rename = "message.deleted")]
    MessageDeleted,
    #[serde(rename = "reaction.added")]
    ReactionAdded,
    #[serde(rename = "reaction.removed")]
    ReactionRemoved,
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "user.deleted")]
    UserDeleted,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationCreated => "conversation.created",
            Self::ConversationAssigned => "conversation.assigned",
            Self::ConversationClosed => "conversation.closed",
            Self::ConversationReopened => "conversation.reopened",
            Self::ConversationTransferred => "conversation.transferred",
            Self::ConversationUpdated => "conversation.updated",
            Self::ConversationDeleted => "conversation.deleted",
            Self::MessageCreated => "message.created",
            Self::MessageForwarded => "message.forwarded",
            Self::MessageSent => "message.sent",
            Self::MessageDeleted => "message.deleted",
            Self::ReactionAdded => "reaction.added",
            Self::ReactionRemoved => "reaction.removed",
            Self::UserCreated => "user.created",
            Self::UserUpdated => "user.updated",
            Self::UserDeleted => "user.deleted",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A client <-> attendant support thread
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    /// Human-readable identifier, immutable once assigned
    pub protocol_number: String,
    pub status: ConversationStatus,
    pub mode: ConversationMode,
    pub client_id: Uuid,
    pub attendant_id: Option<Uuid>,
    /// Denormalized cache of the newest non-deleted message
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
}

impl Conversation {
    /// The users who receive live updates for this conversation
    pub fn participants(&self) -> Vec<Uuid> {
        match self.attendant_id {
            Some(attendant_id) if attendant_id != self.client_id => {
                vec![self.client_id, attendant_id]
            }
            _ => vec![self.client_id],
        }
    }
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
    pub media_url: Option<String>,
    pub media_name: Option<String>,
    /// Must reference a message in the same conversation
    pub reply_to_id: Option<Uuid>,
    /// Captured at forward time; may reference any conversation
    pub forwarded_from_id: Option<Uuid>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// At most one reaction per (message, user)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A configured external endpoint plus the event names it wants.
///
/// Edited out of band; read-only from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub auth_mode: WebhookAuthMode,
    pub auth_token: Option<String>,
    /// Static headers merged into every outbound request
    pub headers: Json<HashMap<String, String>>,
    /// Subscribed event names
    pub events: Vec<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl WebhookSubscription {
    pub fn wants(&self, event: WebhookEvent) -> bool {
        self.events.iter().any(|name| name == event.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_change_validity() {
        use ConversationStatus::*;

        // Claiming is not a status change
        assert!(!Pending.can_change_to(Attending));

        assert!(Attending.can_change_to(Closed));
        assert!(Attending.can_change_to(Pending)); // unassign
        assert!(Closed.can_change_to(Attending)); // reopen

        assert!(!Closed.can_change_to(Pending));
        assert!(!Pending.can_change_to(Closed));
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&ConversationMode::AiAgent).unwrap();
        assert_eq!(json, r#""ai-agent""#);
        let mode: ConversationMode = serde_json::from_str(r#""attendant""#).unwrap();
        assert_eq!(mode, ConversationMode::Attendant);
    }

    #[test]
    fn test_webhook_event_names() {
        assert_eq!(WebhookEvent::ConversationAssigned.as_str(), "conversation.assigned");
        assert_eq!(WebhookEvent::ReactionRemoved.as_str(), "reaction.removed");
        let json = serde_json::to_string(&WebhookEvent::MessageForwarded).unwrap();
        assert_eq!(json, r#""message.forwarded""#);
    }

    #[test]
    fn test_participants_dedup() {
        let now = OffsetDateTime::now_utc();
        let client = Uuid::new_v4();
        let mut conv = Conversation {
            id: Uuid::new_v4(),
            protocol_number: "20250101000000".to_string(),
            status: ConversationStatus::Pending,
            mode: ConversationMode::Attendant,
            client_id: client,
            attendant_id: None,
            last_message: None,
            last_message_at: None,
            deleted: false,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        assert_eq!(conv.participants(), vec![client]);

        let attendant = Uuid::new_v4();
        conv.attendant_id = Some(attendant);
        assert_eq!(conv.participants(), vec![client, attendant]);
    }
}

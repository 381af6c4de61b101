//! Live-update event types and serialization
//!
//! Both directions use the `{"type": ..., "payload": ...}` envelope;
//! unit variants omit the payload.

use atendo_shared::{Conversation, ConversationStatus, Message, Reaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events accepted from clients. Anything else on the wire is answered
/// with an `error` envelope and otherwise ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Liveness keep-alive; the server replies with `pong`
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events pushed to clients
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Connection acknowledged
    #[serde(rename = "connected")]
    Connected { session_id: Uuid },

    /// A conversation was created
    #[serde(rename = "conversation:new")]
    ConversationNew { conversation: Conversation },

    /// Conversation attributes changed (assignment, mode, transfer)
    #[serde(rename = "conversation:update")]
    ConversationUpdate { conversation: Conversation },

    /// Conversation lifecycle status changed
    #[serde(rename = "conversation:status")]
    ConversationStatus {
        conversation_id: Uuid,
        status: ConversationStatus,
        attendant_id: Option<Uuid>,
    },

    /// New message appended to a conversation
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    /// Reaction toggled; `reaction` is null when one was removed
    #[serde(rename = "reaction:new")]
    ReactionNew {
        conversation_id: Uuid,
        message_id: Uuid,
        reaction: Option<Reaction>,
    },

    /// A referenced user's profile changed
    #[serde(rename = "user:update")]
    UserUpdate { user_id: Uuid },

    /// Keep-alive response
    #[serde(rename = "pong")]
    Pong,

    /// Protocol-level error report
    #[serde(rename = "error")]
    Error { message: String },
}

//! Thread service
//!
//! Validates and applies message mutations, keeps the owning
//! conversation's denormalized cache fresh, and emits the resulting events
//! to participants and webhook subscribers.

use atendo_shared::{
    ConversationMode, CoreError, CoreResult, Message, MessageKind, Reaction, WebhookEvent,
};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::conversations::ConversationStore;
use crate::realtime::{Notifier, ServerEvent};
use crate::webhooks::WebhookDispatcher;

use super::store::MessageStore;

/// Fields accepted for a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
    pub media_url: Option<String>,
    pub media_name: Option<String>,
    pub reply_to_id: Option<Uuid>,
    pub forwarded_from_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ThreadService {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    notifier: Notifier,
    webhooks: WebhookDispatcher,
}

fn message_snapshot(message: &Message) -> serde_json::Value {
    serde_json::to_value(message).unwrap_or(serde_json::Value::Null)
}

impl ThreadService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        notifier: Notifier,
        webhooks: WebhookDispatcher,
    ) -> Self {
        Self {
            messages,
            conversations,
            notifier,
            webhooks,
        }
    }

    /// Append a message to a conversation
    pub async fn append(&self, new: NewMessage) -> CoreResult<Message> {
        let conversation = self.conversations.get(new.conversation_id).await?;

        // A reply must point at a message in the same conversation; the
        // target may be soft-deleted and still resolves
        if let Some(reply_to_id) = new.reply_to_id {
            let target = self.messages.get(reply_to_id).await.map_err(|_| {
                CoreError::Validation(format!("reply target {reply_to_id} does not exist"))
            })?;
            if target.conversation_id != new.conversation_id {
                return Err(CoreError::Validation(
                    "reply target belongs to another conversation".to_string(),
                ));
            }
        }

        // A forward source may live in any conversation but must exist
        if let Some(forwarded_from_id) = new.forwarded_from_id {
            self.messages.get(forwarded_from_id).await.map_err(|_| {
                CoreError::Validation(format!(
                    "forward source {forwarded_from_id} does not exist"
                ))
            })?;
        }

        let message = self
            .messages
            .insert(Message {
                id: Uuid::new_v4(),
                conversation_id: new.conversation_id,
                sender_id: new.sender_id,
                kind: new.kind,
                content: new.content,
                media_url: new.media_url,
                media_name: new.media_name,
                reply_to_id: new.reply_to_id,
                forwarded_from_id: new.forwarded_from_id,
                deleted: false,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        // The first human answer takes the conversation out of ai-agent
        // mode; this runs only once the message is durably stored
        if conversation.mode == ConversationMode::AiAgent {
            let sender_role = self.conversations.user_role(message.sender_id).await?;
            if sender_role.is_staff() {
                self.conversations
                    .set_mode(message.conversation_id, ConversationMode::Attendant)
                    .await?;
                tracing::info!(
                    conversation_id = %message.conversation_id,
                    sender_id = %message.sender_id,
                    "Conversation switched to attendant mode"
                );
            }
        }

        self.conversations
            .touch_last_message(new.conversation_id, &message.content, message.created_at)
            .await?;

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::MessageNew {
                message: message.clone(),
            },
        );

        self.webhooks
            .trigger(WebhookEvent::MessageCreated, message_snapshot(&message));
        if message.forwarded_from_id.is_some() {
            self.webhooks
                .trigger(WebhookEvent::MessageForwarded, message_snapshot(&message));
        } else {
            self.webhooks
                .trigger(WebhookEvent::MessageSent, message_snapshot(&message));
        }

        Ok(message)
    }

    /// Fetch a single message by id, deleted rows included
    pub async fn get(&self, message_id: Uuid) -> CoreResult<Message> {
        self.messages.get(message_id).await
    }

    /// Hide a message from the live feed while keeping the row resolvable
    /// for replies and forwards that reference it
    pub async fn soft_delete(&self, message_id: Uuid) -> CoreResult<()> {
        let message = self.messages.get(message_id).await?;
        if self.messages.soft_delete(message_id).await? == 0 {
            return Err(CoreError::NotFound(format!("message {message_id}")));
        }

        tracing::info!(
            message_id = %message_id,
            conversation_id = %message.conversation_id,
            "Message soft-deleted"
        );

        // Id and conversation only; content stays out of webhook payloads
        self.webhooks.trigger(
            WebhookEvent::MessageDeleted,
            json!({
                "id": message.id,
                "conversation_id": message.conversation_id,
            }),
        );

        Ok(())
    }

    /// Toggle a user's reaction on a message: same emoji removes it, a
    /// different emoji replaces it, none adds it. Returns the resulting
    /// reaction, `None` after a removal.
    pub async fn toggle_reaction(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> CoreResult<Option<Reaction>> {
        let message = self.messages.get(message_id).await?;
        if message.deleted {
            return Err(CoreError::NotFound(format!("message {message_id}")));
        }
        let conversation = self.conversations.get(message.conversation_id).await?;

        let existing = self.messages.reaction_for(message_id, user_id).await?;
        let result = match existing {
            Some(previous) if previous.emoji == emoji => {
                self.messages.delete_reaction(message_id, user_id).await?;
                self.webhooks.trigger(
                    WebhookEvent::ReactionRemoved,
                    json!({
                        "message_id": message_id,
                        "conversation_id": message.conversation_id,
                        "user_id": user_id,
                        "emoji": previous.emoji,
                    }),
                );
                None
            }
            _ => {
                // Replace keeps the one-reaction-per-user invariant
                if existing.is_some() {
                    self.messages.delete_reaction(message_id, user_id).await?;
                }
                let reaction = Reaction {
                    message_id,
                    user_id,
                    emoji: emoji.to_string(),
                    created_at: OffsetDateTime::now_utc(),
                };
                self.messages.insert_reaction(reaction.clone()).await?;
                self.webhooks.trigger(
                    WebhookEvent::ReactionAdded,
                    json!({
                        "message_id": message_id,
                        "conversation_id": message.conversation_id,
                        "user_id": user_id,
                        "emoji": reaction.emoji,
                    }),
                );
                Some(reaction)
            }
        };

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::ReactionNew {
                conversation_id: message.conversation_id,
                message_id,
                reaction: result.clone(),
            },
        );

        Ok(result)
    }

    /// The conversation's live feed
    pub async fn feed(&self, conversation_id: Uuid) -> CoreResult<Vec<Message>> {
        // 404 for unknown conversations rather than an empty feed
        self.conversations.get(conversation_id).await?;
        self.messages.feed(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::{MemoryConversationStore, NewConversation};
    use crate::messages::MemoryMessageStore;
    use crate::realtime::session::Outbound;
    use crate::realtime::{Session, SessionRegistry};
    use crate::webhooks::{MemorySubscriptionStore, WebhookDispatcher};
    use atendo_shared::UserRole;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        service: ThreadService,
        conversations: Arc<MemoryConversationStore>,
        messages: Arc<MemoryMessageStore>,
        registry: Arc<SessionRegistry>,
    }

    async fn fixture() -> Fixture {
        let conversations = Arc::new(MemoryConversationStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let service = ThreadService::new(
            Arc::clone(&messages) as Arc<dyn MessageStore>,
            Arc::clone(&conversations) as Arc<dyn ConversationStore>,
            Notifier::new(Arc::clone(&registry)),
            WebhookDispatcher::new(
                Arc::new(MemorySubscriptionStore::new()),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ),
        );
        Fixture {
            service,
            conversations,
            messages,
            registry,
        }
    }

    async fn conversation(fixture: &Fixture, mode: ConversationMode) -> Uuid {
        let conversation = fixture
            .conversations
            .insert(NewConversation {
                id: Uuid::new_v4(),
                protocol_number: "01712345678901".to_string(),
                client_id: Uuid::new_v4(),
                mode,
            })
            .await
            .unwrap();
        conversation.id
    }

    fn text_message(conversation_id: Uuid, sender_id: Uuid, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id,
            kind: MessageKind::Text,
            content: content.to_string(),
            media_url: None,
            media_name: None,
            reply_to_id: None,
            forwarded_from_id: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_feed_round_trip() {
        let f = fixture().await;
        let conversation_id = conversation(&f, ConversationMode::Attendant).await;
        let sender = Uuid::new_v4();

        let first = f
            .service
            .append(text_message(conversation_id, sender, "hello"))
            .await
            .unwrap();
        // Distinct timestamps so ordering is exercised, not uuid tie-break
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = f
            .service
            .append(text_message(conversation_id, sender, "world"))
            .await
            .unwrap();

        let feed = f.service.feed(conversation_id).await.unwrap();
        assert_eq!(
            feed.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );

        // Denormalized cache follows the newest message
        let conversation = f.conversations.get(conversation_id).await.unwrap();
        assert_eq!(conversation.last_message.as_deref(), Some("world"));
        assert!(conversation.last_message_at.is_some());
    }

    #[tokio::test]
    async fn test_feed_for_unknown_conversation_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.service.feed(Uuid::new_v4()).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_must_stay_in_conversation() {
        let f = fixture().await;
        let here = conversation(&f, ConversationMode::Attendant).await;
        let elsewhere = conversation(&f, ConversationMode::Attendant).await;
        let sender = Uuid::new_v4();

        let foreign = f
            .service
            .append(text_message(elsewhere, sender, "other thread"))
            .await
            .unwrap();

        let mut reply = text_message(here, sender, "reply");
        reply.reply_to_id = Some(foreign.id);
        assert!(matches!(
            f.service.append(reply).await,
            Err(CoreError::Validation(_))
        ));

        // No side effects from the rejected append
        assert!(f.service.feed(here).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_reply_target_resolvable() {
        let f = fixture().await;
        let conversation_id = conversation(&f, ConversationMode::Attendant).await;
        let sender = Uuid::new_v4();

        let original = f
            .service
            .append(text_message(conversation_id, sender, "original"))
            .await
            .unwrap();
        let mut reply = text_message(conversation_id, sender, "answer");
        reply.reply_to_id = Some(original.id);
        let reply = f.service.append(reply).await.unwrap();

        f.service.soft_delete(original.id).await.unwrap();

        // Gone from the feed...
        let feed = f.service.feed(conversation_id).await.unwrap();
        assert_eq!(feed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![reply.id]);

        // ...but the row is still there for the reply to resolve
        let target = f.messages.get(original.id).await.unwrap();
        assert!(target.deleted);
        assert_eq!(feed[0].reply_to_id, Some(target.id));

        // A second delete is not found
        assert!(matches!(
            f.service.soft_delete(original.id).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_to_deleted_message_still_allowed() {
        let f = fixture().await;
        let conversation_id = conversation(&f, ConversationMode::Attendant).await;
        let sender = Uuid::new_v4();

        let original = f
            .service
            .append(text_message(conversation_id, sender, "soon gone"))
            .await
            .unwrap();
        f.service.soft_delete(original.id).await.unwrap();

        let mut reply = text_message(conversation_id, sender, "late answer");
        reply.reply_to_id = Some(original.id);
        assert!(f.service.append(reply).await.is_ok());
    }

    #[tokio::test]
    async fn test_staff_message_flips_ai_agent_mode() {
        let f = fixture().await;
        let conversation_id = conversation(&f, ConversationMode::AiAgent).await;

        let client = Uuid::new_v4();
        f.conversations.add_user(client, UserRole::Client).await;
        f.service
            .append(text_message(conversation_id, client, "help"))
            .await
            .unwrap();
        let conversation = f.conversations.get(conversation_id).await.unwrap();
        assert_eq!(conversation.mode, ConversationMode::AiAgent);

        let attendant = Uuid::new_v4();
        f.conversations
            .add_user(attendant, UserRole::Attendant)
            .await;
        f.service
            .append(text_message(conversation_id, attendant, "a human here"))
            .await
            .unwrap();
        let conversation = f.conversations.get(conversation_id).await.unwrap();
        assert_eq!(conversation.mode, ConversationMode::Attendant);
    }

    struct InsertFailingStore;

    #[async_trait::async_trait]
    impl MessageStore for InsertFailingStore {
        async fn insert(&self, _message: Message) -> CoreResult<Message> {
            Err(CoreError::Database("insert failed".to_string()))
        }
        async fn get(&self, id: Uuid) -> CoreResult<Message> {
            Err(CoreError::NotFound(format!("message {id}")))
        }
        async fn feed(&self, _conversation_id: Uuid) -> CoreResult<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn soft_delete(&self, _id: Uuid) -> CoreResult<u64> {
            Ok(0)
        }
        async fn reaction_for(
            &self,
            _message_id: Uuid,
            _user_id: Uuid,
        ) -> CoreResult<Option<Reaction>> {
            Ok(None)
        }
        async fn insert_reaction(&self, _reaction: Reaction) -> CoreResult<()> {
            Ok(())
        }
        async fn delete_reaction(&self, _message_id: Uuid, _user_id: Uuid) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_mode_untouched() {
        let conversations = Arc::new(MemoryConversationStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let service = ThreadService::new(
            Arc::new(InsertFailingStore),
            Arc::clone(&conversations) as Arc<dyn ConversationStore>,
            Notifier::new(registry),
            WebhookDispatcher::new(
                Arc::new(MemorySubscriptionStore::new()),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ),
        );

        let conversation = conversations
            .insert(NewConversation {
                id: Uuid::new_v4(),
                protocol_number: "01712345678903".to_string(),
                client_id: Uuid::new_v4(),
                mode: ConversationMode::AiAgent,
            })
            .await
            .unwrap();

        let attendant = Uuid::new_v4();
        conversations.add_user(attendant, UserRole::Attendant).await;

        let result = service
            .append(text_message(conversation.id, attendant, "doomed"))
            .await;
        assert!(matches!(result, Err(CoreError::Database(_))));

        // Mode flip is tied to a stored message; a failed append must not
        // leave the conversation in attendant mode with no human message
        let unchanged = conversations.get(conversation.id).await.unwrap();
        assert_eq!(unchanged.mode, ConversationMode::AiAgent);
        assert!(unchanged.last_message.is_none());
    }

    #[tokio::test]
    async fn test_reaction_toggle_semantics() {
        let f = fixture().await;
        let conversation_id = conversation(&f, ConversationMode::Attendant).await;
        let sender = Uuid::new_v4();
        let reactor = Uuid::new_v4();

        let message = f
            .service
            .append(text_message(conversation_id, sender, "react to me"))
            .await
            .unwrap();

        // Add
        let added = f
            .service
            .toggle_reaction(reactor, message.id, "👍")
            .await
            .unwrap();
        assert_eq!(added.map(|r| r.emoji), Some("👍".to_string()));

        // Same emoji again removes it
        let removed = f
            .service
            .toggle_reaction(reactor, message.id, "👍")
            .await
            .unwrap();
        assert!(removed.is_none());
        assert!(f
            .messages
            .reaction_for(message.id, reactor)
            .await
            .unwrap()
            .is_none());

        // Add then replace with a different emoji
        f.service
            .toggle_reaction(reactor, message.id, "👍")
            .await
            .unwrap();
        let replaced = f
            .service
            .toggle_reaction(reactor, message.id, "❤️")
            .await
            .unwrap();
        assert_eq!(replaced.map(|r| r.emoji), Some("❤️".to_string()));
        let stored = f
            .messages
            .reaction_for(message.id, reactor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.emoji, "❤️");
    }

    #[tokio::test]
    async fn test_message_new_reaches_participants() {
        let f = fixture().await;
        let client = Uuid::new_v4();
        let conversation = f
            .conversations
            .insert(NewConversation {
                id: Uuid::new_v4(),
                protocol_number: "01712345678902".to_string(),
                client_id: client,
                mode: ConversationMode::Attendant,
            })
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        f.registry.register(Arc::new(Session::new(client, tx)));

        let message = f
            .service
            .append(text_message(conversation.id, client, "ping"))
            .await
            .unwrap();

        match rx.try_recv() {
            Ok(Outbound::Event(ServerEvent::MessageNew { message: pushed })) => {
                assert_eq!(pushed.id, message.id);
            }
            other => panic!("expected message:new, got {other:?}"),
        }
    }
}

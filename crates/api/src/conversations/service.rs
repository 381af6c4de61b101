//! Assignment service
//!
//! Applies conversation lifecycle transitions against durable storage and,
//! on success, broadcasts to the conversation's participants and hands the
//! snapshot to the webhook dispatcher. The dispatcher never blocks or
//! fails the mutation; the notifier runs synchronously so participants see
//! per-conversation events in commit order.

use atendo_shared::{
    Conversation, ConversationMode, ConversationStatus, CoreError, CoreResult, WebhookEvent,
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::realtime::{Notifier, ServerEvent};
use crate::webhooks::WebhookDispatcher;

use super::store::{ConversationStore, NewConversation};

#[derive(Clone)]
pub struct AssignmentService {
    store: Arc<dyn ConversationStore>,
    notifier: Notifier,
    webhooks: WebhookDispatcher,
}

/// Human-readable protocol number, assigned once at creation
fn next_protocol_number() -> String {
    let now = OffsetDateTime::now_utc();
    format!("{:013}", now.unix_timestamp_nanos() / 1_000_000)
}

fn snapshot(conversation: &Conversation) -> serde_json::Value {
    serde_json::to_value(conversation).unwrap_or(serde_json::Value::Null)
}

impl AssignmentService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        notifier: Notifier,
        webhooks: WebhookDispatcher,
    ) -> Self {
        Self {
            store,
            notifier,
            webhooks,
        }
    }

    /// Open a new pending conversation for a client
    pub async fn create(
        &self,
        client_id: Uuid,
        mode: ConversationMode,
    ) -> CoreResult<Conversation> {
        let conversation = self
            .store
            .insert(NewConversation {
                id: Uuid::new_v4(),
                protocol_number: next_protocol_number(),
                client_id,
                mode,
            })
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            protocol_number = %conversation.protocol_number,
            client_id = %client_id,
            "Conversation created"
        );

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::ConversationNew {
                conversation: conversation.clone(),
            },
        );
        self.webhooks
            .trigger(WebhookEvent::ConversationCreated, snapshot(&conversation));

        Ok(conversation)
    }

    /// The claim hot path. Concurrent callers race on one conditional
    /// write; exactly one observes an affected row. Losers get a conflict
    /// naming the attendant who won, read fresh from storage.
    pub async fn claim(&self, conversation_id: Uuid, attendant_id: Uuid) -> CoreResult<Conversation> {
        let affected = self.store.claim_pending(conversation_id, attendant_id).await?;

        if affected == 0 {
            // Either already taken or gone; a fresh read tells which
            let current = self.store.get(conversation_id).await?;
            tracing::info!(
                conversation_id = %conversation_id,
                loser = %attendant_id,
                winner = ?current.attendant_id,
                "Claim lost its race"
            );
            return Err(CoreError::AssignmentConflict {
                attendant_id: current.attendant_id,
            });
        }

        let conversation = self.store.get(conversation_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            attendant_id = %attendant_id,
            "Conversation claimed"
        );

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::ConversationStatus {
                conversation_id,
                status: conversation.status,
                attendant_id: conversation.attendant_id,
            },
        );
        self.webhooks
            .trigger(WebhookEvent::ConversationAssigned, snapshot(&conversation));
        self.webhooks
            .trigger(WebhookEvent::ConversationUpdated, snapshot(&conversation));

        Ok(conversation)
    }

    /// Close, reopen, or unassign. Claiming a pending conversation is not
    /// reachable from here; that path is `claim` and its conditional write.
    pub async fn change_status(
        &self,
        conversation_id: Uuid,
        next: ConversationStatus,
    ) -> CoreResult<Conversation> {
        let conversation = self.store.get(conversation_id).await?;

        if !conversation.status.can_change_to(next) {
            return Err(CoreError::Validation(format!(
                "invalid status change: {} -> {}",
                conversation.status, next
            )));
        }
        // attendant_id must be set whenever a conversation is attending
        if next == ConversationStatus::Attending && conversation.attendant_id.is_none() {
            return Err(CoreError::Validation(
                "cannot reopen a conversation with no attendant".to_string(),
            ));
        }

        let closed_at = (next == ConversationStatus::Closed).then(OffsetDateTime::now_utc);
        let clear_attendant = next == ConversationStatus::Pending;
        self.store
            .update_status(conversation_id, next, closed_at, clear_attendant)
            .await?;

        let conversation = self.store.get(conversation_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            status = %next,
            "Conversation status changed"
        );

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::ConversationStatus {
                conversation_id,
                status: conversation.status,
                attendant_id: conversation.attendant_id,
            },
        );

        match next {
            ConversationStatus::Closed => {
                self.webhooks
                    .trigger(WebhookEvent::ConversationClosed, snapshot(&conversation));
            }
            ConversationStatus::Attending => {
                self.webhooks
                    .trigger(WebhookEvent::ConversationReopened, snapshot(&conversation));
            }
            ConversationStatus::Pending => {}
        }
        self.webhooks
            .trigger(WebhookEvent::ConversationUpdated, snapshot(&conversation));

        Ok(conversation)
    }

    /// Operator-initiated reassignment; last writer wins
    pub async fn transfer(
        &self,
        conversation_id: Uuid,
        new_attendant_id: Uuid,
    ) -> CoreResult<Conversation> {
        // NotFound for the conversation takes precedence over target checks
        self.store.get(conversation_id).await?;

        let role = self.store.user_role(new_attendant_id).await?;
        if !role.is_staff() {
            return Err(CoreError::Validation(
                "transfer target must be an attendant or admin".to_string(),
            ));
        }

        self.store
            .assign_attendant(conversation_id, new_attendant_id)
            .await?;

        let conversation = self.store.get(conversation_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            attendant_id = %new_attendant_id,
            "Conversation transferred"
        );

        self.notifier.deliver(
            &conversation.participants(),
            ServerEvent::ConversationUpdate {
                conversation: conversation.clone(),
            },
        );
        self.webhooks.trigger(
            WebhookEvent::ConversationTransferred,
            snapshot(&conversation),
        );
        self.webhooks
            .trigger(WebhookEvent::ConversationUpdated, snapshot(&conversation));

        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::MemoryConversationStore;
    use crate::realtime::session::Outbound;
    use crate::realtime::{Session, SessionRegistry};
    use crate::webhooks::{MemorySubscriptionStore, WebhookDispatcher};
    use atendo_shared::UserRole;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_dispatcher() -> WebhookDispatcher {
        WebhookDispatcher::new(
            Arc::new(MemorySubscriptionStore::new()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    fn service_with(
        store: Arc<MemoryConversationStore>,
    ) -> (AssignmentService, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let service = AssignmentService::new(
            store,
            Notifier::new(Arc::clone(&registry)),
            test_dispatcher(),
        );
        (service, registry)
    }

    #[tokio::test]
    async fn test_create_is_pending_and_unassigned() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();

        assert_eq!(conversation.status, ConversationStatus::Pending);
        assert!(conversation.attendant_id.is_none());
        assert!(!conversation.protocol_number.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();

        let attendants: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let mut handles = Vec::new();
        for &attendant_id in &attendants {
            let service = service.clone();
            let conversation_id = conversation.id;
            handles.push(tokio::spawn(async move {
                service.claim(conversation_id, attendant_id).await
            }));
        }

        let mut winners = Vec::new();
        let mut conflicts = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(conversation) => winners.push(conversation),
                Err(CoreError::AssignmentConflict { attendant_id }) => {
                    conflicts.push(attendant_id)
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts.len(), attendants.len() - 1);

        let winner_id = winners[0].attendant_id.unwrap();
        assert!(attendants.contains(&winner_id));
        // Every loser is told the same winning attendant
        for conflict in conflicts {
            assert_eq!(conflict, Some(winner_id));
        }
        assert_eq!(winners[0].status, ConversationStatus::Attending);
    }

    #[tokio::test]
    async fn test_claim_on_missing_conversation_is_not_found() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(store);

        let result = service.claim(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_notifies_participants() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, registry) = service_with(Arc::clone(&store));

        let client_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(Arc::new(Session::new(client_id, tx)));

        let conversation = service
            .create(client_id, ConversationMode::Attendant)
            .await
            .unwrap();
        // conversation:new from the create
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Event(ServerEvent::ConversationNew { .. }))
        ));

        let attendant_id = Uuid::new_v4();
        service.claim(conversation.id, attendant_id).await.unwrap();
        match rx.try_recv() {
            Ok(Outbound::Event(ServerEvent::ConversationStatus {
                status,
                attendant_id: assigned,
                ..
            })) => {
                assert_eq!(status, ConversationStatus::Attending);
                assert_eq!(assigned, Some(attendant_id));
            }
            other => panic!("expected conversation:status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_and_reopen() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();
        let attendant_id = Uuid::new_v4();
        service.claim(conversation.id, attendant_id).await.unwrap();

        let closed = service
            .change_status(conversation.id, ConversationStatus::Closed)
            .await
            .unwrap();
        assert_eq!(closed.status, ConversationStatus::Closed);
        assert!(closed.closed_at.is_some());
        // Closing keeps the attendant so a reopen can restore them
        assert_eq!(closed.attendant_id, Some(attendant_id));

        let reopened = service
            .change_status(conversation.id, ConversationStatus::Attending)
            .await
            .unwrap();
        assert_eq!(reopened.status, ConversationStatus::Attending);
        assert!(reopened.closed_at.is_none());
    }

    #[tokio::test]
    async fn test_unassign_clears_attendant() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();
        service.claim(conversation.id, Uuid::new_v4()).await.unwrap();

        let unassigned = service
            .change_status(conversation.id, ConversationStatus::Pending)
            .await
            .unwrap();
        assert_eq!(unassigned.status, ConversationStatus::Pending);
        assert!(unassigned.attendant_id.is_none());

        // The conversation is claimable again
        let reclaimed = service
            .claim(conversation.id, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(reclaimed.status, ConversationStatus::Attending);
    }

    #[tokio::test]
    async fn test_invalid_status_change_rejected() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();

        // pending -> closed is not a valid transition
        let result = service
            .change_status(conversation.id, ConversationStatus::Closed)
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        // ... and the conversation is untouched
        let unchanged = store.get(conversation.id).await.unwrap();
        assert_eq!(unchanged.status, ConversationStatus::Pending);
    }

    #[tokio::test]
    async fn test_transfer_requires_staff_target() {
        let store = Arc::new(MemoryConversationStore::new());
        let (service, _registry) = service_with(Arc::clone(&store));

        let conversation = service
            .create(Uuid::new_v4(), ConversationMode::Attendant)
            .await
            .unwrap();
        let first = Uuid::new_v4();
        service.claim(conversation.id, first).await.unwrap();

        let client_target = Uuid::new_v4();
        store.add_user(client_target, UserRole::Client).await;
        let result = service.transfer(conversation.id, client_target).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let attendant_target = Uuid::new_v4();
        store.add_user(attendant_target, UserRole::Attendant).await;
        let transferred = service
            .transfer(conversation.id, attendant_target)
            .await
            .unwrap();
        assert_eq!(transferred.attendant_id, Some(attendant_target));
    }
}

//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::conversations::{AssignmentService, PgConversationStore};
use crate::messages::{PgMessageStore, ThreadService};
use crate::realtime::{Notifier, SessionRegistry};
use crate::webhooks::{PgSubscriptionStore, WebhookDispatcher};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub jwt: JwtManager,
    pub registry: Arc<SessionRegistry>,
    pub notifier: Notifier,
    pub webhooks: WebhookDispatcher,
    pub conversations: AssignmentService,
    pub messages: ThreadService,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let registry = Arc::new(SessionRegistry::new());
        let notifier = Notifier::new(Arc::clone(&registry));

        let webhooks = WebhookDispatcher::new(
            Arc::new(PgSubscriptionStore::new(pool.clone())),
            Duration::from_secs(config.webhook_timeout_secs),
            Duration::from_secs(config.webhook_test_timeout_secs),
        );

        let conversation_store = Arc::new(PgConversationStore::new(pool.clone()));
        let conversations = AssignmentService::new(
            conversation_store.clone(),
            notifier.clone(),
            webhooks.clone(),
        );
        let messages = ThreadService::new(
            Arc::new(PgMessageStore::new(pool.clone())),
            conversation_store,
            notifier.clone(),
            webhooks.clone(),
        );

        Self {
            config: Arc::new(config),
            pool,
            jwt,
            registry,
            notifier,
            webhooks,
            conversations,
            messages,
        }
    }
}

//! Webhook subscription lookup
//!
//! Subscriptions are configured out of band and read-only here.

use async_trait::async_trait;
use atendo_shared::{CoreError, CoreResult, WebhookEvent, WebhookSubscription};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All active subscriptions that opted into this event name
    async fn active_for(&self, event: WebhookEvent) -> CoreResult<Vec<WebhookSubscription>>;

    async fn get(&self, id: Uuid) -> CoreResult<WebhookSubscription>;
}

// =============================================================================
// Postgres implementation
// =============================================================================

#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, name, url, auth_mode, auth_token, headers, events, active, created_at";

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn active_for(&self, event: WebhookEvent) -> CoreResult<Vec<WebhookSubscription>> {
        let rows = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE active AND $1 = ANY(events)"
        ))
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> CoreResult<WebhookSubscription> {
        sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("webhook subscription {id}")))
    }
}

// =============================================================================
// In-memory implementation (tests, local development)
// =============================================================================

#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Arc<Mutex<HashMap<Uuid, WebhookSubscription>>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, subscription: WebhookSubscription) {
        self.subscriptions
            .lock()
            .await
            .insert(subscription.id, subscription);
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn active_for(&self, event: WebhookEvent) -> CoreResult<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .lock()
            .await
            .values()
            .filter(|s| s.active && s.wants(event))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> CoreResult<WebhookSubscription> {
        self.subscriptions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("webhook subscription {id}")))
    }
}

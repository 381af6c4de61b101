//! Webhook dispatcher
//!
//! Fire-and-forget fan-out of state-change events to subscriber endpoints.
//! Each subscriber call is independent and time-bounded; a timeout,
//! connection refusal, or non-2xx response is logged and otherwise
//! ignored. There is no queue, no backoff, no retry.

use atendo_shared::{CoreResult, WebhookAuthMode, WebhookEvent, WebhookSubscription};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use super::subscriptions::SubscriptionStore;

/// Result of a single subscriber delivery, reported only for explicit
/// test calls; background triggers log and drop it.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub subscription_id: Uuid,
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    http: reqwest::Client,
    /// Budget for background triggers
    trigger_timeout: Duration,
    /// Longer budget for user-initiated test calls
    test_timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        trigger_timeout: Duration,
        test_timeout: Duration,
    ) -> Self {
        Self {
            subscriptions,
            http: reqwest::Client::new(),
            trigger_timeout,
            test_timeout,
        }
    }

    /// Fan out `event` to all matching subscribers as a detached task.
    /// Returns immediately; the originating mutation never waits on or
    /// learns about subscriber failures.
    pub fn trigger(&self, event: WebhookEvent, payload: Value) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.fan_out(event, payload).await;
        });
    }

    /// One synchronous delivery against a configured subscription, with
    /// the longer test budget. The outcome is returned instead of logged
    /// away so the caller can show it.
    pub async fn send_test(&self, subscription_id: Uuid) -> CoreResult<DeliveryOutcome> {
        let subscription = self.subscriptions.get(subscription_id).await?;
        let envelope = envelope(WebhookEvent::ConversationUpdated, json!({"test": true}));
        Ok(self
            .deliver(&subscription, WebhookEvent::ConversationUpdated, &envelope, self.test_timeout)
            .await)
    }

    async fn fan_out(&self, event: WebhookEvent, payload: Value) {
        let subscriptions = match self.subscriptions.active_for(event).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(event = %event, error = %e, "Failed to load webhook subscriptions");
                return;
            }
        };

        if subscriptions.is_empty() {
            return;
        }

        let envelope = envelope(event, payload);
        let deliveries = subscriptions
            .iter()
            .map(|subscription| self.deliver(subscription, event, &envelope, self.trigger_timeout));

        for outcome in futures::future::join_all(deliveries).await {
            if outcome.success {
                tracing::debug!(
                    subscription_id = %outcome.subscription_id,
                    event = %event,
                    status = ?outcome.status,
                    "Webhook delivered"
                );
            } else {
                // Contained here; never surfaced, never retried
                tracing::warn!(
                    subscription_id = %outcome.subscription_id,
                    event = %event,
                    status = ?outcome.status,
                    error = ?outcome.error,
                    "Webhook delivery failed"
                );
            }
        }
    }

    async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        event: WebhookEvent,
        envelope: &Value,
        timeout: Duration,
    ) -> DeliveryOutcome {
        let mut request = self
            .http
            .post(&subscription.url)
            .timeout(timeout)
            .json(envelope);

        for (name, value) in subscription.headers.0.iter() {
            request = request.header(name, value);
        }

        match (subscription.auth_mode, &subscription.auth_token) {
            (WebhookAuthMode::None, _) | (_, None) => {}
            (WebhookAuthMode::Bearer | WebhookAuthMode::Jwt, Some(token)) => {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            (WebhookAuthMode::ApiKey, Some(token)) => {
                request = request.header("X-API-Key", token);
            }
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                DeliveryOutcome {
                    subscription_id: subscription.id,
                    success: status.is_success(),
                    status: Some(status.as_u16()),
                    error: (!status.is_success())
                        .then(|| format!("subscriber returned {status} for {event}")),
                }
            }
            Err(e) => DeliveryOutcome {
                subscription_id: subscription.id,
                success: false,
                status: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn envelope(event: WebhookEvent, payload: Value) -> Value {
    json!({
        "event": event.as_str(),
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        "data": payload,
    })
}

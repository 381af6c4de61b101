//! Notification router
//!
//! Delivers an event to every live session of a user set. Delivery is
//! at-most-once and best-effort: users with no live sessions are silently
//! skipped and nothing is queued for them.
//!
//! Callers invoke `deliver` synchronously inside a mutation's success
//! path, which is what gives per-conversation events the same order the
//! underlying writes committed in.

use std::sync::Arc;
use uuid::Uuid;

use super::events::ServerEvent;
use super::registry::SessionRegistry;

#[derive(Clone)]
pub struct Notifier {
    registry: Arc<SessionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Push `event` to every live session of every listed user
    pub fn deliver(&self, user_ids: &[Uuid], event: ServerEvent) {
        let mut delivered = 0;
        let mut dropped = 0;

        for &user_id in user_ids {
            for session in self.registry.connections_for(user_id) {
                if session.send(event.clone()) {
                    delivered += 1;
                } else {
                    // Writer task already gone; the reaper will collect it
                    dropped += 1;
                    tracing::debug!(
                        session_id = %session.id,
                        user_id = %user_id,
                        "Dropped event for closed session"
                    );
                }
            }
        }

        tracing::debug!(
            recipients = user_ids.len(),
            delivered = delivered,
            dropped = dropped,
            event = ?event,
            "Delivered live event"
        );
    }
}

//! Session registry
//!
//! Tracks live sessions grouped by owning user. The mapping is the one
//! piece of shared in-process state mutated from many concurrent handlers,
//! so it lives in a sharded concurrent map instead of a single lock that
//! would serialize unrelated users' connect/disconnect traffic.
//!
//! The registry is disposable: it holds no authoritative state and is
//! rebuilt from scratch as clients reconnect.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::session::Session;

pub struct SessionRegistry {
    /// user_id -> live sessions (multi-device)
    sessions: DashMap<Uuid, Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add a session under its owning user
    pub fn register(&self, session: Arc<Session>) {
        let mut entry = self.sessions.entry(session.user_id).or_default();
        entry.push(Arc::clone(&session));

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            device_count = entry.len(),
            "Session registered"
        );
    }

    /// Remove one session. Dropping the last session for a user simply
    /// removes the map entry; presence is derived on read, not pushed.
    pub fn unregister(&self, user_id: Uuid, session_id: Uuid) {
        if let Entry::Occupied(mut entry) = self.sessions.entry(user_id) {
            entry.get_mut().retain(|s| s.id != session_id);
            let remaining = entry.get().len();
            if entry.get().is_empty() {
                entry.remove();
            }
            tracing::info!(
                session_id = %session_id,
                user_id = %user_id,
                remaining = remaining,
                "Session unregistered"
            );
        }
    }

    /// All live sessions for a user; empty when offline
    pub fn connections_for(&self, user_id: Uuid) -> Vec<Arc<Session>> {
        self.sessions
            .get(&user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Derived presence: online iff at least one live session exists
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions
            .get(&user_id)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// Total live sessions across all users
    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.len()).sum()
    }

    /// One liveness pass: tear down every session that failed to answer
    /// the previous probe, then probe the survivors.
    pub fn probe_all(&self, deadline: Duration) {
        let mut stale = Vec::new();
        let mut live = Vec::new();

        for entry in self.sessions.iter() {
            for session in entry.value() {
                // A full interval without a signal means the previous probe
                // went unanswered; the boundary counts as missed
                if session.idle_secs() >= deadline.as_secs() as i64 {
                    stale.push(Arc::clone(session));
                } else {
                    live.push(Arc::clone(session));
                }
            }
        }

        for session in stale {
            tracing::warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                idle_secs = session.idle_secs(),
                "Liveness probe missed, closing session"
            );
            session.close();
            self.unregister(session.user_id, session.id);
        }

        for session in live {
            // A failed probe send means the writer task already exited
            if !session.probe() {
                self.unregister(session.user_id, session.id);
            }
        }
    }

    /// Periodic liveness loop; runs until the process exits
    pub async fn run_reaper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; skip it so fresh sessions get a
        // full interval to answer
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.probe_all(interval);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::session::Outbound;
    use tokio::sync::mpsc;

    fn session_for(user_id: Uuid) -> (Arc<Session>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Session::new(user_id, tx)), rx)
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let (session, _rx) = session_for(user_id);

        registry.register(Arc::clone(&session));
        assert_eq!(registry.session_count(), 1);
        assert!(registry.is_online(user_id));

        registry.unregister(user_id, session.id);
        assert_eq!(registry.session_count(), 0);
        assert!(!registry.is_online(user_id));
    }

    #[tokio::test]
    async fn test_multi_device() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let (first, _rx1) = session_for(user_id);
        let (second, _rx2) = session_for(user_id);

        registry.register(Arc::clone(&first));
        registry.register(Arc::clone(&second));
        assert_eq!(registry.connections_for(user_id).len(), 2);

        // Dropping one device keeps the user online through the other
        registry.unregister(user_id, first.id);
        let remaining = registry.connections_for(user_id);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert!(registry.is_online(user_id));
    }

    #[tokio::test]
    async fn test_offline_user_has_no_connections() {
        let registry = SessionRegistry::new();
        assert!(registry.connections_for(Uuid::new_v4()).is_empty());
    }

    #[tokio::test]
    async fn test_probe_reaps_stale_sessions() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let (session, mut rx) = session_for(user_id);
        registry.register(Arc::clone(&session));

        // Fresh session gets probed, not closed
        registry.probe_all(Duration::from_secs(30));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Probe)));
        assert_eq!(registry.session_count(), 1);

        // A zero deadline makes any session stale
        registry.probe_all(Duration::from_secs(0));
        assert_eq!(registry.session_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }

    #[tokio::test]
    async fn test_full_interval_without_pong_is_reaped() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let (session, mut rx) = session_for(user_id);
        registry.register(Arc::clone(&session));

        // Last signal exactly one interval ago: the previous probe went
        // unanswered, so this pass must tear the session down
        session.backdate_last_pong(30);
        registry.probe_all(Duration::from_secs(30));

        assert_eq!(registry.session_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }

    #[tokio::test]
    async fn test_probe_drops_sessions_with_dead_writer() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let (session, rx) = session_for(user_id);
        registry.register(Arc::clone(&session));

        drop(rx);
        registry.probe_all(Duration::from_secs(30));
        assert_eq!(registry.session_count(), 0);
    }
}

//! Live connection session
//!
//! Represents one authenticated websocket connection. A session is created
//! on connect, destroyed on disconnect or liveness timeout, and never
//! persisted.

use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

/// Commands consumed by a session's socket writer task
#[derive(Debug)]
pub enum Outbound {
    /// Serialize and push an event envelope
    Event(ServerEvent),
    /// Send a transport-level ping frame (liveness probe)
    Probe,
    /// Send a close frame and tear the connection down
    Close,
}

/// One live network connection owned by a user
#[derive(Debug)]
pub struct Session {
    /// Unique id for this connection
    pub id: Uuid,

    /// Authenticated owner
    pub user_id: Uuid,

    /// Channel to the socket writer task
    sender: mpsc::UnboundedSender<Outbound>,

    /// Unix timestamp of the last liveness signal (pong frame or ping envelope)
    last_pong: AtomicI64,
}

impl Session {
    pub fn new(user_id: Uuid, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
            last_pong: AtomicI64::new(OffsetDateTime::now_utc().unix_timestamp()),
        }
    }

    /// Push an event to this connection.
    ///
    /// Returns false if the writer task is gone; the caller treats that as
    /// best-effort loss.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(Outbound::Event(event)).is_ok()
    }

    /// Send a liveness probe. Returns false if the writer task is gone.
    pub fn probe(&self) -> bool {
        self.sender.send(Outbound::Probe).is_ok()
    }

    /// Ask the writer task to close the socket
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }

    /// Record a liveness signal
    pub fn touch(&self) {
        self.last_pong.store(
            OffsetDateTime::now_utc().unix_timestamp(),
            Ordering::Relaxed,
        );
    }

    /// Seconds since the last liveness signal
    pub fn idle_secs(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() - self.last_pong.load(Ordering::Relaxed)
    }

    /// Shift the last liveness signal into the past
    #[cfg(test)]
    pub(crate) fn backdate_last_pong(&self, secs: i64) {
        self.last_pong.fetch_sub(secs, Ordering::Relaxed);
    }
}

//! Atendo API Library
//!
//! This crate contains the real-time conversation coordination service:
//! the session registry and live-update channel, the conversation
//! assignment state machine, the message thread store, and the webhook
//! dispatcher, plus the thin HTTP surface that drives them.

pub mod auth;
pub mod config;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod webhooks;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

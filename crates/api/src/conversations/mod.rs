//! Conversation assignment state machine
//!
//! Owns the pending -> attending -> closed lifecycle and the
//! conflict-arbitrated claim operation.

pub mod mock;
pub mod service;
pub mod store;

pub use mock::MemoryConversationStore;
pub use service::AssignmentService;
pub use store::{ConversationStore, NewConversation, PgConversationStore};

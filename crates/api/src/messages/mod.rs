//! Message thread store
//!
//! Message creation, soft deletion, reply/forward linkage, and reaction
//! toggling, with the same persist-then-notify-then-dispatch flow as the
//! assignment service.

pub mod mock;
pub mod service;
pub mod store;

pub use mock::MemoryMessageStore;
pub use service::{NewMessage, ThreadService};
pub use store::{MessageStore, PgMessageStore};

//! Real-time live-update channel
//!
//! Provides the coordination layer for pushing state changes to connected
//! clients:
//!
//! - **Session**: one authenticated live connection (a user may hold many)
//! - **SessionRegistry**: the user -> sessions mapping with liveness reaping
//! - **Notifier**: delivers events to every live session of a user set
//! - **Handler**: axum websocket route handler
//! - **Events**: the `{type, payload}` envelope types for both directions

pub mod events;
pub mod handler;
pub mod notifier;
pub mod registry;
pub mod session;

pub use events::{ClientEvent, ServerEvent};
pub use handler::ws_handler;
pub use notifier::Notifier;
pub use registry::SessionRegistry;
pub use session::Session;

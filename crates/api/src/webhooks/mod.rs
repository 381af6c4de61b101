//! Webhook fan-out
//!
//! Matches emitted events against subscriber configurations and performs
//! independent, time-bounded outbound calls. Failures are logged and
//! contained here; they never reach the mutation that produced the event.

pub mod dispatcher;
pub mod subscriptions;

pub use dispatcher::{DeliveryOutcome, WebhookDispatcher};
pub use subscriptions::{MemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore};

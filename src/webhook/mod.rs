//! Webhook module
//!
//! Delivers bus events to externally registered HTTP sinks, best-effort.

pub mod dispatcher;
pub mod registration;
pub mod sender;

pub use dispatcher::{is_sensitive, WebhookDispatcher};
pub use registration::{load_registrations, EventFilter, RequestConfig, WebhookRegistration};
pub use sender::{HttpWebhookSender, WebhookBody, WebhookSender};

//! Events module
//!
//! - `Event`: ephemeral namespaced notification
//! - `Pattern`: wildcard matcher over dotted namespaces
//! - `EventBus`: publish/subscribe used for state changes and webhook dispatch

pub mod bus;
pub mod pattern;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use pattern::{matches, Pattern};

/// A single notification. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub namespace: String,
    pub session_id: String,
    pub payload: Value,
    /// epoch milliseconds
    pub timestamp: u64,
}

impl Event {
    pub fn new(namespace: impl Into<String>, session_id: impl Into<String>, payload: Value) -> Self {
        Self {
            namespace: namespace.into(),
            session_id: session_id.into(),
            payload,
            timestamp: crate::utils::serde_helpers::now_millis(),
        }
    }
}

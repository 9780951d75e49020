//! Outbound delivery.
//!
//! The dispatcher talks to sinks through the pluggable `WebhookSender` trait;
//! `HttpWebhookSender` is the reqwest-backed implementation used in production.

use crate::events::Event;
use crate::webhook::registration::RequestConfig;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// JSON body POSTed to every sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub ts: u64,
    pub data: Value,
    pub session_id: String,
    pub namespace: String,
}

impl From<&Event> for WebhookBody {
    fn from(ev: &Event) -> Self {
        Self {
            ts: ev.timestamp,
            data: ev.payload.clone(),
            session_id: ev.session_id.clone(),
            namespace: ev.namespace.clone(),
        }
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync + 'static {
    async fn post(&self, url: &str, body: &WebhookBody, config: &RequestConfig) -> Result<()>;
}

/// reqwest-backed sender. Timeouts default to the client's own.
#[derive(Clone, Default)]
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &str, body: &WebhookBody, config: &RequestConfig) -> Result<()> {
        let mut req = self.client.post(url).json(body);
        for (k, v) in &config.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(ms) = config.timeout_ms {
            req = req.timeout(Duration::from_millis(ms));
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("sink {} answered {}", url, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_uses_wire_field_names() {
        let mut ev = Event::new("onMessage", "session", json!({"body": "hi"}));
        ev.timestamp = 42;
        let body = serde_json::to_value(WebhookBody::from(&ev)).unwrap();
        assert_eq!(
            body,
            json!({"ts": 42, "data": {"body": "hi"}, "sessionId": "session", "namespace": "onMessage"})
        );
    }
}

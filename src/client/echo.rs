//! In-memory reference client.
//!
//! Stands in for the real session controller: it keeps no browser, answers
//! from memory, and loops simulated inbound traffic back through its own
//! listeners and the event bus.

use crate::client::descriptor::MethodDocs;
use crate::client::registry::{RegistryBuilder, Relay};
use crate::client::AutomationClient;
use crate::events::EventBus;
use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct EchoClient {
    session_id: String,
    bus: EventBus,
    state: Mutex<String>,
    listeners: Mutex<HashMap<&'static str, Vec<Relay>>>,
    sent: AtomicU64,
}

impl EchoClient {
    pub fn new(session_id: impl Into<String>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            bus,
            state: Mutex::new("CONNECTED".to_string()),
            listeners: Mutex::new(HashMap::new()),
            sent: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> String {
        self.state.lock().clone()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map(Vec::len).unwrap_or(0)
    }

    fn add_listener(&self, name: &'static str, relay: Relay) -> usize {
        let mut map = self.listeners.lock();
        let list = map.entry(name).or_default();
        list.push(relay);
        list.len()
    }

    /// Fan `data` out to registered listeners and onto the bus. Relays whose
    /// receiver has gone away are dropped; returns the live deliveries.
    fn emit(&self, name: &'static str, data: Value) -> usize {
        let relays: Vec<Relay> = self.listeners.lock().get(name).cloned().unwrap_or_default();
        let dead: Vec<Relay> = relays.iter().filter(|relay| !relay(data.clone())).cloned().collect();
        if !dead.is_empty() {
            if let Some(list) = self.listeners.lock().get_mut(name) {
                list.retain(|r| !dead.iter().any(|d| Arc::ptr_eq(r, d)));
            }
            debug!("echo: released {} closed {} listener(s)", dead.len(), name);
        }
        self.bus.publish(name, &self.session_id, data);
        relays.len() - dead.len()
    }

    pub fn send_text(&self, to: &str, content: &str) -> anyhow::Result<Value> {
        if to.is_empty() {
            bail!("recipient must not be empty");
        }
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("echo: sendText #{} to {}", n, to);
        Ok(json!({ "id": format!("true_{}_{}", to, n), "to": to, "content": content }))
    }

    /// Accepts a data URL or bare base64 payload; reports the decoded size.
    pub fn send_image(&self, to: &str, file: &str, filename: &str) -> anyhow::Result<Value> {
        if to.is_empty() {
            bail!("recipient must not be empty");
        }
        let payload = match file.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => file,
        };
        let bytes = STANDARD.decode(payload).map_err(|e| anyhow!("file is not valid base64: {}", e))?;
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("echo: sendImage #{} to {} ({} bytes)", n, to, bytes.len());
        Ok(json!({ "id": format!("true_{}_{}", to, n), "to": to, "filename": filename, "size": bytes.len() }))
    }

    pub fn simulate_incoming(&self, from: &str, body: &str) -> usize {
        let msg = json!({ "from": from, "body": body, "sessionId": self.session_id });
        self.emit("onMessage", msg)
    }

    pub fn set_state(&self, state: &str) -> usize {
        *self.state.lock() = state.to_string();
        self.emit("onStateChanged", json!(state))
    }
}

fn str_arg<'a>(args: &'a [Value], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{} must be a string", name))
}

impl AutomationClient for EchoClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn register_methods(self: Arc<Self>, methods: &mut RegistryBuilder) {
        let c = self.clone();
        methods.action("getConnectionState", &[], move |_| {
            let c = c.clone();
            async move { Ok(json!(c.state())) }
        });

        let c = self.clone();
        methods.action("getConfig", &[], move |_| {
            let c = c.clone();
            async move { Ok(json!({ "sessionId": c.session_id })) }
        });

        let c = self.clone();
        methods.action("sendText", &["to", "content"], move |args| {
            let c = c.clone();
            async move {
                let to = str_arg(&args, 0, "to")?;
                let content = str_arg(&args, 1, "content")?;
                c.send_text(to, content)
            }
        });

        let c = self.clone();
        methods.action("sendImage", &["to", "file", "filename"], move |args| {
            let c = c.clone();
            async move {
                let to = str_arg(&args, 0, "to")?;
                let file = str_arg(&args, 1, "file")?;
                let filename = args.get(2).and_then(Value::as_str).unwrap_or("image");
                c.send_image(to, file, filename)
            }
        });

        let c = self.clone();
        methods.action("simulateIncomingMessage", &["from", "body"], move |args| {
            let c = c.clone();
            async move {
                let from = str_arg(&args, 0, "from")?;
                let body = str_arg(&args, 1, "body")?;
                Ok(json!(c.simulate_incoming(from, body)))
            }
        });

        let c = self.clone();
        methods.action("setState", &["state"], move |args| {
            let c = c.clone();
            async move { Ok(json!(c.set_state(str_arg(&args, 0, "state")?))) }
        });

        methods.action("fail", &["reason"], |args| async move {
            let reason = args.first().and_then(Value::as_str).unwrap_or("requested failure");
            Err(anyhow!("{}", reason))
        });

        let c = self.clone();
        methods.listener("onMessage", &[], move |relay, _args| {
            let c = c.clone();
            async move { Ok(json!({ "listener": "onMessage", "count": c.add_listener("onMessage", relay) })) }
        });

        let c = self;
        methods.listener("onStateChanged", &[], move |relay, _args| {
            let c = c.clone();
            async move { Ok(json!({ "listener": "onStateChanged", "count": c.add_listener("onStateChanged", relay) })) }
        });

        methods
            .document(
                "sendText",
                MethodDocs::summary("Send a text message to a chat")
                    .with_example("to", json!("447123456789@c.us"))
                    .with_example("content", json!("Hello from the gateway")),
            )
            .document(
                "sendImage",
                MethodDocs::summary("Send an image given as a data URL or base64")
                    .with_example("to", json!("447123456789@c.us"))
                    .with_example("file", json!("data:image/png;base64,iVBORw0KGgo="))
                    .with_example("filename", json!("pixel.png")),
            )
            .document("getConnectionState", MethodDocs::summary("Current connection state of the session"))
            .document(
                "simulateIncomingMessage",
                MethodDocs::summary("Loop a fake inbound message through listeners and webhooks")
                    .with_example("from", json!("447123456789@c.us"))
                    .with_example("body", json!("ping")),
            )
            .document("onMessage", MethodDocs::summary("Stream every inbound message"));
    }
}

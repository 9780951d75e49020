//! WebSocket transport.
//!
//! Frames are JSON text. Inbound:
//!
//! ```json
//! { "id": 7, "kind": "call", "method": "sendText", "args": { "to": "...", "content": "..." } }
//! { "id": 8, "kind": "listen", "method": "onMessage" }
//! ```
//!
//! Every inbound frame is answered by exactly one `result` frame carrying the
//! same `id`. A successful `listen` also returns a `listenerId`, and each
//! emission of that listener arrives as an `event` frame tagged with it.
//!
//! Frames are decoded and routed in arrival order; the invocations themselves
//! run concurrently and answer in completion order.

use crate::client::Relay;
use crate::rpc::auth::{unauthorised, AuthConfig};
use crate::rpc::handlers::{Dispatcher, ErrorBody};
use crate::utils::GatewayError;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    #[default]
    Call,
    Listen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub kind: FrameKind,
    pub method: String,
    #[serde(default)]
    pub args: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Result {
        id: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
        #[serde(skip_serializing_if = "Option::is_none")]
        listener_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Event { method: String, listener_id: String, data: Value },
}

impl ServerFrame {
    fn success(id: Option<Value>, method: String, result: Value, listener_id: Option<String>) -> Self {
        ServerFrame::Result { id, method: Some(method), ok: true, result: Some(result), error: None, listener_id }
    }

    fn failure(id: Option<Value>, method: Option<String>, error: ErrorBody) -> Self {
        ServerFrame::Result { id, method, ok: false, result: None, error: Some(error), listener_id: None }
    }
}

/// Handshake parameters carried on the upgrade request's query string.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct SocketState {
    pub dispatcher: Dispatcher,
    pub auth: Arc<AuthConfig>,
}

/// `GET /socket`: authenticate the handshake, then upgrade.
pub async fn socket_handler(
    State(state): State<SocketState>,
    Query(q): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let candidate = q.api_key.as_deref().or_else(|| AuthConfig::credential_from_headers(&headers));
    if !state.auth.verify(candidate) {
        warn!("socket handshake rejected: missing or invalid apiKey");
        return unauthorised();
    }
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| serve_connection(socket, dispatcher))
}

/// Drive one connection until the peer goes away.
pub async fn serve_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let conn_id = Uuid::new_v4();
    info!("socket {} connected", conn_id);
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Write loop
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("socket {}: cannot encode frame: {}", conn_id, e),
            }
        }
    });

    // Read loop
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Binary(b)) => match String::from_utf8(b) {
                Ok(t) => t,
                Err(_) => {
                    let _ = out_tx.send(bad_frame("binary frames must be utf-8 json"));
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("socket {} read error: {}", conn_id, e);
                break;
            }
        };
        route_frame(&dispatcher, &text, &out_tx);
    }

    // listener relays still hold senders; stop writing explicitly
    writer.abort();
    info!("socket {} closed", conn_id);
}

fn bad_frame(message: impl Into<String>) -> ServerFrame {
    ServerFrame::failure(None, None, ErrorBody { code: "bad_frame".into(), message: message.into() })
}

fn relay_for(out: mpsc::UnboundedSender<ServerFrame>, method: String, listener_id: String) -> Relay {
    // fails once the connection's writer is gone
    Arc::new(move |data| out.send(ServerFrame::Event { method: method.clone(), listener_id: listener_id.clone(), data }).is_ok())
}

/// Decode one frame, decide how to route it, and spawn the invocation.
pub fn route_frame(dispatcher: &Dispatcher, text: &str, out: &mpsc::UnboundedSender<ServerFrame>) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            let _ = out.send(bad_frame(format!("invalid frame: {}", e)));
            return;
        }
    };
    let ClientFrame { id, kind, method, args } = frame;

    let (prepared, listener_id) = match kind {
        FrameKind::Call => (dispatcher.prepare_call(&method, args), None),
        FrameKind::Listen => {
            let listener_id = Uuid::new_v4().to_string();
            let relay = relay_for(out.clone(), method.clone(), listener_id.clone());
            (dispatcher.prepare_listen(&method, args, relay), Some(listener_id))
        }
    };
    let prepared = match prepared {
        Ok(p) => p,
        Err(e) => {
            let _ = out.send(ServerFrame::failure(id, Some(method), ErrorBody::from(&e)));
            return;
        }
    };

    let out = out.clone();
    tokio::spawn(async move {
        let frame = match prepared.run().await {
            Ok(result) => ServerFrame::success(id, method, result, listener_id),
            Err(e) => failure_frame(id, method, &e),
        };
        let _ = out.send(frame);
    });
}

fn failure_frame(id: Option<Value>, method: String, e: &GatewayError) -> ServerFrame {
    ServerFrame::failure(id, Some(method), ErrorBody::from(e))
}

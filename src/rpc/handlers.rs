use crate::client::{Handler, MethodRecord, MethodRegistry, Relay};
use crate::client::registry::MethodFuture;
use crate::rpc::args::normalize_args;
use crate::utils::{GatewayError, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error payload shared by the HTTP and socket transports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&GatewayError> for ErrorBody {
    fn from(e: &GatewayError) -> Self {
        Self { code: e.code().to_string(), message: e.to_string() }
    }
}

/// HTTP response envelope: `{"success": bool, "response"?: ..., "error"?: ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ApiResponse {
    pub fn ok(v: Value) -> Self {
        Self { success: true, response: Some(v), error: None }
    }
    pub fn err(e: &GatewayError) -> Self {
        Self { success: false, response: None, error: Some(e.into()) }
    }
}

pub fn status_for(e: &GatewayError) -> StatusCode {
    match e {
        GatewayError::UnknownMethod(_) => StatusCode::NOT_FOUND,
        GatewayError::InvalidArguments { .. }
        | GatewayError::ListenerMismatch { .. }
        | GatewayError::Invocation { .. } => StatusCode::BAD_REQUEST,
        GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(ApiResponse::err(&self))).into_response()
    }
}

/// A resolved invocation whose routing decision is already made.
pub struct PreparedCall {
    method: String,
    future: MethodFuture,
}

impl PreparedCall {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Run the client method in its own task; errors and panics stay with this caller.
    pub async fn run(self) -> Result<Value> {
        let method = self.method;
        match tokio::spawn(self.future).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                debug!("{} failed: {:#}", method, e);
                Err(GatewayError::Invocation { method, message: format!("{:#}", e) })
            }
            Err(join) => {
                warn!("{} did not complete: {}", method, join);
                let message = if join.is_panic() { "method panicked" } else { "method was cancelled" };
                Err(GatewayError::Invocation { method, message: message.to_string() })
            }
        }
    }
}

/// Resolves method names against the registry and invokes them.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    fn lookup(&self, method: &str) -> Result<&MethodRecord> {
        self.registry.get(method).ok_or_else(|| GatewayError::UnknownMethod(method.to_string()))
    }

    /// Resolve a one-shot call without running it.
    pub fn prepare_call(&self, method: &str, raw: Option<Value>) -> Result<PreparedCall> {
        let rec = self.lookup(method)?;
        let Handler::Action(f) = &rec.handler else {
            return Err(GatewayError::ListenerMismatch {
                method: method.to_string(),
                reason: "listener methods must be registered with a listen request".into(),
            });
        };
        let args = normalize_args(&rec.descriptor, raw)?;
        Ok(PreparedCall { method: method.to_string(), future: f(args) })
    }

    /// Resolve a listener registration without running it.
    pub fn prepare_listen(&self, method: &str, raw: Option<Value>, relay: Relay) -> Result<PreparedCall> {
        let rec = self.lookup(method)?;
        let Handler::Listener(f) = &rec.handler else {
            return Err(GatewayError::ListenerMismatch {
                method: method.to_string(),
                reason: "not a listener; send a call request instead".into(),
            });
        };
        let args = normalize_args(&rec.descriptor, raw)?;
        Ok(PreparedCall { method: method.to_string(), future: f(relay, args) })
    }

    pub async fn call(&self, method: &str, raw: Option<Value>) -> Result<Value> {
        self.prepare_call(method, raw)?.run().await
    }

    pub async fn listen(&self, method: &str, raw: Option<Value>, relay: Relay) -> Result<Value> {
        self.prepare_listen(method, raw, relay)?.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let mut b = MethodRegistry::builder();
        b.action("pair", &["a", "b"], |args| async move { Ok(Value::Array(args)) });
        b.action("explode", &[], |_| async { Err(anyhow::anyhow!("client exploded")) });
        b.action("crash", &[], |args| async move {
            if args.is_empty() {
                panic!("bug in client");
            }
            Ok(Value::Null)
        });
        b.listener("onTick", &[], |relay, _| async move {
            relay(json!(1));
            Ok(json!("registered"))
        });
        Dispatcher::new(Arc::new(b.build().unwrap()))
    }

    #[tokio::test]
    async fn named_args_are_reordered_before_invocation() {
        let d = dispatcher();
        let out = d.call("pair", Some(json!({"b": 2, "a": 1}))).await.unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[tokio::test]
    async fn unknown_method_is_a_client_error() {
        let d = dispatcher();
        let err = d.call("nope", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownMethod(_)));
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);
        // still usable afterwards
        assert_eq!(d.call("pair", Some(json!([1]))).await.unwrap(), json!([1]));
    }

    #[tokio::test]
    async fn failures_and_panics_become_invocation_errors() {
        let d = dispatcher();
        let err = d.call("explode", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Invocation { ref message, .. } if message.contains("client exploded")));
        let err = d.call("crash", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Invocation { .. }));
        assert_eq!(d.call("pair", None).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn kind_mismatch_is_explicit() {
        let d = dispatcher();
        assert!(matches!(d.call("onTick", None).await, Err(GatewayError::ListenerMismatch { .. })));
        let relay: Relay = Arc::new(|_| true);
        assert!(matches!(d.listen("pair", None, relay).await, Err(GatewayError::ListenerMismatch { .. })));
    }

    #[tokio::test]
    async fn listen_relays_emissions() {
        let d = dispatcher();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let relay: Relay = Arc::new(move |v| tx.send(v).is_ok());
        assert_eq!(d.listen("onTick", None, relay).await.unwrap(), json!("registered"));
        assert_eq!(rx.recv().await.unwrap(), json!(1));
    }
}

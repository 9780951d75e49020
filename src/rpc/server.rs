use crate::docs::{self, CodegenProxy, GeneratedDocs};
use crate::rpc::auth::{require_api_key, AuthConfig, SOCKET_PATH};
use crate::rpc::handlers::{status_for, ApiResponse, Dispatcher};
use crate::rpc::socket::{socket_handler, SocketState};
use crate::stats::{self, StatsCollector};
use crate::utils::GatewayError;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Largest accepted request body. Media travels inline as base64.
pub const MAX_BODY_BYTES: usize = 200 * 1024 * 1024;

#[derive(Clone)]
struct HttpState {
    dispatcher: Dispatcher,
    session: Option<String>,
    stats: Option<StatsCollector>,
}

/// RpcServer ties the transports, the optional docs/stats routes and the
/// access-control layer into one router.
pub struct RpcServer {
    dispatcher: Dispatcher,
    auth: Arc<AuthConfig>,
    session_in_path: Option<String>,
    docs: Option<Arc<GeneratedDocs>>,
    explorer: bool,
    codegen: CodegenProxy,
    stats: Option<StatsCollector>,
}

impl RpcServer {
    pub fn new(dispatcher: Dispatcher, auth: AuthConfig) -> Self {
        Self {
            dispatcher,
            auth: Arc::new(auth),
            session_in_path: None,
            docs: None,
            explorer: true,
            codegen: CodegenProxy::new(docs::DEFAULT_CODEGEN_URL),
            stats: None,
        }
    }

    /// Serve methods at `/<session>/<method>` instead of `/<method>`.
    pub fn with_session_path(mut self, session: impl Into<String>) -> Self {
        self.session_in_path = Some(session.into());
        self
    }

    /// Serve the generated artifacts, and the explorer unless
    /// `without_explorer` is set.
    pub fn with_docs(mut self, docs: Arc<GeneratedDocs>) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn without_explorer(mut self) -> Self {
        self.explorer = false;
        self
    }

    pub fn with_codegen(mut self, codegen: CodegenProxy) -> Self {
        self.codegen = codegen;
        self
    }

    /// Stats are only mounted alongside a generated spec.
    pub fn with_stats(mut self, stats: StatsCollector) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn router(&self) -> Router {
        let http = HttpState {
            dispatcher: self.dispatcher.clone(),
            session: self.session_in_path.clone(),
            stats: self.docs.as_ref().and(self.stats.clone()),
        };
        let methods = match &self.session_in_path {
            Some(_) => Router::new().route("/:session/:method", post(invoke_in_session)),
            None => Router::new().route("/:method", post(invoke)),
        };
        let socket = Router::new().route(SOCKET_PATH, get(socket_handler)).with_state(SocketState {
            dispatcher: self.dispatcher.clone(),
            auth: self.auth.clone(),
        });

        let mut app = methods.with_state(http).merge(socket);
        if let Some(generated) = &self.docs {
            app = app.merge(docs::artifact_router(generated.clone(), self.codegen.clone()));
            if self.explorer {
                app = app.merge(docs::explorer_router(generated.clone()));
            }
            if let Some(collector) = &self.stats {
                app = app.merge(stats::router(collector.clone(), self.auth.clone()));
            }
        }

        app.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(middleware::from_fn_with_state(self.auth.clone(), require_api_key)),
        )
    }

    /// Serve on `listener` until `shutdown` flips to true.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = self.router();
        info!("gateway listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;
        info!("gateway stopped");
        Ok(())
    }
}

async fn invoke(State(st): State<HttpState>, Path(method): Path<String>, body: Bytes) -> Response {
    call_over_http(&st, method, body).await
}

async fn invoke_in_session(
    State(st): State<HttpState>,
    Path((session, method)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if st.session.as_deref() != Some(session.as_str()) {
        return GatewayError::UnknownMethod(format!("{}/{}", session, method)).into_response();
    }
    call_over_http(&st, method, body).await
}

/// Empty body means no arguments; anything else must be JSON.
fn parse_body(method: &str, body: &[u8]) -> Result<Option<Value>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| GatewayError::InvalidArguments { method: method.to_string(), reason: format!("body is not json: {}", e) })
}

async fn call_over_http(st: &HttpState, method: String, body: Bytes) -> Response {
    let started = Instant::now();
    let (result, raw) = match parse_body(&method, &body) {
        Ok(raw) => {
            let kept = st.stats.as_ref().and(raw.clone());
            (st.dispatcher.call(&method, raw).await, kept)
        }
        Err(e) => (Err(e), None),
    };
    let (status, response) = match result {
        Ok(v) => (StatusCode::OK, Json(ApiResponse::ok(v)).into_response()),
        Err(e) => (status_for(&e), e.into_response()),
    };
    if let Some(collector) = &st.stats {
        collector.record(&method, status.as_u16(), started.elapsed(), raw.as_ref());
    }
    response
}

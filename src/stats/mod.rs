//! Request statistics for the documented operations
//!
//! - per-operation request/error counters, status classes and latency,
//!   kept in a `MetricsRegistry`
//! - a bounded list of recent requests with blob arguments shortened
//! - `/swagger-stats/` landing page and `/swagger-stats/stats` JSON
//!   (HTTP Basic `admin:<key>` when a key is configured)

use crate::rpc::auth::AuthConfig;
use crate::utils::serde_helpers::{now_millis, truncate_fields};
use crate::utils::MetricsRegistry;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Argument fields that carry media payloads.
pub const BLOB_FIELDS: [&str; 6] = ["file", "base64", "image", "webpBase64", "durl", "thumbnail"];
pub const BLOB_PREVIEW_CHARS: usize = 25;
pub const RECENT_LIMIT: usize = 50;
pub const STATS_USER: &str = "admin";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub method: String,
    pub status: u16,
    pub duration_ms: u64,
    pub at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub requests: u64,
    pub errors: u64,
    pub status_classes: BTreeMap<String, u64>,
    pub total_ms: u64,
    pub avg_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub started_at: u64,
    pub requests: u64,
    pub errors: u64,
    pub undocumented: u64,
    pub operations: BTreeMap<String, OperationStats>,
    pub recent: Vec<RequestRecord>,
}

struct StatsInner {
    metrics: MetricsRegistry,
    operations: HashSet<String>,
    recent: Mutex<VecDeque<RequestRecord>>,
    started_at: u64,
}

#[derive(Clone)]
pub struct StatsCollector {
    inner: Arc<StatsInner>,
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

impl StatsCollector {
    pub fn new<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(StatsInner {
                metrics: MetricsRegistry::new(),
                operations: operations.into_iter().map(Into::into).collect(),
                recent: Mutex::new(VecDeque::with_capacity(RECENT_LIMIT)),
                started_at: now_millis(),
            }),
        }
    }

    pub fn record(&self, method: &str, status: u16, elapsed: Duration, args: Option<&Value>) {
        let m = &self.inner.metrics;
        m.inc_counter("total.requests");
        if status >= 400 {
            m.inc_counter("total.errors");
        }
        if !self.inner.operations.contains(method) {
            m.inc_counter("total.undocumented");
            return;
        }
        let ms = elapsed.as_millis() as u64;
        m.inc_counter(&format!("requests.{}", method));
        if status >= 400 {
            m.inc_counter(&format!("errors.{}", method));
        }
        m.inc_counter(&format!("status.{}.{}", method, status_class(status)));
        m.add_counter(&format!("latency_ms.{}", method), ms);

        let args = args.cloned().map(|mut v| {
            shorten_blobs(&mut v);
            v
        });
        let mut recent = self.inner.recent.lock();
        if recent.len() == RECENT_LIMIT {
            recent.pop_front();
        }
        recent.push_back(RequestRecord { method: method.to_string(), status, duration_ms: ms, at: now_millis(), args });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let m = &self.inner.metrics;
        let mut operations: BTreeMap<String, OperationStats> = BTreeMap::new();
        for (name, n) in m.counters_with_prefix("requests.") {
            operations.entry(name).or_default().requests = n;
        }
        for (name, n) in m.counters_with_prefix("errors.") {
            operations.entry(name).or_default().errors = n;
        }
        for (name, n) in m.counters_with_prefix("latency_ms.") {
            operations.entry(name).or_default().total_ms = n;
        }
        for (key, n) in m.counters_with_prefix("status.") {
            if let Some((name, class)) = key.rsplit_once('.') {
                operations.entry(name.to_string()).or_default().status_classes.insert(class.to_string(), n);
            }
        }
        for op in operations.values_mut() {
            op.avg_ms = if op.requests == 0 { 0 } else { op.total_ms / op.requests };
        }
        StatsSnapshot {
            started_at: self.inner.started_at,
            requests: m.counter("total.requests"),
            errors: m.counter("total.errors"),
            undocumented: m.counter("total.undocumented"),
            operations,
            recent: self.inner.recent.lock().iter().cloned().collect(),
        }
    }
}

/// Shorten media payloads in a request body, including inside an `args` envelope
/// or a positional list.
fn shorten_blobs(v: &mut Value) {
    match v {
        Value::Object(obj) => {
            if let Some(inner) = obj.get_mut("args") {
                shorten_blobs(inner);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(shorten_blobs),
        _ => return,
    }
    truncate_fields(v, &BLOB_FIELDS, BLOB_PREVIEW_CHARS);
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[derive(Clone)]
struct StatsState {
    collector: StatsCollector,
    auth: Arc<AuthConfig>,
}

async fn landing() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html><html><head><title>wa-gateway stats</title></head><body>\
         <h1>Request statistics</h1><p>JSON at <a href=\"/swagger-stats/stats\">/swagger-stats/stats</a>.</p>\
         </body></html>",
    )
}

async fn stats(State(st): State<StatsState>, headers: HeaderMap) -> Response {
    if st.auth.enabled() {
        let ok = matches!(basic_credentials(&headers), Some((user, pass)) if user == STATS_USER && st.auth.verify(Some(pass.as_str())));
        if !ok {
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"swagger-stats\"")],
                Json(serde_json::json!({ "error": "unauthorised" })),
            )
                .into_response();
        }
    }
    Json(st.collector.snapshot()).into_response()
}

pub fn router(collector: StatsCollector, auth: Arc<AuthConfig>) -> Router {
    Router::new()
        .route("/swagger-stats/", get(landing))
        .route("/swagger-stats", get(landing))
        .route("/swagger-stats/stats", get(stats))
        .with_state(StatsState { collector, auth })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    #[test]
    fn counts_per_operation() {
        let s = StatsCollector::new(["sendText", "getMe"]);
        s.record("sendText", 200, Duration::from_millis(10), None);
        s.record("sendText", 400, Duration::from_millis(30), None);
        s.record("nope", 404, Duration::from_millis(1), None);

        let snap = s.snapshot();
        assert_eq!(snap.requests, 3);
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.undocumented, 1);
        let op = &snap.operations["sendText"];
        assert_eq!((op.requests, op.errors, op.avg_ms), (2, 1, 20));
        assert_eq!(op.status_classes["4xx"], 1);
        assert!(!snap.operations.contains_key("getMe"));
    }

    #[test]
    fn recent_requests_are_bounded_and_blobs_shortened() {
        let s = StatsCollector::new(["sendImage"]);
        let blob = "x".repeat(500);
        for _ in 0..(RECENT_LIMIT + 5) {
            s.record("sendImage", 200, Duration::ZERO, Some(&json!({"args": {"to": "a", "file": blob, "thumbnail": ""}})));
        }
        let snap = s.snapshot();
        assert_eq!(snap.recent.len(), RECENT_LIMIT);
        let args = &snap.recent[0].args.as_ref().unwrap()["args"];
        assert_eq!(args["file"].as_str().unwrap().len(), BLOB_PREVIEW_CHARS);
        assert_eq!(args["thumbnail"], "EMPTY");
        assert_eq!(args["to"], "a");
    }

    #[tokio::test]
    async fn stats_endpoint_requires_basic_admin_key() {
        let s = StatsCollector::new(["getMe"]);
        let app = router(s, Arc::new(AuthConfig::new("k")));

        let denied = app
            .clone()
            .oneshot(Request::get("/swagger-stats/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let token = STANDARD.encode("admin:k");
        let ok = app
            .clone()
            .oneshot(
                Request::get("/swagger-stats/stats")
                    .header(header::AUTHORIZATION, format!("Basic {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&to_bytes(ok.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["requests"], 0);

        let landing = app.oneshot(Request::get("/swagger-stats/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(landing.status(), StatusCode::OK);
    }
}

//! HTTP transport, access control and documentation routes, driven in-process.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wa_gateway::client::{AutomationClient, EchoClient, MethodRegistry, RegistryBuilder};
use wa_gateway::docs::{self, DocsOptions};
use wa_gateway::events::EventBus;
use wa_gateway::node::{Gateway, GatewayConfig};
use wa_gateway::rpc::{AuthConfig, Dispatcher, RpcServer};
use wa_gateway::stats::StatsCollector;

const KEY: &str = "it-key";

fn app(key: Option<&str>) -> Router {
    let client = EchoClient::new("it", EventBus::new());
    let registry = Arc::new(MethodRegistry::from_client(client).unwrap());
    let generated = docs::generate(
        &registry,
        &DocsOptions {
            session_id: "it".into(),
            api_key: key.map(str::to_string),
            pre_auth: false,
            server_url: "http://localhost:8002".into(),
            docs_base: docs::DEFAULT_DOCS_BASE.into(),
            session_in_path: false,
        },
    )
    .unwrap();
    let ops: Vec<String> = generated.spec.paths.operations().map(|op| op.operation_id.clone()).collect();
    RpcServer::new(Dispatcher::new(registry), AuthConfig::from_option(key.map(str::to_string)))
        .with_docs(Arc::new(generated))
        .with_stats(StatsCollector::new(ops))
        .router()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn call(method: &str, key_header: Option<(&str, &str)>, body: Value) -> Request<Body> {
    let mut b = Request::post(format!("/{}", method)).header(header::CONTENT_TYPE, "application/json");
    if let Some((name, value)) = key_header {
        b = b.header(name, value);
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn key_is_required_on_method_routes() {
    let app = app(Some(KEY));

    let (status, body) = send(&app, call("getConnectionState", None, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(&body), json!({"error": "unauthorised"}));

    let (status, _) = send(&app, call("getConnectionState", Some(("key", "wrong")), json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for header_name in ["key", "api_key"] {
        let (status, body) = send(&app, call("getConnectionState", Some((header_name, KEY)), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"success": true, "response": "CONNECTED"}));
    }
}

#[tokio::test]
async fn named_arguments_are_positional_inside() {
    let app = app(None);
    let (status, body) = send(&app, call("sendText", None, json!({"content": "hello", "to": "4477@c.us"}))).await;
    assert_eq!(status, StatusCode::OK);
    let resp = &json_of(&body)["response"];
    assert_eq!(resp["to"], "4477@c.us");
    assert_eq!(resp["content"], "hello");

    let (status, body) = send(&app, call("sendText", None, json!({"args": ["4477@c.us", "hi"]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["response"]["content"], "hi");
}

#[tokio::test]
async fn client_errors_never_become_server_faults() {
    let app = app(None);

    let (status, body) = send(&app, call("doesNotExist", None, json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_of(&body)["error"]["code"], "unknown_method");

    let (status, body) = send(&app, call("fail", None, json!({"reason": "boom"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err = &json_of(&body)["error"];
    assert_eq!(err["code"], "invocation_failed");
    assert!(err["message"].as_str().unwrap().contains("boom"));

    let (status, body) = send(&app, call("onMessage", None, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["error"]["code"], "listener_mismatch");

    let (status, _) = send(&app, call("getConnectionState", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn docs_routes_serve_the_generated_artifacts() {
    let app = app(Some(KEY));

    let (status, body) = send(&app, Request::get("/api-docs/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("SwaggerUIBundle"));

    let resp = app.clone().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()[header::LOCATION], "/api-docs/");

    let (status, _) = send(&app, Request::get("/swagger.json").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Request::get("/swagger.json").header("api_key", KEY).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let spec = json_of(&body);
    assert_eq!(spec["openapi"], "3.0.3");
    assert_eq!(spec["components"]["securitySchemes"]["api_key"]["in"], "header");
    assert_eq!(spec["paths"]["/sendText"]["post"]["security"], json!([{"api_key": []}]));

    let (status, body) = send(&app, Request::get("/meta/postman.json").header("key", KEY).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["info"]["schema"], docs::collection::COLLECTION_SCHEMA);

    let (status, _) = send(&app, Request::get("/meta/graphql").header("key", KEY).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_track_http_calls() {
    let app = app(None);
    send(&app, call("sendText", None, json!({"to": "a", "content": "b"}))).await;
    send(&app, call("fail", None, json!({}))).await;

    let (status, body) = send(&app, Request::get("/swagger-stats/stats").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let stats = json_of(&body);
    assert_eq!(stats["requests"], 2);
    assert_eq!(stats["operations"]["fail"]["errors"], 1);
    assert_eq!(stats["operations"]["sendText"]["statusClasses"]["2xx"], 1);
}

#[tokio::test]
async fn media_bodies_larger_than_two_megabytes_are_served() {
    let app = app(None);
    // 4 MiB of base64 text, 3 MiB once decoded
    let file = format!("data:image/png;base64,{}", "QUFB".repeat(1024 * 1024));
    let req = call("sendImage", None, json!({"args": {"to": "4477@c.us", "file": file, "filename": "big.png"}}));
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["response"]["size"], 3 * 1024 * 1024);

    let (_, body) = send(&app, Request::get("/swagger-stats/stats").body(Body::empty()).unwrap()).await;
    let stats = json_of(&body);
    let recorded = &stats["recent"][0]["args"]["args"];
    assert_eq!(recorded["file"].as_str().map(str::len), Some(25));
    assert_eq!(recorded["filename"], "big.png");
}

/// A client whose surface cannot be turned into paths.
struct UnsafeNames;

impl AutomationClient for UnsafeNames {
    fn session_id(&self) -> &str {
        "broken"
    }

    fn register_methods(self: Arc<Self>, methods: &mut RegistryBuilder) {
        methods.action("get status", &[], |_| async { Ok(json!("fine")) });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn docs_failure_leaves_the_gateway_serving() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = GatewayConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        docs_dir: dir.path().to_path_buf(),
        stats: true,
        ..GatewayConfig::default()
    };
    let running = Gateway::new(cfg).start(Arc::new(UnsafeNames)).await.unwrap();
    assert!(running.docs().is_none());

    let base = format!("http://{}", running.local_addr);
    let http = reqwest::Client::new();
    for path in ["/swagger.json", "/api-docs/", "/swagger-stats/stats"] {
        let resp = http.get(format!("{}{}", base, path)).send().await.unwrap();
        assert!(resp.status().is_client_error(), "{} should not be mounted", path);
    }

    let resp = http.post(format!("{}/registerWebhook", base)).json(&json!(["http://127.0.0.1:9/x"])).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    running.stop().await.unwrap();
}

//! Gateway orchestration: wire bus, webhooks, method registry, docs, stats
//! and the RPC server for one client session.

use crate::client::{AutomationClient, MethodDocs, MethodRegistry, RegistryBuilder};
use crate::docs::{self, CodegenProxy, DocsOptions, GeneratedDocs};
use crate::events::EventBus;
use crate::node::config::GatewayConfig;
use crate::node::service_handle::ServiceHandle;
use crate::rpc::{AuthConfig, Dispatcher, RpcServer};
use crate::stats::StatsCollector;
use crate::webhook::{EventFilter, HttpWebhookSender, RequestConfig, WebhookDispatcher, WebhookRegistration, WebhookSender};
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Name of the built-in runtime registration method.
pub const REGISTER_WEBHOOK: &str = "registerWebhook";

/// One gateway instance. Owns its bus; nothing is shared between instances.
pub struct Gateway {
    cfg: GatewayConfig,
    bus: EventBus,
    sender: Arc<dyn WebhookSender>,
}

/// A started gateway. Dropping it leaves the server running; call `stop`.
pub struct RunningGateway {
    pub local_addr: SocketAddr,
    handle: ServiceHandle,
    webhooks: WebhookDispatcher,
    docs: Option<Arc<GeneratedDocs>>,
}

impl Gateway {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self::with_sender(cfg, Arc::new(HttpWebhookSender::new()))
    }

    /// Use a custom outbound transport for webhooks.
    pub fn with_sender(cfg: GatewayConfig, sender: Arc<dyn WebhookSender>) -> Self {
        Self { cfg, bus: EventBus::new(), sender }
    }

    /// Handle clients publish their events on.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    /// Build the registry, attach webhooks, generate docs, bind and serve.
    ///
    /// Configuration and descriptor errors fail here, before any traffic is
    /// accepted. Documentation failures only disable the docs routes.
    pub async fn start<C: AutomationClient>(self, client: Arc<C>) -> Result<RunningGateway> {
        self.cfg.validate()?;
        let session_id = client.session_id().to_string();

        let webhooks = WebhookDispatcher::new(self.bus.clone(), self.sender.clone(), self.cfg.allow_sensitive_webhook_data);
        let regs = self.cfg.all_webhooks().context("loading webhook registrations")?;
        webhooks.attach(regs)?;

        let mut builder = MethodRegistry::builder();
        register_builtins(&mut builder, webhooks.clone());
        client.register_methods(&mut builder);
        let registry = Arc::new(builder.build()?);
        info!("session {}: {} methods exposed", session_id, registry.len());

        let listener = TcpListener::bind(self.cfg.bind).await.with_context(|| format!("binding {}", self.cfg.bind))?;
        let local_addr = listener.local_addr()?;

        let docs = if self.cfg.needs_spec() {
            self.build_docs(&registry, &session_id, local_addr).await
        } else {
            None
        };

        let auth = AuthConfig::from_option(self.cfg.api_key.clone());
        let mut server = RpcServer::new(Dispatcher::new(registry), auth);
        if self.cfg.use_session_id_in_path {
            server = server.with_session_path(session_id.clone());
        }
        if let Some(generated) = &docs {
            server = server.with_docs(generated.clone()).with_codegen(CodegenProxy::new(self.cfg.codegen_url.clone()));
            if !self.cfg.generate_api_docs {
                server = server.without_explorer();
            }
            if self.cfg.stats {
                let ops = generated.spec.paths.operations().map(|op| op.operation_id.clone());
                server = server.with_stats(StatsCollector::new(ops));
            }
        }

        let mut handle = ServiceHandle::new();
        let shutdown_rx = handle.shutdown_rx();
        handle.spawn("rpc-server", server.serve(listener, shutdown_rx));

        info!("gateway for session {} started on {}", session_id, local_addr);
        Ok(RunningGateway { local_addr, handle, webhooks, docs })
    }

    async fn build_docs(&self, registry: &MethodRegistry, session_id: &str, bound: SocketAddr) -> Option<Arc<GeneratedDocs>> {
        let opts = DocsOptions {
            session_id: session_id.to_string(),
            api_key: self.cfg.effective_api_key().map(str::to_string),
            pre_auth: self.cfg.pre_auth_docs,
            server_url: self.cfg.server_url(bound),
            docs_base: self.cfg.docs_base.clone().unwrap_or_else(|| docs::DEFAULT_DOCS_BASE.to_string()),
            session_in_path: self.cfg.use_session_id_in_path,
        };
        let generated = match docs::generate(registry, &opts) {
            Ok(g) => g,
            Err(e) => {
                warn!("api docs disabled: {}", e);
                return None;
            }
        };
        if let Err(e) = docs::persist(&generated, &self.cfg.docs_dir, session_id, self.cfg.skip_save_collection).await {
            warn!("api docs disabled: cannot write artifacts: {}", e);
            return None;
        }
        if self.cfg.generate_api_docs {
            info!("api docs: {}/api-docs/", opts.server_url);
        } else {
            info!("api spec: {}/swagger.json", opts.server_url);
        }
        Some(Arc::new(generated))
    }
}

impl RunningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn webhooks(&self) -> &WebhookDispatcher {
        &self.webhooks
    }

    pub fn docs(&self) -> Option<&Arc<GeneratedDocs>> {
        self.docs.as_ref()
    }

    /// False once the server task has exited on its own.
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Signal graceful shutdown and wait for the server task.
    pub async fn stop(self) -> Result<()> {
        info!("stopping gateway on {}", self.local_addr);
        self.handle.shutdown().await
    }
}

/// Methods the gateway contributes to every client surface.
fn register_builtins(b: &mut RegistryBuilder, webhooks: WebhookDispatcher) {
    b.action(REGISTER_WEBHOOK, &["url", "events", "requestConfig"], move |args| {
        let webhooks = webhooks.clone();
        async move {
            let url = args.first().and_then(Value::as_str).ok_or_else(|| anyhow!("url must be a string"))?;
            let events: EventFilter = match args.get(1) {
                None | Some(Value::Null) => EventFilter::All,
                Some(v) => serde_json::from_value(v.clone()).context("events")?,
            };
            let request_config: RequestConfig = match args.get(2) {
                None | Some(Value::Null) => RequestConfig::default(),
                Some(v) => serde_json::from_value(v.clone()).context("requestConfig")?,
            };
            let reg = WebhookRegistration { url: url.to_string(), events, request_config };
            let id = webhooks.register(reg.clone())?;
            Ok(json!({ "id": id, "url": reg.url, "events": reg.events }))
        }
    });
    b.document(
        REGISTER_WEBHOOK,
        MethodDocs::summary("Register a webhook receiving events from this session.")
            .with_example("url", json!("https://example.com/hook"))
            .with_example("events", json!(["onMessage"]))
            .with_example("requestConfig", json!({ "headers": { "x-token": "secret" } })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EchoClient;

    fn config(dir: &std::path::Path) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            session_id: "unit".into(),
            docs_dir: dir.to_path_buf(),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn start_persists_docs_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Gateway::new(config(dir.path()));
        let client = EchoClient::new("unit", gw.bus());
        let running = gw.start(client).await.unwrap();
        assert_ne!(running.local_addr.port(), 0);
        let docs = running.docs().unwrap();
        assert!(docs.spec.paths.get("/registerWebhook").is_some());
        assert!(dir.path().join("wa-gateway-unit.openapi.json").exists());
        assert!(running.is_running());
        running.stop().await.unwrap();
    }

    #[tokio::test]
    async fn register_webhook_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.generate_api_docs = false;
        let gw = Gateway::new(cfg);
        let client = EchoClient::new("unit", gw.bus());
        let running = gw.start(client).await.unwrap();
        assert!(running.docs().is_none());

        let mut b = MethodRegistry::builder();
        register_builtins(&mut b, running.webhooks().clone());
        let d = Dispatcher::new(Arc::new(b.build().unwrap()));
        d.call(REGISTER_WEBHOOK, Some(json!({"url": "http://127.0.0.1:9/hook", "events": ["onMessage"]})))
            .await
            .unwrap();
        let err = d.call(REGISTER_WEBHOOK, Some(json!(["ftp://nope"]))).await.unwrap_err();
        assert!(matches!(err, crate::utils::GatewayError::Invocation { .. }));
        assert_eq!(running.webhooks().registrations().len(), 1);
        running.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stats_without_api_docs_still_generate_the_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.generate_api_docs = false;
        cfg.stats = true;
        let gw = Gateway::new(cfg);
        let client = EchoClient::new("unit", gw.bus());
        let running = gw.start(client).await.unwrap();
        assert!(running.docs().is_some());
        assert!(dir.path().join("wa-gateway-unit.openapi.json").exists());
        running.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_webhook_config_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.event_sink = Some("not-a-url".into());
        let gw = Gateway::new(cfg);
        let client = EchoClient::new("unit", gw.bus());
        assert!(gw.start(client).await.is_err());
    }
}

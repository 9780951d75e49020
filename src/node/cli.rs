use crate::client::EchoClient;
use crate::node::config::GatewayConfig;
use crate::node::gateway::Gateway;
use crate::rpc::auth::generate_api_key;
use crate::utils::init_logging;
use crate::webhook::WebhookRegistration;
use anyhow::Result;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, warn};

/// Read by a bare `-w`.
pub const DEFAULT_WEBHOOKS_FILE: &str = "webhooks.json";

/// CLI for running a gateway. Every flag can also be set through a `WA_`
/// environment variable.
#[derive(Parser, Debug)]
#[clap(name = "wa-gateway", version, about)]
pub struct Cli {
    /// TOML config file; flags override its values
    #[clap(short = 'c', long, env = "WA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session id, used in artifact names and optionally in paths
    #[clap(short = 's', long = "session-id", env = "WA_SESSION_ID")]
    pub session_id: Option<String>,

    #[clap(long, env = "WA_HOST")]
    pub host: Option<IpAddr>,

    #[clap(short = 'p', long, env = "WA_PORT")]
    pub port: Option<u16>,

    /// Shared API key. Pass `-k` without a value to generate one.
    #[clap(short = 'k', long = "key", env = "WA_KEY", num_args = 0..=1, default_missing_value = "")]
    pub key: Option<String>,

    /// URL receiving every event
    #[clap(long = "ev", env = "WA_EV")]
    pub event_sink: Option<String>,

    /// Webhook URL receiving every event, or a JSON file with an array of
    /// registrations. Bare `-w` reads `webhooks.json` if present.
    #[clap(short = 'w', long, env = "WA_WEBHOOKS", num_args = 0..=1, default_missing_value = "")]
    pub webhooks: Option<String>,

    /// Deliver sessionData events to webhooks
    #[clap(long = "allow-session-data-wh", env = "WA_ALLOW_SESSION_DATA_WH")]
    pub allow_session_data_webhook: bool,

    #[clap(long = "no-api-docs", env = "WA_NO_API_DOCS")]
    pub no_api_docs: bool,

    /// Embed the key into the explorer page
    #[clap(long = "pre-auth-docs", env = "WA_PRE_AUTH_DOCS")]
    pub pre_auth_docs: bool,

    #[clap(long, env = "WA_STATS")]
    pub stats: bool,

    #[clap(long = "use-session-id-in-path", env = "WA_USE_SESSION_ID_IN_PATH")]
    pub use_session_id_in_path: bool,

    /// Public host advertised in the generated spec
    #[clap(long = "api-host", env = "WA_API_HOST")]
    pub api_host: Option<String>,

    #[clap(long = "docs-dir", env = "WA_DOCS_DIR")]
    pub docs_dir: Option<PathBuf>,

    #[clap(long = "skip-save-postman-collection", env = "WA_SKIP_SAVE_POSTMAN_COLLECTION")]
    pub skip_save_collection: bool,

    /// swagger-codegen service used by `/meta/codegen/:language`
    #[clap(long = "codegen-url", env = "WA_CODEGEN_URL")]
    pub codegen_url: Option<String>,
}

impl Cli {
    /// Merge flags over the config file (or defaults).
    pub fn into_config(self) -> Result<GatewayConfig> {
        let mut cfg = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => GatewayConfig::default(),
        };
        if let Some(s) = self.session_id {
            cfg.session_id = s;
        }
        let host = self.host.unwrap_or(cfg.bind.ip());
        let port = self.port.unwrap_or(cfg.bind.port());
        cfg.bind = SocketAddr::new(host, port);
        match self.key {
            Some(k) if k.is_empty() => {
                let generated = generate_api_key();
                info!("generated api key: {}", generated);
                cfg.api_key = Some(generated);
            }
            Some(k) => cfg.api_key = Some(k),
            None => {}
        }
        if self.event_sink.is_some() {
            cfg.event_sink = self.event_sink;
        }
        match self.webhooks {
            None => {}
            Some(w) if w.is_empty() => {
                let default = PathBuf::from(DEFAULT_WEBHOOKS_FILE);
                if default.exists() {
                    cfg.webhooks_file = Some(default);
                } else {
                    warn!("-w given without a value and no {} found; no webhooks loaded", DEFAULT_WEBHOOKS_FILE);
                }
            }
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                cfg.webhooks.push(WebhookRegistration::all(url));
            }
            Some(path) => cfg.webhooks_file = Some(PathBuf::from(path)),
        }
        cfg.allow_sensitive_webhook_data |= self.allow_session_data_webhook;
        if self.no_api_docs {
            cfg.generate_api_docs = false;
        }
        cfg.pre_auth_docs |= self.pre_auth_docs;
        cfg.stats |= self.stats;
        cfg.use_session_id_in_path |= self.use_session_id_in_path;
        if self.api_host.is_some() {
            cfg.api_host = self.api_host;
        }
        if let Some(dir) = self.docs_dir {
            cfg.docs_dir = dir;
        }
        cfg.skip_save_collection |= self.skip_save_collection;
        if let Some(url) = self.codegen_url {
            cfg.codegen_url = url;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

pub async fn run_cli() -> Result<()> {
    init_logging();
    let cfg = Cli::parse().into_config()?;
    run(cfg).await
}

/// Serve the in-memory reference client until Ctrl+C.
pub async fn run(cfg: GatewayConfig) -> Result<()> {
    let gateway = Gateway::new(cfg);
    let client = EchoClient::new(gateway.config().session_id.clone(), gateway.bus());
    let running = gateway.start(client).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down gateway...");
    running.stop().await?;
    info!("gateway stopped");
    Ok(())
}

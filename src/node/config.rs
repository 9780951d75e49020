use crate::docs::DEFAULT_CODEGEN_URL;
use crate::utils::{GatewayError, Result};
use crate::webhook::{load_registrations, WebhookRegistration};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "127.0.0.1:8002";
pub const DEFAULT_SESSION_ID: &str = "session";

/// Everything the gateway consumes from its host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    pub session_id: String,
    /// Shared secret; `None` or empty disables access control.
    pub api_key: Option<String>,
    pub allow_sensitive_webhook_data: bool,
    pub webhooks: Vec<WebhookRegistration>,
    /// JSON array of registrations, merged after `webhooks`.
    pub webhooks_file: Option<PathBuf>,
    /// Receives every event (subject to redaction).
    pub event_sink: Option<String>,
    pub generate_api_docs: bool,
    pub pre_auth_docs: bool,
    pub stats: bool,
    pub use_session_id_in_path: bool,
    /// Public address advertised in the generated spec.
    pub api_host: Option<String>,
    pub docs_dir: PathBuf,
    pub docs_base: Option<String>,
    pub skip_save_collection: bool,
    /// swagger-codegen service behind `POST /meta/codegen/:language`.
    pub codegen_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8002)),
            session_id: DEFAULT_SESSION_ID.to_string(),
            api_key: None,
            allow_sensitive_webhook_data: false,
            webhooks: Vec::new(),
            webhooks_file: None,
            event_sink: None,
            generate_api_docs: true,
            pre_auth_docs: false,
            stats: false,
            use_session_id_in_path: false,
            api_host: None,
            docs_dir: PathBuf::from("."),
            docs_base: None,
            skip_save_collection: false,
            codegen_url: DEFAULT_CODEGEN_URL.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from a TOML file; absent keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: GatewayConfig = toml::from_str(&data).map_err(|e| GatewayError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(GatewayError::Config("session_id must not be empty".into()));
        }
        if self.use_session_id_in_path && !self.session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(GatewayError::Config(format!("session_id {:?} cannot be used in a path", self.session_id)));
        }
        for reg in &self.webhooks {
            reg.validate()?;
        }
        if !(self.codegen_url.starts_with("http://") || self.codegen_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!("codegen_url {:?} is not an http(s) url", self.codegen_url)));
        }
        Ok(())
    }

    /// Whether a spec is needed at all: for the explorer or for stats.
    pub fn needs_spec(&self) -> bool {
        self.generate_api_docs || self.stats
    }

    /// The key, with the empty string treated as unset.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Inline registrations, then the file's, then the event sink.
    pub fn all_webhooks(&self) -> Result<Vec<WebhookRegistration>> {
        let mut regs = self.webhooks.clone();
        if let Some(path) = &self.webhooks_file {
            regs.extend(load_registrations(path)?);
        }
        if let Some(url) = &self.event_sink {
            regs.push(WebhookRegistration::all(url.clone()));
        }
        Ok(regs)
    }

    /// Base URL clients should use, given the address actually bound.
    pub fn server_url(&self, bound: SocketAddr) -> String {
        match &self.api_host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None if bound.ip().is_unspecified() => format!("http://localhost:{}", bound.port()),
            None => format!("http://{}", bound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::EventFilter;
    use std::io::Write;

    #[test]
    fn toml_fills_defaults() {
        let cfg: GatewayConfig = toml::from_str(
            r#"
            session_id = "shop"
            api_key = "k"
            stats = true

            [[webhooks]]
            url = "http://hooks.local/a"
            events = ["onMessage"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session_id, "shop");
        assert!(cfg.generate_api_docs);
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.webhooks[0].events, EventFilter::Only(vec!["onMessage".into()]));
    }

    #[test]
    fn webhooks_merge_file_and_event_sink() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"url": "http://b.local/x", "events": "all"}}]"#).unwrap();
        let cfg = GatewayConfig {
            webhooks: vec![WebhookRegistration::all("http://a.local")],
            webhooks_file: Some(file.path().to_path_buf()),
            event_sink: Some("http://sink.local/ev".into()),
            ..GatewayConfig::default()
        };
        let urls: Vec<_> = cfg.all_webhooks().unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://a.local", "http://b.local/x", "http://sink.local/ev"]);
    }

    #[test]
    fn stats_alone_still_needs_a_spec() {
        let mut cfg = GatewayConfig { generate_api_docs: false, ..GatewayConfig::default() };
        assert!(!cfg.needs_spec());
        cfg.stats = true;
        assert!(cfg.needs_spec());
    }

    #[test]
    fn server_url_prefers_api_host() {
        let bound: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let mut cfg = GatewayConfig::default();
        assert_eq!(cfg.server_url(bound), "http://localhost:9000");
        cfg.api_host = Some("api.example.com/".into());
        assert_eq!(cfg.server_url(bound), "http://api.example.com");
        cfg.api_host = Some("https://api.example.com".into());
        assert_eq!(cfg.server_url(bound), "https://api.example.com");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cfg = GatewayConfig { session_id: " ".into(), ..GatewayConfig::default() };
        assert!(cfg.validate().is_err());
        let cfg = GatewayConfig { session_id: "a/b".into(), use_session_id_in_path: true, ..GatewayConfig::default() };
        assert!(cfg.validate().is_err());
        let cfg = GatewayConfig { codegen_url: "codegen.local".into(), ..GatewayConfig::default() };
        assert!(cfg.validate().is_err());
        assert_eq!(GatewayConfig { api_key: Some(String::new()), ..GatewayConfig::default() }.effective_api_key(), None);
    }
}

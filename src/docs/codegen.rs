//! Client SDK generation through a remote swagger-codegen service.
//!
//! `POST /meta/codegen/:language` forwards the caller's generator options
//! together with the generated spec and relays the service's answer.

use crate::docs::openapi::ApiSpecDocument;
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CODEGEN_URL: &str = "https://codegen.openwa.dev/api/gen/clients";

/// Generator requests can take a while on the service side.
const CODEGEN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct CodegenProxy {
    client: reqwest::Client,
    base_url: String,
}

impl CodegenProxy {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Body sent upstream: caller options with `spec` set to our document.
    pub fn request_body(spec: &ApiSpecDocument, options: Option<Value>) -> Result<Value> {
        let mut body = match options {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => bail!("codegen options must be a json object, got {}", other),
        };
        body.insert("spec".to_string(), serde_json::to_value(spec)?);
        Ok(Value::Object(body))
    }

    pub async fn generate(&self, language: &str, spec: &ApiSpecDocument, options: Option<Value>) -> Result<Value> {
        if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            bail!("invalid language {:?}", language);
        }
        let body = Self::request_body(spec, options)?;
        let url = format!("{}/{}", self.base_url, language);
        debug!("codegen request to {}", url);
        let resp = self
            .client
            .post(&url)
            .timeout(CODEGEN_TIMEOUT)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("codegen service unreachable at {}", url))?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("codegen service answered {}: {}", status, text);
        }
        // Generators answer JSON; anything else is relayed as a string.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::openapi::{Paths, SpecInfo};
    use serde_json::json;

    fn spec() -> ApiSpecDocument {
        ApiSpecDocument {
            swagger: None,
            openapi: Some("3.0.3".into()),
            info: SpecInfo { title: "t".into(), description: String::new(), version: "0".into() },
            host: None,
            schemes: Vec::new(),
            servers: Vec::new(),
            paths: Paths::default(),
            components: None,
            security: Vec::new(),
            external_docs: None,
        }
    }

    #[test]
    fn options_are_kept_and_spec_wins() {
        let body = CodegenProxy::request_body(&spec(), Some(json!({"options": {"packageName": "wa"}, "spec": "stale"}))).unwrap();
        assert_eq!(body["options"]["packageName"], "wa");
        assert!(body["spec"].is_object());

        let body = CodegenProxy::request_body(&spec(), None).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 1);
        assert!(CodegenProxy::request_body(&spec(), Some(json!([1]))).is_err());
    }

    #[tokio::test]
    async fn language_must_be_a_plain_name() {
        let proxy = CodegenProxy::new("http://127.0.0.1:9/");
        assert_eq!(proxy.base_url(), "http://127.0.0.1:9");
        let err = proxy.generate("../admin", &spec(), None).await.unwrap_err();
        assert!(err.to_string().contains("invalid language"));
    }
}

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// Static shared-secret auth.
/// Requests carry the key in header `key` or `api_key`; sockets in the `apiKey` handshake field.
///
/// No rotation, no scoping, no expiry. With no key configured everything is allowed.
#[derive(Clone, Default)]
pub struct AuthConfig {
    api_key: Option<Arc<str>>,
}

/// Headers accepted as the HTTP credential, in lookup order.
pub const KEY_HEADERS: [&str; 2] = ["key", "api_key"];

/// Paths whose landing pages load without a key.
pub const EXEMPT_PREFIXES: [&str; 2] = ["/api-docs", "/swagger-stats"];

/// Socket endpoint; authenticated by its own handshake check.
pub const SOCKET_PATH: &str = "/socket";

impl AuthConfig {
    pub fn disabled() -> Self {
        Self { api_key: None }
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self { api_key: Some(Arc::from(key.into())) }
    }

    /// `None` and the empty string both mean "no key".
    pub fn from_option(key: Option<String>) -> Self {
        match key {
            Some(k) if !k.is_empty() => Self::new(k),
            _ => Self::disabled(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Compare `candidate` with the configured key in constant time.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        let Some(expected) = &self.api_key else {
            return true;
        };
        let Some(candidate) = candidate else {
            return false;
        };
        let a = Sha256::digest(expected.as_bytes());
        let b = Sha256::digest(candidate.as_bytes());
        a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }

    pub fn credential_from_headers(headers: &HeaderMap) -> Option<&str> {
        KEY_HEADERS
            .iter()
            .find_map(|h| headers.get(*h))
            .and_then(|v| v.to_str().ok())
    }
}

pub fn is_exempt(method: &Method, path: &str) -> bool {
    (method == Method::GET && path == "/")
        || path == SOCKET_PATH
        || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Generate a fresh random key (32 hex chars).
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn unauthorised() -> Response {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "unauthorised" }))).into_response()
}

/// Middleware applying the shared key to every non-exempt route.
pub async fn require_api_key(State(auth): State<Arc<AuthConfig>>, req: Request, next: Next) -> Response {
    if !auth.enabled() || is_exempt(req.method(), req.uri().path()) {
        return next.run(req).await;
    }
    if !auth.verify(AuthConfig::credential_from_headers(req.headers())) {
        warn!("rejected {} {}: missing or invalid api key", req.method(), req.uri().path());
        return unauthorised();
    }
    next.run(req).await
}

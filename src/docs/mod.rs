//! Contract generation
//!
//! - `collection`: request collection built from the method registry
//! - `openapi`: document model and collection -> swagger conversion
//! - `postprocess`: security, examples, sorting, version marker
//! - `explorer`: swagger-ui page
//! - `codegen`: client generation through a remote codegen service
//!
//! `generate` runs the pipeline once; `persist` writes the artifacts;
//! `artifact_router` serves the raw documents and codegen, `explorer_router`
//! the interactive page. Generation is best-effort: callers log a failure and
//! run without documentation routes.

pub mod codegen;
pub mod collection;
pub mod explorer;
pub mod openapi;
pub mod postprocess;

pub use codegen::{CodegenProxy, DEFAULT_CODEGEN_URL};
pub use collection::{build_collection, Collection, CollectionOptions};
pub use openapi::{convert, ApiSpecDocument};
pub use postprocess::{postprocess, PostProcessOptions};

use crate::client::MethodRegistry;
use crate::rpc::handlers::ApiResponse;
use crate::utils::{GatewayError, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_DOCS_BASE: &str = "https://docs.openwa.dev/docs/api/classes/api_Client.Client";

#[derive(Debug, Clone)]
pub struct DocsOptions {
    pub session_id: String,
    pub api_key: Option<String>,
    pub pre_auth: bool,
    /// Public base URL of the gateway.
    pub server_url: String,
    pub docs_base: String,
    pub session_in_path: bool,
}

/// Output of one pipeline run. Serialized forms are computed once.
#[derive(Debug, Clone)]
pub struct GeneratedDocs {
    pub collection: Collection,
    pub spec: ApiSpecDocument,
    pub collection_json: String,
    pub spec_json: String,
    pub explorer_html: String,
}

pub fn generate(registry: &MethodRegistry, opts: &DocsOptions) -> Result<GeneratedDocs> {
    let with_api_key = opts.api_key.is_some();
    let collection = build_collection(
        registry,
        &CollectionOptions {
            session_id: opts.session_id.clone(),
            address: opts.server_url.clone(),
            session_in_path: opts.session_in_path,
            with_api_key,
            docs_base: opts.docs_base.clone(),
        },
    );
    let mut spec = convert(&collection)?;
    postprocess(
        &mut spec,
        &collection,
        &PostProcessOptions {
            with_api_key,
            server_url: opts.server_url.clone(),
            docs_base: opts.docs_base.clone(),
        },
    );

    let preauth = if opts.pre_auth { opts.api_key.as_deref() } else { None };
    let explorer_html = explorer::explorer_html(&spec.info.title, &spec, preauth)?;
    Ok(GeneratedDocs {
        collection_json: serde_json::to_string_pretty(&collection)?,
        spec_json: serde_json::to_string_pretty(&spec)?,
        collection,
        spec,
        explorer_html,
    })
}

pub fn spec_file_name(session_id: &str) -> String {
    format!("wa-gateway-{}.openapi.json", session_id)
}

pub fn collection_file_name(session_id: &str) -> String {
    format!("wa-gateway-{}.postman_collection.json", session_id)
}

/// Write the artifacts under `dir`; returns the written paths.
pub async fn persist(docs: &GeneratedDocs, dir: &FsPath, session_id: &str, skip_collection: bool) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::with_capacity(2);

    let spec_path = dir.join(spec_file_name(session_id));
    tokio::fs::write(&spec_path, docs.spec_json.as_bytes()).await?;
    written.push(spec_path);

    if !skip_collection {
        let collection_path = dir.join(collection_file_name(session_id));
        tokio::fs::write(&collection_path, docs.collection_json.as_bytes()).await?;
        written.push(collection_path);
    }
    info!("api docs written to {}", dir.display());
    Ok(written)
}

fn json_response(body: &str) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

#[derive(Clone)]
struct ArtifactState {
    docs: Arc<GeneratedDocs>,
    codegen: CodegenProxy,
}

async fn swagger_json(State(st): State<ArtifactState>) -> Response {
    json_response(&st.docs.spec_json)
}

async fn postman_json(State(st): State<ArtifactState>) -> Response {
    json_response(&st.docs.collection_json)
}

fn docs_error(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::err(&GatewayError::Docs(message)))).into_response()
}

async fn meta(State(st): State<ArtifactState>, Path(kind): Path<String>) -> Response {
    match kind.trim_end_matches(".json") {
        "swagger" => json_response(&st.docs.spec_json),
        "postman" => json_response(&st.docs.collection_json),
        other => docs_error(StatusCode::NOT_FOUND, format!("unknown collection type {}", other)),
    }
}

/// Body: optional generator options (swagger-codegen online format).
async fn codegen(State(st): State<ArtifactState>, Path(language): Path<String>, body: Bytes) -> Response {
    let options = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => Some(v),
            Err(e) => return docs_error(StatusCode::BAD_REQUEST, format!("codegen options are not json: {}", e)),
        }
    };
    match st.codegen.generate(&language, &st.docs.spec, options).await {
        Ok(generated) => Json(generated).into_response(),
        Err(e) => {
            warn!("codegen for {} failed: {:#}", language, e);
            docs_error(StatusCode::BAD_REQUEST, format!("{:#}", e))
        }
    }
}

async fn explorer(State(docs): State<Arc<GeneratedDocs>>) -> Html<String> {
    Html(docs.explorer_html.clone())
}

/// Raw artifacts and codegen. Mounted whenever a spec was generated.
pub fn artifact_router(docs: Arc<GeneratedDocs>, codegen: CodegenProxy) -> Router {
    Router::new()
        .route("/swagger.json", get(swagger_json))
        .route("/postman.json", get(postman_json))
        .route("/meta/:collection", get(meta))
        .route("/meta/codegen/:language", post(self::codegen))
        .with_state(ArtifactState { docs, codegen })
}

/// Interactive explorer, with `/` pointing at it.
pub fn explorer_router(docs: Arc<GeneratedDocs>) -> Router {
    Router::new()
        .route("/api-docs/", get(explorer))
        .route("/api-docs", get(|| async { Redirect::permanent("/api-docs/") }))
        .route("/", get(|| async { Redirect::temporary("/api-docs/") }))
        .with_state(docs)
}

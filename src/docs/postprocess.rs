use crate::docs::collection::Collection;
use crate::docs::openapi::{
    ApiSpecDocument, Components, ExternalDocs, MediaType, RequestBody, SecurityRequirement, SecurityScheme, Server,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub const OPENAPI_VERSION: &str = "3.0.3";
pub const API_KEY_SCHEME: &str = "api_key";

#[derive(Debug, Clone)]
pub struct PostProcessOptions {
    pub with_api_key: bool,
    pub server_url: String,
    pub docs_base: String,
}

fn api_key_requirement() -> SecurityRequirement {
    BTreeMap::from([(API_KEY_SCHEME.to_string(), Vec::new())])
}

/// Finish a converted document in place.
///
/// Steps, in order: security on every operation (only with a key), external
/// docs per operation from the collection entry, request bodies from the
/// example payloads (raw parameters dropped), paths sorted, then the version
/// marker and document level fields.
pub fn postprocess(doc: &mut ApiSpecDocument, collection: &Collection, opts: &PostProcessOptions) {
    // (a)
    for op in doc.paths.operations_mut() {
        op.security = if opts.with_api_key { vec![api_key_requirement()] } else { Vec::new() };
    }

    // (b)
    let doc_urls: HashMap<&str, &str> =
        collection.item.iter().map(|i| (i.name.as_str(), i.documentation_url.as_str())).collect();
    for op in doc.paths.operations_mut() {
        op.external_docs = doc_urls
            .get(op.operation_id.as_str())
            .map(|url| ExternalDocs { description: "Documentation".into(), url: url.to_string() });
    }

    // (c)
    for op in doc.paths.operations_mut() {
        let example = op
            .parameters
            .iter()
            .find(|p| p.location == "body")
            .and_then(|p| p.schema.as_ref())
            .and_then(|s| s.get("example"))
            .cloned();
        if let Some(example) = example {
            op.request_body = Some(RequestBody {
                required: true,
                content: BTreeMap::from([(
                    "application/json".to_string(),
                    MediaType { schema: json!({ "type": "object" }), example },
                )]),
            });
        }
        op.parameters.clear();
    }

    // (d)
    doc.paths.0.sort_by(|a, b| a.0.cmp(&b.0));

    // (e)
    doc.swagger = None;
    doc.openapi = Some(OPENAPI_VERSION.to_string());
    doc.host = None;
    doc.schemes.clear();
    doc.servers = vec![Server { url: opts.server_url.clone() }];
    doc.external_docs = Some(ExternalDocs { description: "Client documentation".into(), url: opts.docs_base.clone() });
    if opts.with_api_key {
        doc.components = Some(Components {
            security_schemes: BTreeMap::from([(
                API_KEY_SCHEME.to_string(),
                SecurityScheme { kind: "apiKey".into(), name: API_KEY_SCHEME.into(), location: "header".into() },
            )]),
        });
        doc.security = vec![api_key_requirement()];
    } else {
        doc.components = None;
        doc.security.clear();
    }
}

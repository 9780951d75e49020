//! Request collection (Postman v2.1 layout) derived from the method registry.

use crate::client::{MethodRecord, MethodRegistry};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const COLLECTION_SCHEMA: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Marker placed in the description of listener items.
pub const SOCKET_ONLY_NOTE: &str = "Listener registration: only available over the socket transport (`kind: \"listen\"`).";

#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub session_id: String,
    /// Base URL requests are addressed to, bound to the `address` variable.
    pub address: String,
    pub session_in_path: bool,
    /// Add the `api_key` header to every request.
    pub with_api_key: bool,
    pub docs_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub info: CollectionInfo,
    pub item: Vec<CollectionItem>,
    #[serde(default)]
    pub variable: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(rename = "_postman_id")]
    pub postman_id: String,
    pub name: String,
    pub description: String,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub name: String,
    pub request: ItemRequest,
    pub documentation_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub method: String,
    pub header: Vec<Header>,
    pub body: RawBody,
    pub url: ItemUrl,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBody {
    pub mode: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUrl {
    pub raw: String,
    pub host: Vec<String>,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

/// `{"args": {...}}` with the parameters in declaration order.
struct ExampleBody<'a>(&'a [(String, Value)]);

impl Serialize for ExampleBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Args<'b>(&'b [(String, Value)]);
        impl Serialize for Args<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
            }
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("args", &Args(self.0))?;
        map.end()
    }
}

/// Deterministic collection id so regeneration is byte-identical.
pub fn collection_id(session_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    format!("{}-{}-{}-{}-{}", &digest[0..8], &digest[8..12], &digest[12..16], &digest[16..20], &digest[20..32])
}

pub fn build_collection(registry: &MethodRegistry, opts: &CollectionOptions) -> Collection {
    let item = registry.records().map(|rec| build_item(rec, opts)).collect();
    Collection {
        info: CollectionInfo {
            postman_id: collection_id(&opts.session_id),
            name: format!("wa-gateway - {}", opts.session_id),
            description: format!("Requests for every method exposed by session {}.", opts.session_id),
            schema: COLLECTION_SCHEMA.to_string(),
        },
        item,
        variable: vec![Variable { key: "address".into(), value: opts.address.trim_end_matches('/').to_string() }],
    }
}

fn build_item(rec: &MethodRecord, opts: &CollectionOptions) -> CollectionItem {
    let name = rec.descriptor.name.clone();
    let examples: Vec<(String, Value)> = rec
        .descriptor
        .parameter_names
        .iter()
        .map(|p| {
            let v = rec.docs.example_args.get(p).cloned().unwrap_or_else(|| Value::String(format!("<{}>", p)));
            (p.clone(), v)
        })
        .collect();
    // serializing a map of strings to json values cannot fail
    let raw = serde_json::to_string_pretty(&ExampleBody(&examples)).unwrap_or_else(|_| "{}".to_string());

    let mut header = vec![Header { key: "Content-Type".into(), value: "application/json".into(), kind: "text".into() }];
    if opts.with_api_key {
        header.push(Header { key: "api_key".into(), value: "{{apiKey}}".into(), kind: "text".into() });
    }

    let mut path = Vec::with_capacity(2);
    if opts.session_in_path {
        path.push(opts.session_id.clone());
    }
    path.push(name.clone());

    let mut description = [rec.docs.summary.as_deref(), rec.docs.description.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n");
    if rec.descriptor.is_listener {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        description.push_str(SOCKET_ONLY_NOTE);
    }

    let documentation_url = rec
        .docs
        .documentation_url
        .clone()
        .unwrap_or_else(|| format!("{}#{}", opts.docs_base.trim_end_matches('/'), name.to_lowercase()));

    CollectionItem {
        name,
        request: ItemRequest {
            method: "POST".into(),
            header,
            body: RawBody { mode: "raw".into(), raw },
            url: ItemUrl {
                raw: format!("{{{{address}}}}/{}", path.join("/")),
                host: vec!["{{address}}".into()],
                path,
            },
            description,
        },
        documentation_url,
    }
}

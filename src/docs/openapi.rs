//! API specification document and the collection -> swagger conversion.
//!
//! Conversion yields a Swagger 2 shaped document; `postprocess` turns it into
//! the served OpenAPI 3 document.

use crate::client::descriptor::is_listener_name;
use crate::docs::collection::Collection;
use crate::utils::{GatewayError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiSpecDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swagger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openapi: Option<String>,
    pub info: SpecInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    pub paths: Paths,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
    #[serde(rename = "externalDocs", skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecInfo {
    pub title: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalDocs {
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
}

/// Path table; serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paths(pub Vec<(String, PathItem)>);

impl Paths {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&PathItem> {
        self.0.iter().find(|(k, _)| k == path).map(|(_, v)| v)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.0.iter().map(|(_, item)| &item.post)
    }

    pub fn operations_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        self.0.iter_mut().map(|(_, item)| &mut item.post)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Paths {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathItem {
    pub post: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, ResponseSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaType {
    pub schema: Value,
    pub example: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSpec {
    pub description: String,
}

pub const METHODS_TAG: &str = "methods";
pub const LISTENERS_TAG: &str = "listeners";

fn path_safe(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Convert a collection into a Swagger 2 shaped document, keeping item order.
pub fn convert(collection: &Collection) -> Result<ApiSpecDocument> {
    let mut seen = HashSet::new();
    let mut paths = Vec::with_capacity(collection.item.len());

    for item in &collection.item {
        if !path_safe(&item.name) {
            return Err(GatewayError::Docs(format!("item name {:?} cannot be used as a path", item.name)));
        }
        let path = format!("/{}", item.request.url.path.join("/"));
        if !seen.insert(path.clone()) {
            return Err(GatewayError::Docs(format!("duplicate path {}", path)));
        }
        let example: Value = serde_json::from_str(&item.request.body.raw)
            .map_err(|e| GatewayError::Docs(format!("{}: example body is not valid json: {}", item.name, e)))?;

        let mut parameters: Vec<Parameter> = item
            .request
            .header
            .iter()
            .filter(|h| !h.key.eq_ignore_ascii_case("content-type"))
            .map(|h| Parameter {
                name: h.key.clone(),
                location: "header".into(),
                required: true,
                example: Some(Value::String(h.value.clone())),
                schema: None,
            })
            .collect();
        parameters.push(Parameter {
            name: "body".into(),
            location: "body".into(),
            required: true,
            example: None,
            schema: Some(json!({ "type": "object", "example": example })),
        });

        let tag = if is_listener_name(&item.name) { LISTENERS_TAG } else { METHODS_TAG };
        let op = Operation {
            operation_id: item.name.clone(),
            summary: item.name.clone(),
            description: item.request.description.clone(),
            tags: vec![tag.to_string()],
            parameters,
            request_body: None,
            responses: BTreeMap::from([("200".to_string(), ResponseSpec { description: "OK".into() })]),
            security: Vec::new(),
            external_docs: None,
        };
        paths.push((path, PathItem { post: op }));
    }

    let host = collection
        .variable
        .iter()
        .find(|v| v.key == "address")
        .map(|v| v.value.trim_start_matches("https://").trim_start_matches("http://").to_string());

    Ok(ApiSpecDocument {
        swagger: Some("2.0".into()),
        openapi: None,
        info: SpecInfo {
            title: collection.info.name.clone(),
            description: collection.info.description.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        host,
        schemes: vec!["http".into()],
        servers: Vec::new(),
        paths: Paths(paths),
        components: None,
        security: Vec::new(),
        external_docs: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MethodRegistry;
    use crate::docs::collection::{build_collection, CollectionOptions};

    fn collection() -> Collection {
        let mut b = MethodRegistry::builder();
        b.action("zeta", &["a"], |_| async { Ok(Value::Null) });
        b.action("alpha", &[], |_| async { Ok(Value::Null) });
        b.listener("onAck", &[], |_, _| async { Ok(Value::Null) });
        let opts = CollectionOptions {
            session_id: "s".into(),
            address: "http://127.0.0.1:8002".into(),
            session_in_path: false,
            with_api_key: true,
            docs_base: "https://docs.example".into(),
        };
        build_collection(&b.build().unwrap(), &opts)
    }

    #[test]
    fn paths_follow_collection_order() {
        let doc = convert(&collection()).unwrap();
        assert_eq!(doc.paths.keys().collect::<Vec<_>>(), vec!["/zeta", "/alpha", "/onAck"]);
        assert_eq!(doc.host.as_deref(), Some("127.0.0.1:8002"));
        assert_eq!(doc.paths.get("/onAck").unwrap().post.tags, vec![LISTENERS_TAG]);
    }

    #[test]
    fn body_and_header_parameters_are_derived() {
        let doc = convert(&collection()).unwrap();
        let op = &doc.paths.get("/zeta").unwrap().post;
        let names: Vec<_> = op.parameters.iter().map(|p| (p.name.as_str(), p.location.as_str())).collect();
        assert_eq!(names, vec![("api_key", "header"), ("body", "body")]);
        assert_eq!(op.parameters[1].schema.as_ref().unwrap()["example"], json!({"args": {"a": "<a>"}}));
    }

    #[test]
    fn malformed_items_fail_conversion() {
        let mut c = collection();
        c.item[1].name = "bad name".into();
        assert!(matches!(convert(&c), Err(GatewayError::Docs(_))));

        let mut c = collection();
        c.item[1].request.url.path = vec!["zeta".into()];
        assert!(matches!(convert(&c), Err(GatewayError::Docs(m)) if m.contains("duplicate")));

        let mut c = collection();
        c.item[0].request.body.raw = "{".into();
        assert!(convert(&c).is_err());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Methods whose name starts with this attach a persistent callback.
pub const LISTENER_PREFIX: &str = "on";

/// Static description of one callable on the client surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub is_listener: bool,
}

impl MethodDescriptor {
    pub fn new<I, S>(name: impl Into<String>, parameter_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let is_listener = is_listener_name(&name);
        Self {
            name,
            parameter_names: parameter_names.into_iter().map(Into::into).collect(),
            is_listener,
        }
    }
}

pub fn is_listener_name(name: &str) -> bool {
    name.starts_with(LISTENER_PREFIX)
}

/// Optional documentation attached to a method, used by the contract pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDocs {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub documentation_url: Option<String>,
    /// Example value per parameter name.
    #[serde(default)]
    pub example_args: Map<String, Value>,
}

impl MethodDocs {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self { summary: Some(summary.into()), ..Self::default() }
    }

    pub fn with_example(mut self, param: &str, value: Value) -> Self {
        self.example_args.insert(param.to_string(), value);
        self
    }
}

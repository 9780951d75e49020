//! Argument normalisation: named or positional input -> positional list.

use crate::client::MethodDescriptor;
use crate::utils::{GatewayError, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Envelope key wrapping the real arguments (`{"args": ...}`).
pub const ARGS_KEY: &str = "args";

/// Resolve `raw` into the positional argument list for `desc`.
///
/// - absent / `null` -> no arguments
/// - array -> passed through untouched
/// - object -> reordered by `parameter_names`; absent names become `null`,
///   trailing absent ones are dropped, unknown keys are ignored
/// - `{"args": x}` is unwrapped first unless `args` is itself a parameter
pub fn normalize_args(desc: &MethodDescriptor, raw: Option<Value>) -> Result<Vec<Value>> {
    let raw = match raw {
        Some(Value::Object(obj)) if is_envelope(desc, &obj) => obj.into_iter().next().map(|(_, v)| v),
        other => other,
    };
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(list)) => Ok(list),
        Some(Value::Object(named)) => Ok(reorder(desc, named)),
        Some(other) => Err(GatewayError::InvalidArguments {
            method: desc.name.clone(),
            reason: format!("expected an object or an array, got {}", kind(&other)),
        }),
    }
}

fn is_envelope(desc: &MethodDescriptor, obj: &Map<String, Value>) -> bool {
    obj.len() == 1 && obj.contains_key(ARGS_KEY) && !desc.parameter_names.iter().any(|p| p == ARGS_KEY)
}

fn reorder(desc: &MethodDescriptor, mut named: Map<String, Value>) -> Vec<Value> {
    let mut out: Vec<Option<Value>> = desc.parameter_names.iter().map(|p| named.remove(p)).collect();
    if !named.is_empty() {
        debug!("{}: ignoring unknown arguments {:?}", desc.name, named.keys().collect::<Vec<_>>());
    }
    while matches!(out.last(), Some(None)) {
        out.pop();
    }
    out.into_iter().map(|v| v.unwrap_or(Value::Null)).collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

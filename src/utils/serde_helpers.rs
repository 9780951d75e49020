use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Serialize to JSON that can be inlined inside an HTML `<script>` element.
pub fn script_safe_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let raw = serde_json::to_string(value)?;
    Ok(raw
        .replace("</", "<\\/")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029"))
}

/// Shorten the string values stored under `keys` (top level of an object) to `max` chars.
/// Empty values become `"EMPTY"`.
pub fn truncate_fields(value: &mut Value, keys: &[&str], max: usize) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    for key in keys {
        if let Some(Value::String(s)) = obj.get_mut(*key) {
            if s.is_empty() {
                *s = "EMPTY".to_string();
            } else if s.chars().count() > max {
                *s = s.chars().take(max).collect();
            }
        }
    }
}

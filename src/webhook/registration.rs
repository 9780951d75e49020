use crate::utils::{GatewayError, Result};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Which events a sink wants: everything, or namespaces under the listed prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl EventFilter {
    pub fn accepts(&self, namespace: &str) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(prefixes) => prefixes.iter().any(|p| {
                namespace == p
                    || (namespace.len() > p.len()
                        && namespace.starts_with(p.as_str())
                        && namespace.as_bytes()[p.len()] == b'.')
            }),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, EventFilter::All)
    }
}

impl Serialize for EventFilter {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EventFilter::All => s.serialize_str("all"),
            EventFilter::Only(list) => list.serialize(s),
        }
    }
}

impl<'de> Deserialize<'de> for EventFilter {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Word(String),
            List(Vec<String>),
        }
        match Raw::deserialize(d)? {
            Raw::Word(w) if w.eq_ignore_ascii_case("all") => Ok(EventFilter::All),
            Raw::Word(w) => Ok(EventFilter::Only(vec![w])),
            Raw::List(list) if list.iter().any(|e| e.eq_ignore_ascii_case("all")) => Ok(EventFilter::All),
            Raw::List(list) if list.is_empty() => Err(de::Error::custom("event list must not be empty")),
            Raw::List(list) => Ok(EventFilter::Only(list)),
        }
    }
}

/// Per-sink transport options for the outbound POST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// An external HTTP sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub url: String,
    #[serde(default)]
    pub events: EventFilter,
    #[serde(default)]
    pub request_config: RequestConfig,
}

impl WebhookRegistration {
    pub fn all(url: impl Into<String>) -> Self {
        Self { url: url.into(), events: EventFilter::All, request_config: RequestConfig::default() }
    }

    pub fn only<I, S>(url: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            events: EventFilter::Only(prefixes.into_iter().map(Into::into).collect()),
            request_config: RequestConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(GatewayError::Config(format!("webhook url must be http(s): {}", self.url)));
        }
        Ok(())
    }
}

/// Load a JSON array of registrations (the `webhooks.json` format).
pub fn load_registrations<P: AsRef<Path>>(path: P) -> Result<Vec<WebhookRegistration>> {
    let data = fs::read_to_string(path)?;
    let regs: Vec<WebhookRegistration> = serde_json::from_str(&data)?;
    for r in &regs {
        r.validate()?;
    }
    Ok(regs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_prefixes_respect_segment_boundaries() {
        let f = EventFilter::Only(vec!["onMessage".into(), "qr".into()]);
        assert!(f.accepts("onMessage"));
        assert!(f.accepts("qr.update"));
        assert!(!f.accepts("onMessageDeleted"));
        assert!(!f.accepts("onAck"));
        assert!(EventFilter::All.accepts("anything.at.all"));
    }

    #[test]
    fn filter_deserializes_from_word_or_list() {
        let all: EventFilter = serde_json::from_value(json!("all")).unwrap();
        assert!(all.is_all());
        let list: EventFilter = serde_json::from_value(json!(["onMessage", "onAck"])).unwrap();
        assert_eq!(list, EventFilter::Only(vec!["onMessage".into(), "onAck".into()]));
        assert!(serde_json::from_value::<EventFilter>(json!([])).is_err());
        assert_eq!(serde_json::to_value(&EventFilter::All).unwrap(), json!("all"));
    }

    #[test]
    fn loads_webhooks_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webhooks.json");
        std::fs::write(
            &path,
            r#"[{"url":"http://localhost:9000/hook","events":["onMessage"],"requestConfig":{"headers":{"x-token":"t"}}},
               {"url":"https://example.com/all"}]"#,
        )
        .unwrap();
        let regs = load_registrations(&path).unwrap();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].request_config.headers.get("x-token").map(String::as_str), Some("t"));
        assert!(regs[1].events.is_all());
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(WebhookRegistration::all("ftp://nope").validate().is_err());
        assert!(WebhookRegistration::all("http://ok").validate().is_ok());
    }
}

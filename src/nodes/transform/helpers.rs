//! Shared helper functions for transform node executors.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::NodeError;
use crate::template::stringify_value;

/// Read HTTP response body with optional size limit.
pub(crate) async fn read_response_with_limit(
    resp: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<String, NodeError> {
    if let Some(limit) = max_bytes {
        if let Some(len) = resp.content_length() {
            if len as usize > limit {
                return Err(NodeError::HttpError(format!(
                    "HTTP response too large (max {} bytes, got {})",
                    limit, len
                )));
            }
        }
    }

    let mut stream = resp.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NodeError::HttpError(e.to_string()))?;
        if let Some(limit) = max_bytes {
            if buf.len() + chunk.len() > limit {
                return Err(NodeError::HttpError(format!(
                    "HTTP response too large (max {} bytes)",
                    limit
                )));
            }
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buf).to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct KeyValue {
    #[serde(alias = "name")]
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// A header or query parameter ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pair {
    pub key: String,
    pub value: String,
    /// Masked in request previews whatever the key is.
    pub sensitive: bool,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>, sensitive: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            sensitive,
        }
    }
}

/// Name/value pairs given either as an object or as `[{key, value}]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum KeyValues {
    Map(Map<String, Value>),
    List(Vec<KeyValue>),
}

impl Default for KeyValues {
    fn default() -> Self {
        KeyValues::Map(Map::new())
    }
}

impl KeyValues {
    /// Pairs with values stringified. Entries with an empty key are dropped.
    /// In the object form a value may itself be `{value, sensitive}`.
    pub fn pairs(&self) -> Vec<Pair> {
        let raw: Vec<(&str, &Value, bool)> = match self {
            KeyValues::Map(map) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::Object(inner)
                        if inner.get("sensitive").and_then(Value::as_bool) == Some(true) =>
                    {
                        (k.as_str(), inner.get("value").unwrap_or(&Value::Null), true)
                    }
                    _ => (k.as_str(), v, false),
                })
                .collect(),
            KeyValues::List(list) => list
                .iter()
                .map(|kv| (kv.key.as_str(), &kv.value, kv.sensitive))
                .collect(),
        };
        raw.into_iter()
            .filter(|(k, _, _)| !k.trim().is_empty())
            .map(|(k, v, sensitive)| Pair::new(k.trim(), stringify_value(v), sensitive))
            .collect()
    }
}

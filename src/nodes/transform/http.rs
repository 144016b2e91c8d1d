//! HTTP node executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::parse_config;
use crate::template::{mask_sensitive, stringify_value, MASK};

use super::helpers::{read_response_with_limit, KeyValues, Pair};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyType {
    #[default]
    Json,
    #[serde(alias = "raw_text", alias = "text")]
    Raw,
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AuthConfig {
    #[default]
    #[serde(alias = "no_auth")]
    None,
    #[serde(alias = "bearer_token")]
    Bearer { token: String },
    #[serde(alias = "basic_auth")]
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HttpConfig {
    method: String,
    url: String,
    headers: KeyValues,
    query: KeyValues,
    body: Option<Value>,
    body_type: BodyType,
    #[serde(alias = "authorization")]
    auth: AuthConfig,
    /// Per-request timeout in seconds. Falls back to the client default.
    timeout: Option<u64>,
    full_response: bool,
    #[serde(alias = "fail_on_error_status")]
    fail_on_error_status: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            url: String::new(),
            headers: KeyValues::default(),
            query: KeyValues::default(),
            body: None,
            body_type: BodyType::default(),
            auth: AuthConfig::default(),
            timeout: None,
            full_response: false,
            fail_on_error_status: false,
        }
    }
}

impl HttpConfig {
    fn header_pairs(&self) -> Vec<Pair> {
        let mut headers = self.headers.pairs();
        let auth_value = match &self.auth {
            AuthConfig::None => None,
            AuthConfig::Bearer { token } => Some(format!("Bearer {}", token)),
            AuthConfig::Basic { username, password } => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", encoded))
            }
        };
        if let Some(value) = auth_value {
            headers.retain(|p| !p.key.eq_ignore_ascii_case("authorization"));
            headers.push(Pair::new("Authorization", value, true));
        }
        headers
    }

    /// Body to send. JSON bodies given as strings are parsed when possible.
    fn body_payload(&self) -> Option<Value> {
        let body = self.body.as_ref().filter(|b| !b.is_null())?;
        match (self.body_type, body) {
            (BodyType::None, _) => None,
            (BodyType::Json, Value::String(text)) => Some(
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
            ),
            (BodyType::Json, other) => Some(other.clone()),
            (BodyType::Raw, other) => Some(Value::String(stringify_value(other))),
        }
    }
}

/// Secret-free view of the outgoing request, stored on the run record.
fn request_preview(
    method: &reqwest::Method,
    url: &str,
    query: &[Pair],
    headers: &[Pair],
    body: Option<&Value>,
) -> Value {
    let to_object = |pairs: &[Pair]| {
        Value::Object(
            pairs
                .iter()
                .map(|p| {
                    let shown = if p.sensitive { MASK } else { p.value.as_str() };
                    (p.key.clone(), Value::String(shown.to_string()))
                })
                .collect::<Map<String, Value>>(),
        )
    };
    mask_sensitive(&json!({
        "method": method.as_str(),
        "url": url,
        "query": to_object(query),
        "headers": to_object(headers),
        "body": body.cloned().unwrap_or(Value::Null),
    }))
}

/// Executor for HTTP nodes.
pub struct HttpNodeExecutor;

#[async_trait]
impl NodeExecutor for HttpNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: HttpConfig = parse_config(args.resolved_config, "http")?;

        let url = config.url.trim();
        if url.is_empty() {
            return Err(NodeError::ConfigError("HTTP url is required".to_string()));
        }
        let parsed_url = reqwest::Url::parse(url)
            .map_err(|e| NodeError::ConfigError(format!("Invalid url '{}': {}", url, e)))?;
        let method = reqwest::Method::from_bytes(config.method.trim().to_uppercase().as_bytes())
            .map_err(|_| NodeError::ConfigError(format!("Invalid HTTP method: {}", config.method)))?;

        let headers = config.header_pairs();
        let query = config.query.pairs();
        let body = config.body_payload();
        let preview = request_preview(&method, url, &query, &headers, body.as_ref());

        let client = args.context.http_client.client()?;
        let mut req_builder = client.request(method.clone(), parsed_url);
        if !query.is_empty() {
            let params: Vec<(&str, &str)> =
                query.iter().map(|p| (p.key.as_str(), p.value.as_str())).collect();
            req_builder = req_builder.query(&params);
        }
        for p in &headers {
            req_builder = req_builder.header(p.key.as_str(), p.value.as_str());
        }
        req_builder = match (config.body_type, body) {
            (BodyType::Json, Some(payload)) => req_builder.json(&payload),
            (_, Some(payload)) => req_builder.body(stringify_value(&payload)),
            (_, None) => req_builder,
        };
        if let Some(secs) = config.timeout {
            req_builder = req_builder.timeout(Duration::from_secs(secs));
        }

        tracing::debug!(step = args.step_key, method = %method, url = %url, "Sending HTTP request");
        let resp = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Timeout(format!("HTTP request to {} timed out", url))
            } else {
                NodeError::HttpError(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let resp_headers: Map<String, Value> = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Value::String(value.to_str().unwrap_or_default().to_string()),
                )
            })
            .collect();
        let text =
            read_response_with_limit(resp, Some(args.context.config.http_max_response_bytes))
                .await?;

        if config.fail_on_error_status && status >= 400 {
            return Err(NodeError::HttpStatus {
                status,
                message: text.chars().take(200).collect(),
            });
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        let output = if config.full_response {
            json!({
                "status": status,
                "headers": resp_headers,
                "body": body,
            })
        } else {
            body
        };

        Ok(NodeRunResult::plain(output)
            .with_status(status)
            .with_request_preview(preview))
    }
}

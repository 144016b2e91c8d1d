//! Flow document parser: converts JSON/YAML/TOML text into a [`FlowDocument`]
//! and back.

use std::collections::BTreeMap;
use std::path::Path;

use super::schema::{default_edge_id, FlowDocument, StepSchema, TokenMappings};
use crate::error::{WorkflowError, WorkflowResult};
use crate::template::extract_tokens;

/// Supported flow document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowFormat {
    /// JSON format (`.json`).
    Json,
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// TOML format (`.toml`).
    Toml,
}

impl FlowFormat {
    /// Guess the format from a file extension. Unknown extensions are JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => FlowFormat::Yaml,
            Some("toml") => FlowFormat::Toml,
            _ => FlowFormat::Json,
        }
    }
}

/// Parse flow content. Edges without an id get one derived from their
/// endpoints; `mappings` is dropped.
pub fn parse_flow(content: &str, format: FlowFormat) -> WorkflowResult<FlowDocument> {
    let mut doc: FlowDocument = match format {
        FlowFormat::Json => serde_json::from_str(content)
            .map_err(|e| WorkflowError::FlowParseError(e.to_string()))?,
        FlowFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| WorkflowError::FlowParseError(e.to_string()))?,
        FlowFormat::Toml => {
            // Go through serde_json::Value so config objects keep JSON types.
            let toml_val: toml::Value = toml::from_str(content)
                .map_err(|e| WorkflowError::FlowParseError(e.to_string()))?;
            serde_json::from_value(toml_value_to_json(toml_val))
                .map_err(|e| WorkflowError::FlowParseError(e.to_string()))?
        }
    };

    for edge in &mut doc.edges {
        if edge.id.is_empty() {
            edge.id = default_edge_id(&edge.source, &edge.target, edge.source_handle.as_deref());
        }
    }
    doc.mappings.clear();
    Ok(doc)
}

/// Read and parse a flow file, picking the format from its extension.
pub fn load_flow(path: impl AsRef<Path>) -> WorkflowResult<FlowDocument> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| WorkflowError::FlowParseError(format!("{}: {}", path.display(), e)))?;
    parse_flow(&content, FlowFormat::from_path(path))
}

/// Token index for every step that references other steps.
pub fn compute_mappings(steps: &[StepSchema]) -> TokenMappings {
    steps
        .iter()
        .filter_map(|step| {
            let tokens = extract_tokens(&step.config);
            (!tokens.is_empty()).then(|| (step.key.clone(), tokens))
        })
        .collect::<BTreeMap<_, _>>()
}

/// Serialize a flow, recomputing `mappings` from the step configs.
pub fn export_flow(doc: &FlowDocument, format: FlowFormat) -> WorkflowResult<String> {
    let mut doc = doc.clone();
    doc.mappings = compute_mappings(&doc.steps);
    match format {
        FlowFormat::Json => serde_json::to_string_pretty(&doc)
            .map_err(|e| WorkflowError::FlowExportError(e.to_string())),
        FlowFormat::Yaml => {
            serde_yaml::to_string(&doc).map_err(|e| WorkflowError::FlowExportError(e.to_string()))
        }
        FlowFormat::Toml => {
            let json_val = serde_json::to_value(&doc)
                .map_err(|e| WorkflowError::FlowExportError(e.to_string()))?;
            let toml_val = json_to_toml_value(json_val).ok_or_else(|| {
                WorkflowError::FlowExportError("flow has no TOML representation".to_string())
            })?;
            toml::to_string_pretty(&toml_val)
                .map_err(|e| WorkflowError::FlowExportError(e.to_string()))
        }
    }
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// TOML datetimes are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => {
            let map: serde_json::Map<String, serde_json::Value> = tbl
                .into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}

/// Convert JSON to TOML. TOML has no null, so null object members are
/// omitted and a top-level null yields `None`.
fn json_to_toml_value(val: serde_json::Value) -> Option<toml::Value> {
    match val {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(toml::Value::Boolean(b)),
        serde_json::Value::Number(n) => Some(match n.as_i64() {
            Some(i) => toml::Value::Integer(i),
            None => toml::Value::Float(n.as_f64().unwrap_or_default()),
        }),
        serde_json::Value::String(s) => Some(toml::Value::String(s)),
        serde_json::Value::Array(arr) => Some(toml::Value::Array(
            arr.into_iter().filter_map(json_to_toml_value).collect(),
        )),
        serde_json::Value::Object(map) => Some(toml::Value::Table(
            map.into_iter()
                .filter_map(|(k, v)| json_to_toml_value(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

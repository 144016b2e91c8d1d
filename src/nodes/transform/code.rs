//! Code node executor: user JavaScript on an embedded boa engine.
//!
//! The configured `code` is the body of a function receiving `input`,
//! `items` and `steps`. Whatever it returns becomes the step output.

use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_data, input_items, parse_config};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeConfig {
    #[serde(alias = "script", alias = "jsCode")]
    code: String,
}

/// Values handed to the user function.
#[derive(Debug, Clone)]
pub struct CodeInputs {
    pub input: Value,
    pub items: Vec<Value>,
    pub steps: Value,
}

/// JS string literal holding `value` as JSON text.
fn js_json_literal(value: &Value) -> NodeResult<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| NodeError::SerializationError(e.to_string()))?;
    serde_json::to_string(&json).map_err(|e| NodeError::SerializationError(e.to_string()))
}

/// Run `code` synchronously. Call from a blocking thread.
pub fn run_js(code: &str, inputs: &CodeInputs) -> NodeResult<Value> {
    let full_code = format!(
        r#"
(function() {{
    var input = JSON.parse({input});
    var items = JSON.parse({items});
    var steps = JSON.parse({steps});
    var __result = (function(input, items, steps) {{
{code}
    }})(input, items, steps);
    return JSON.stringify({{ "__output": __result === undefined ? null : __result }});
}})();
"#,
        input = js_json_literal(&inputs.input)?,
        items = js_json_literal(&Value::Array(inputs.items.clone()))?,
        steps = js_json_literal(&inputs.steps)?,
        code = code,
    );

    let mut context = Context::default();
    let result = context
        .eval(Source::from_bytes(&full_code))
        .map_err(|e| NodeError::CodeError(e.to_string()))?;

    let result_str = result
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| NodeError::CodeError("Code did not produce a JSON result".to_string()))?;

    let wrapper: Value = serde_json::from_str(&result_str)
        .map_err(|e| NodeError::SerializationError(format!("Failed to parse result: {}", e)))?;
    Ok(wrapper.get("__output").cloned().unwrap_or(Value::Null))
}

/// Executor for Code nodes.
pub struct CodeNodeExecutor;

#[async_trait]
impl NodeExecutor for CodeNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: CodeConfig = parse_config(args.config, "code")?;
        if config.code.trim().is_empty() {
            return Err(NodeError::ConfigError("Code is empty".to_string()));
        }

        let inputs = CodeInputs {
            input: input_data(&args),
            items: input_items(&args),
            steps: Value::Object(
                args.step_outputs
                    .entries()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<String, Value>>(),
            ),
        };
        let timeout = Duration::from_secs(args.context.config.code_timeout_secs);

        // boa is synchronous; the timeout stops waiting but cannot abort
        // the blocking thread.
        let task = tokio::task::spawn_blocking(move || run_js(&config.code, &inputs));
        let output = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| {
                NodeError::Timeout(format!(
                    "Code did not finish within {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| NodeError::ExecutionError(format!("Task join error: {}", e)))??;

        Ok(NodeRunResult::plain(output))
    }
}

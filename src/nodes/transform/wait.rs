use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_data, parse_config};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    #[serde(alias = "ms", alias = "millis")]
    Milliseconds,
    #[default]
    #[serde(alias = "s", alias = "sec", alias = "secs")]
    Seconds,
    #[serde(alias = "m", alias = "min", alias = "mins")]
    Minutes,
    #[serde(alias = "h", alias = "hour")]
    Hours,
}

impl WaitUnit {
    fn to_secs(self, amount: f64) -> f64 {
        match self {
            WaitUnit::Milliseconds => amount / 1000.0,
            WaitUnit::Seconds => amount,
            WaitUnit::Minutes => amount * 60.0,
            WaitUnit::Hours => amount * 3600.0,
        }
    }
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("amount is not a number: {}", s))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "amount is not a number: {}",
            other
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaitConfig {
    #[serde(deserialize_with = "lenient_amount")]
    amount: f64,
    unit: WaitUnit,
}

/// Pauses the flow, then passes the upstream output through unchanged.
pub struct WaitNodeExecutor;

#[async_trait]
impl NodeExecutor for WaitNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: WaitConfig = parse_config(args.resolved_config, "wait")?;
        if !config.amount.is_finite() {
            return Err(NodeError::ConfigError("Wait amount must be finite".to_string()));
        }

        let requested = config.unit.to_secs(config.amount).max(0.0);
        let cap = args.context.config.max_wait_secs as f64;
        if requested > cap {
            tracing::warn!(
                step = args.step_key,
                requested_secs = requested,
                cap_secs = cap,
                "Wait capped by engine limit"
            );
        }
        let waited = Duration::from_secs_f64(requested.min(cap));

        tokio::time::sleep(waited).await;

        Ok(NodeRunResult::plain(input_data(&args))
            .with_metadata(json!({ "waitedMs": waited.as_millis() as u64 })))
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Runtime;

use xflow::{EngineConfig, FakeIdGenerator, FakeTimeProvider, RuntimeContext};

pub fn bench_context() -> RuntimeContext {
    RuntimeContext::new(EngineConfig::default())
        .with_time_provider(Arc::new(FakeTimeProvider::new(1_700_000_000)))
        .with_id_generator(Arc::new(FakeIdGenerator::new("bench".into())))
}

pub fn bench_runtime() -> Runtime {
    Runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

/// `count` objects `{id, score, group}`.
pub fn make_items(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": i, "score": (i * 37) % 101, "group": format!("g{}", i % 7)}))
        .collect()
}

/// Manual source followed by `size` alternating filter/sort steps.
pub fn build_linear_flow(size: usize, items: usize) -> String {
    let mut steps = vec![json!({
        "key": "s0",
        "type": "manual",
        "config": {"data": make_items(items)}
    })];
    let mut edges = Vec::new();
    for i in 1..=size {
        let step = if i % 2 == 1 {
            json!({"key": format!("s{}", i), "type": "filter", "config": {
                "conditions": [{"field": "score", "fieldType": "number", "operator": "gte", "value": 5}]
            }})
        } else {
            json!({"key": format!("s{}", i), "type": "sort", "config": {"field": "score"}})
        };
        steps.push(step);
        edges.push(json!({"source": format!("s{}", i - 1), "target": format!("s{}", i)}));
    }
    json!({"steps": steps, "edges": edges}).to_string()
}

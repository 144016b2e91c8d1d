use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::dispatcher::EngineConfig;
use crate::core::http_client::HttpClientProvider;

/// Runtime context providing time, ID generation, shared HTTP client and
/// engine limits to node contracts.
#[derive(Clone)]
pub struct RuntimeContext {
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub http_client: Arc<HttpClientProvider>,
    pub config: Arc<EngineConfig>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl RuntimeContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            time_provider: Arc::new(RealTimeProvider::default()),
            id_generator: Arc::new(RealIdGenerator),
            http_client: Arc::new(HttpClientProvider::from_engine_config(&config)),
            config: Arc::new(config),
        }
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

// --- Real implementations ---

#[derive(Debug, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
pub struct RealIdGenerator;

impl IdGenerator for RealIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// --- Fake implementations ---

pub struct FakeTimeProvider {
    pub fixed: DateTime<Utc>,
}

impl FakeTimeProvider {
    /// Clock frozen at `fixed_timestamp` seconds since the epoch.
    pub fn new(fixed_timestamp: i64) -> Self {
        Self {
            fixed: Utc
                .timestamp_opt(fixed_timestamp, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.fixed
    }
}

pub struct FakeIdGenerator {
    pub prefix: String,
    pub counter: AtomicU64,
}

impl FakeIdGenerator {
    pub fn new(prefix: String) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for FakeIdGenerator {
    fn next_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, id)
    }
}

use std::sync::OnceLock;
use std::time::Duration;

use crate::core::dispatcher::EngineConfig;
use crate::error::{NodeError, NodeResult};

#[derive(Debug, Clone)]
pub struct HttpPoolConfig {
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub default_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            default_timeout: Duration::from_secs(30),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// Shared `reqwest::Client`, built on first use so contexts that never make
/// a request never pay for TLS setup.
#[derive(Debug)]
pub struct HttpClientProvider {
    client: OnceLock<reqwest::Client>,
    config: HttpPoolConfig,
}

impl Default for HttpClientProvider {
    fn default() -> Self {
        Self::new(HttpPoolConfig::default())
    }
}

impl HttpClientProvider {
    pub fn new(config: HttpPoolConfig) -> Self {
        Self {
            client: OnceLock::new(),
            config,
        }
    }

    pub fn from_engine_config(engine: &EngineConfig) -> Self {
        Self::new(HttpPoolConfig {
            default_timeout: Duration::from_secs(engine.http_timeout_secs),
            ..HttpPoolConfig::default()
        })
    }

    pub fn config(&self) -> &HttpPoolConfig {
        &self.config
    }

    fn build_client(config: &HttpPoolConfig) -> NodeResult<reqwest::Client> {
        reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .timeout(config.default_timeout)
            .build()
            .map_err(|e| NodeError::HttpError(e.to_string()))
    }

    pub fn client(&self) -> NodeResult<reqwest::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }
        let built = Self::build_client(&self.config)?;
        // keeps whichever client was stored first
        let _ = self.client.set(built.clone());
        Ok(built)
    }
}

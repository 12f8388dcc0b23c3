use serde::{Deserialize, Serialize};
use crate::proxy::forward::HttpClientParams;

/// Upstream connection reuse for transparent HTTP forwarding.
/// Top-level `http_pool` in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPoolConfig {
    /// Idle connection TTL before eviction (seconds). Default: 30.
    pub idle_timeout_secs: u64,
    /// Max idle connections kept per client session. Default: 2.
    pub max_idle: usize,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self { idle_timeout_secs: 30, max_idle: 2 }
    }
}

impl From<&HttpPoolConfig> for HttpClientParams {
    fn from(c: &HttpPoolConfig) -> Self {
        HttpClientParams {
            pool_idle_timeout_secs: c.idle_timeout_secs,
            pool_max_idle: c.max_idle,
        }
    }
}

use serde::{Deserialize, Serialize};
use crate::engine::buffer_pool::PoolParams;

/// Tier sizes for the shared relay buffer pool.
/// Top-level `buffer_pool` in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    pub small_size: usize,
    pub medium_size: usize,
    /// Used by the relay, one buffer per direction. Default: 32768.
    pub large_size: usize,
    pub max_idle_per_tier: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        let params = PoolParams::default();
        Self {
            small_size: params.small_size,
            medium_size: params.medium_size,
            large_size: params.large_size,
            max_idle_per_tier: params.max_idle_per_tier,
        }
    }
}

impl From<&BufferPoolConfig> for PoolParams {
    fn from(c: &BufferPoolConfig) -> Self {
        PoolParams {
            small_size: c.small_size,
            medium_size: c.medium_size,
            large_size: c.large_size,
            max_idle_per_tier: c.max_idle_per_tier,
        }
    }
}

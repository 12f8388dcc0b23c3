use serde::{Deserialize, Serialize};
use crate::proxy::buffer_params::ProxyBufferParams;

/// Request size limits for the HTTP front end.
/// Top-level `proxy_buffers` in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyBufferConfig {
    /// Largest accepted request head (bytes). Default: 65536.
    pub http_header_buf_size: usize,
    /// Largest accepted request body (bytes). Default: 16777216.
    pub http_body_max_size: usize,
}

impl Default for ProxyBufferConfig {
    fn default() -> Self {
        let params = ProxyBufferParams::default();
        Self {
            http_header_buf_size: params.http_header_buf_size,
            http_body_max_size: params.http_body_max_size,
        }
    }
}

impl From<&ProxyBufferConfig> for ProxyBufferParams {
    fn from(c: &ProxyBufferConfig) -> Self {
        ProxyBufferParams {
            http_header_buf_size: c.http_header_buf_size,
            http_body_max_size: c.http_body_max_size,
        }
    }
}

use serde::{Deserialize, Serialize};
use crate::transport::tcp_params::TcpParams;

/// TCP socket options applied to accepted and dialed streams.
/// Top-level `tcp` in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm (TCP_NODELAY). Default: true.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl From<&TcpConfig> for TcpParams {
    fn from(c: &TcpConfig) -> Self {
        TcpParams { nodelay: c.nodelay }
    }
}

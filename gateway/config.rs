use anyhow::Result;
use gateway_lib::config::{
    resolve_config_path, BufferPoolConfig, HttpPoolConfig, ProxyBufferConfig, TcpConfig,
};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfigFile {
    pub log_level: Option<String>,
    pub listen: ListenConfig,
    pub upstream: UpstreamConfig,
    pub tcp: TcpConfig,
    pub http_pool: HttpPoolConfig,
    pub buffer_pool: BufferPoolConfig,
    pub proxy_buffers: ProxyBufferConfig,
}

/// Where the HTTP proxy accepts clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub network: String,
    /// `:port` listens on all interfaces. Default: ":1081".
    pub address: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { network: "tcp".to_string(), address: ":1081".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    /// Tunnel every connection through a SOCKS5 server.
    Socks5,
    /// Connect to targets directly.
    Direct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub kind: UpstreamKind,
    pub network: String,
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            kind: UpstreamKind::Socks5,
            network: "tcp".to_string(),
            address: "127.0.0.1:1080".to_string(),
        }
    }
}

impl GatewayConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let path = resolve_config_path(path)?;
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: GatewayConfigFile = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

use anyhow::Result;

pub mod buffer_pool;
pub mod http_pool;
pub mod proxy_buffers;
pub mod tcp;

pub use buffer_pool::BufferPoolConfig;
pub use http_pool::HttpPoolConfig;
pub use proxy_buffers::ProxyBufferConfig;
pub use tcp::TcpConfig;

/// Resolve a config file path with a `../` fallback for running from a workspace subdirectory.
pub fn resolve_config_path(path: &str) -> Result<String> {
    if std::path::Path::new(path).exists() {
        return Ok(path.to_string());
    }
    let alt = format!("../{}", path);
    if std::path::Path::new(&alt).exists() {
        return Ok(alt);
    }
    Err(anyhow::anyhow!("Config file not found: {} (checked ./ and ../)", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer_pool::PoolParams;
    use crate::proxy::forward::HttpClientParams;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let pool: HttpPoolConfig = serde_yaml::from_str("max_idle: 8").unwrap();
        assert_eq!(pool.max_idle, 8);
        assert_eq!(pool.idle_timeout_secs, 30);

        let params = HttpClientParams::from(&pool);
        assert_eq!(params.pool_max_idle, 8);
        assert_eq!(params.pool_idle_timeout_secs, 30);
    }

    #[test]
    fn test_buffer_pool_config_maps_to_params() {
        let config: BufferPoolConfig = serde_yaml::from_str("large_size: 65536").unwrap();
        let params = PoolParams::from(&config);
        assert_eq!(params.large_size, 65536);
        assert_eq!(params.small_size, 2048);
        assert_eq!(params.max_idle_per_tier, 256);
    }

    #[test]
    fn test_proxy_buffer_defaults() {
        let config = ProxyBufferConfig::default();
        assert_eq!(config.http_header_buf_size, 65536);
        assert_eq!(config.http_body_max_size, 16 * 1024 * 1024);
        assert!(TcpConfig::default().nodelay);
    }

    #[test]
    fn test_resolve_missing_config() {
        assert!(resolve_config_path("no/such/gateway.yaml").is_err());
    }
}

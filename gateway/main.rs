use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use gateway_lib::infra::observability::init_tracing;
use gateway_lib::{
    BufferPool, Dialer, DirectDialer, HttpClientParams, HttpHandler, Listener, PoolParams,
    ProxyBufferParams, TcpParams, TunnelDialer,
};

mod config;

use config::{GatewayConfigFile, UpstreamKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/gateway.yaml")]
    config: String,

    /// Listen address, overrides `listen.address` (e.g. ":1081")
    #[arg(short, long)]
    listen: Option<String>,

    /// SOCKS5 upstream address, overrides `upstream.address` (e.g. "127.0.0.1:1080")
    #[arg(short, long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, load_error) = match GatewayConfigFile::load(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (GatewayConfigFile::default(), Some(e)),
    };
    if let Some(listen) = args.listen {
        config.listen.address = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.address = upstream;
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    init_tracing(log_level);

    if let Some(e) = load_error {
        warn!(path = %args.config, error = %e, "config not loaded, using defaults");
    }

    info!("Starting SOCKS gateway");
    info!(
        listen = %config.listen.address,
        upstream_kind = ?config.upstream.kind,
        upstream = %config.upstream.address,
        "Configuration loaded"
    );

    let tcp = TcpParams::from(&config.tcp);
    let dialer: Arc<dyn Dialer> = match config.upstream.kind {
        UpstreamKind::Socks5 => Arc::new(
            TunnelDialer::socks5(&config.upstream.network, &config.upstream.address)
                .with_tcp_params(tcp.clone()),
        ),
        UpstreamKind::Direct => Arc::new(DirectDialer::new(tcp.clone())),
    };

    let pool = Arc::new(BufferPool::new(&PoolParams::from(&config.buffer_pool)));
    let handler = HttpHandler::new(dialer, pool)
        .with_client_params(HttpClientParams::from(&config.http_pool))
        .with_buffer_params(ProxyBufferParams::from(&config.proxy_buffers));

    let listener = Arc::new(
        Listener::bind(&config.listen.network, &config.listen.address, Arc::new(handler))
            .await?
            .with_tcp_params(tcp),
    );
    info!(addr = %listener.local_addr()?, "Listening");

    let serving = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.serve().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    listener.stop();
    serving.await?;

    Ok(())
}

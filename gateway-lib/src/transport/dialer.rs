use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use super::tcp_params::TcpParams;
use crate::protocol::socks5::Socks5Connector;

/// Any bidirectional byte stream a dialer can hand out.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxStream = Box<dyn AsyncStream>;

/// Turns an established stream into a tunnel to `addr`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, stream: BoxStream, network: &str, addr: &str) -> Result<BoxStream>;
}

/// Opens a stream to `addr`.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxStream>;
}

pub(crate) fn is_tcp_network(network: &str) -> bool {
    matches!(network, "tcp" | "tcp4" | "tcp6")
}

/// Dials a fixed upstream, then runs a [`Connector`] over the new stream to
/// reach the requested target.
pub struct TunnelDialer {
    network: String,
    addr: String,
    connector: Arc<dyn Connector>,
    tcp: TcpParams,
}

impl TunnelDialer {
    pub fn new(network: &str, addr: &str, connector: Arc<dyn Connector>) -> Self {
        Self {
            network: network.to_string(),
            addr: addr.to_string(),
            connector,
            tcp: TcpParams::default(),
        }
    }

    /// Tunnel through the SOCKS5 server at `addr`.
    pub fn socks5(network: &str, addr: &str) -> Self {
        Self::new(network, addr, Arc::new(Socks5Connector))
    }

    pub fn with_tcp_params(mut self, tcp: TcpParams) -> Self {
        self.tcp = tcp;
        self
    }
}

#[async_trait::async_trait]
impl Dialer for TunnelDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxStream> {
        let stream = connect_tcp(&self.network, &self.addr, &self.tcp)
            .await
            .with_context(|| format!("failed to reach upstream {}", self.addr))?;
        debug!(upstream = %self.addr, target = %addr, "upstream connected");
        self.connector.connect(Box::new(stream), network, addr).await
    }
}

/// Dials the target itself, without any upstream.
#[derive(Default)]
pub struct DirectDialer {
    tcp: TcpParams,
}

impl DirectDialer {
    pub fn new(tcp: TcpParams) -> Self {
        Self { tcp }
    }
}

#[async_trait::async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxStream> {
        let stream = connect_tcp(network, addr, &self.tcp)
            .await
            .with_context(|| format!("failed to connect to {}", addr))?;
        Ok(Box::new(stream))
    }
}

/// Resolve `addr` and connect to the first address matching the `network`
/// family.
async fn connect_tcp(network: &str, addr: &str, params: &TcpParams) -> Result<TcpStream> {
    if !is_tcp_network(network) {
        bail!("unsupported network {:?}", network);
    }

    let mut last_err = None;
    for candidate in lookup_host(addr).await? {
        let wanted = match network {
            "tcp4" => candidate.is_ipv4(),
            "tcp6" => candidate.is_ipv6(),
            _ => true,
        };
        if !wanted {
            continue;
        }
        match TcpStream::connect(candidate).await {
            Ok(stream) => {
                params.apply(&stream)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(match last_err {
        Some(e) => e.into(),
        None => anyhow!("no {} address found for {}", network, addr),
    })
}

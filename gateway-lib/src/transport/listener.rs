use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::addr::bind_address;
use super::dialer::is_tcp_network;
use super::tcp_params::TcpParams;

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync {
    async fn handle_connection(&self, socket: TcpStream) -> Result<()>;
}

/// Accept loop that hands every inbound connection to a [`ConnectionHandler`]
/// on its own task.
pub struct Listener {
    listener: TcpListener,
    handler: Arc<dyn ConnectionHandler>,
    network: String,
    addr: String,
    tcp: TcpParams,
    shutdown: CancellationToken,
}

impl Listener {
    /// Bind `addr` on `network` (`tcp`, `tcp4` or `tcp6`). `:port` binds all
    /// interfaces.
    pub async fn bind(network: &str, addr: &str, handler: Arc<dyn ConnectionHandler>) -> Result<Self> {
        if !is_tcp_network(network) {
            bail!("unsupported listen network {:?}", network);
        }
        let bind_addr = bind_address(network, addr);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {} {}", network, bind_addr))?;

        Ok(Self {
            listener,
            handler,
            network: network.to_string(),
            addr: addr.to_string(),
            tcp: TcpParams::default(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_tcp_params(mut self, tcp: TcpParams) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    pub async fn serve(&self) {
        info!(network = %self.network, addr = %self.addr, "listener serving");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => self.dispatch(socket, peer),
                    Err(e) => {
                        warn!(addr = %self.addr, error = %e, "accept failed");
                        self.accept_backoff().await;
                    }
                },
            }
        }

        info!(addr = %self.addr, "listener stopped");
    }

    /// Wait before the next accept, cut short by `stop`.
    async fn accept_backoff(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
        }
    }

    fn dispatch(&self, socket: TcpStream, peer: SocketAddr) {
        debug!(peer = %peer, "accepted connection");
        if let Err(e) = self.tcp.apply(&socket) {
            debug!(peer = %peer, error = %e, "failed to apply tcp params");
        }

        let handler = self.handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.handle_connection(socket).await {
                debug!(peer = %peer, error = %e, "connection handling error");
            }
        });
    }

    /// Ask the accept loop to exit. Safe to call any number of times, before
    /// or during `serve`.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::transport::dialer::Dialer;

/// Upstream HTTP/1.1 connection reuse for one client session.
#[derive(Debug, Clone)]
pub struct HttpClientParams {
    /// Idle connections older than this are dropped. Default: 30 seconds.
    pub pool_idle_timeout_secs: u64,
    /// Idle connections kept at most. Default: 2.
    pub pool_max_idle: usize,
}

impl Default for HttpClientParams {
    fn default() -> Self {
        Self { pool_idle_timeout_secs: 30, pool_max_idle: 2 }
    }
}

/// An upstream connection on loan for one exchange. Give it back with
/// [`ForwardClient::recycle`] once the response body has been read.
pub struct UpstreamConn {
    authority: String,
    sender: SendRequest<Full<Bytes>>,
}

struct IdleConn {
    conn: UpstreamConn,
    since: Instant,
}

/// HTTP/1.1 client that opens its connections through a [`Dialer`].
///
/// Owned by a single client session, so the idle list needs no locking.
pub struct ForwardClient {
    dialer: Arc<dyn Dialer>,
    params: HttpClientParams,
    idle: Vec<IdleConn>,
}

impl ForwardClient {
    pub fn new(dialer: Arc<dyn Dialer>, params: HttpClientParams) -> Self {
        Self { dialer, params, idle: Vec::new() }
    }

    /// Send `request` to the origin at `authority` (`host:port`).
    pub async fn send(
        &mut self,
        authority: &str,
        request: Request<Full<Bytes>>,
    ) -> Result<(Response<Incoming>, UpstreamConn)> {
        let mut conn = match self.take_idle(authority).await {
            Some(conn) => conn,
            None => self.connect(authority).await?,
        };
        let response = conn
            .sender
            .send_request(request)
            .await
            .with_context(|| format!("upstream exchange with {} failed", authority))?;
        Ok((response, conn))
    }

    /// Park `conn` for reuse. The oldest idle connection is dropped when the
    /// list is full.
    pub fn recycle(&mut self, conn: UpstreamConn) {
        if conn.sender.is_closed() || self.params.pool_max_idle == 0 {
            return;
        }
        if self.idle.len() >= self.params.pool_max_idle {
            self.idle.remove(0);
        }
        self.idle.push(IdleConn { conn, since: Instant::now() });
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    async fn take_idle(&mut self, authority: &str) -> Option<UpstreamConn> {
        let timeout = Duration::from_secs(self.params.pool_idle_timeout_secs);
        self.idle.retain(|c| c.since.elapsed() < timeout && !c.conn.sender.is_closed());

        while let Some(pos) = self.idle.iter().position(|c| c.conn.authority == authority) {
            let mut idle = self.idle.remove(pos);
            if idle.conn.sender.ready().await.is_ok() {
                debug!(authority, "reusing upstream connection");
                return Some(idle.conn);
            }
        }
        None
    }

    async fn connect(&self, authority: &str) -> Result<UpstreamConn> {
        let stream = self.dialer.dial("tcp", authority).await?;
        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .context("upstream HTTP handshake failed")?;

        let peer = authority.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(authority = %peer, error = %e, "upstream connection ended");
            }
        });

        Ok(UpstreamConn { authority: authority.to_string(), sender })
    }
}

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Method, Request, Uri};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::buffer_params::ProxyBufferParams;
use super::forward::{ForwardClient, HttpClientParams};
use crate::engine::buffer_pool::BufferPool;
use crate::engine::relay::relay;
use crate::protocol::http_codec::{
    write_connect_established, write_response, write_service_unavailable, ProxyRequest, RequestReader,
};
use crate::transport::addr::with_default_port;
use crate::transport::dialer::Dialer;
use crate::transport::listener::ConnectionHandler;

const DEFAULT_HTTP_PORT: u16 = 80;

enum Session {
    KeepAlive,
    Close,
}

/// HTTP proxy front end: CONNECT tunnels and plain-HTTP forwarding, with every
/// upstream connection opened through `dialer`.
pub struct HttpHandler {
    dialer: Arc<dyn Dialer>,
    pool: Arc<BufferPool>,
    client_params: HttpClientParams,
    buffers: ProxyBufferParams,
}

impl HttpHandler {
    pub fn new(dialer: Arc<dyn Dialer>, pool: Arc<BufferPool>) -> Self {
        Self {
            dialer,
            pool,
            client_params: HttpClientParams::default(),
            buffers: ProxyBufferParams::default(),
        }
    }

    pub fn with_client_params(mut self, params: HttpClientParams) -> Self {
        self.client_params = params;
        self
    }

    pub fn with_buffer_params(mut self, params: ProxyBufferParams) -> Self {
        self.buffers = params;
        self
    }

    /// Serve one client connection until it closes or a request fails.
    pub async fn serve<S>(&self, stream: S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = RequestReader::new(stream, self.buffers.clone());
        let mut client = ForwardClient::new(self.dialer.clone(), self.client_params.clone());

        loop {
            let request = match reader.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!(peer, "client closed connection");
                    return Ok(());
                }
                Err(e) => {
                    debug!(peer, error = %e, "failed to read request");
                    return Ok(());
                }
            };

            let Some(authority) = request.authority() else {
                debug!(peer, method = %request.method, target = %request.target, "request without host");
                return Ok(());
            };
            let host = with_default_port(&authority, DEFAULT_HTTP_PORT);

            if request.method == Method::CONNECT {
                return self.tunnel(reader, &host, peer).await;
            }

            match self.forward(&mut reader, &mut client, request, &authority, &host, peer).await? {
                Session::KeepAlive => continue,
                Session::Close => return Ok(()),
            }
        }
    }

    async fn tunnel<S>(&self, reader: RequestReader<S>, host: &str, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut downstream, pending) = reader.into_parts();

        let mut upstream = match self.dialer.dial("tcp", host).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer, target = %host, error = %format!("{:#}", e), "tunnel dial failed");
                write_service_unavailable(&mut downstream).await?;
                return Ok(());
            }
        };

        write_connect_established(&mut downstream).await?;
        info!(peer, target = %host, "tunnel established");

        if !pending.is_empty() {
            upstream.write_all(&pending).await.context("failed to forward buffered bytes")?;
        }

        if let Err(e) = relay(downstream, upstream, &self.pool).await {
            debug!(peer, target = %host, error = %e, "tunnel relay error");
        }
        info!(peer, target = %host, "tunnel closed");
        Ok(())
    }

    async fn forward<S>(
        &self,
        reader: &mut RequestReader<S>,
        client: &mut ForwardClient,
        request: ProxyRequest,
        authority: &str,
        host: &str,
        peer: &str,
    ) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let start_time = std::time::Instant::now();
        let method = request.method.clone();
        let head_request = method == Method::HEAD;
        let close_requested = request.wants_close();

        let outbound = match origin_request(request, authority) {
            Ok(outbound) => outbound,
            Err(e) => {
                debug!(peer, error = %e, "cannot rewrite request");
                return Ok(Session::Close);
            }
        };
        let path = outbound.uri().to_string();

        let (response, conn) = match client.send(host, outbound).await {
            Ok(exchange) => exchange,
            Err(e) => {
                warn!(peer, target = %host, error = %format!("{:#}", e), "forward failed");
                write_service_unavailable(reader.get_mut()).await?;
                return Ok(Session::Close);
            }
        };

        let status = response.status().as_u16();
        let keep_alive = write_response(reader.get_mut(), response, head_request)
            .await
            .context("failed to write response")?;
        client.recycle(conn);

        info!(
            peer,
            method = %method,
            host = %host,
            path = %path,
            status,
            elapsed_ms = start_time.elapsed().as_millis(),
            "request forwarded"
        );

        Ok(if keep_alive && !close_requested { Session::KeepAlive } else { Session::Close })
    }
}

/// Rebuild a proxied request for the origin: origin-form target, no
/// `Proxy-Connection`, and a `Host` header.
fn origin_request(request: ProxyRequest, authority: &str) -> Result<Request<Full<Bytes>>> {
    let mut headers = request.headers;
    headers.remove(HeaderName::from_static("proxy-connection"));
    if !headers.contains_key(header::HOST) {
        headers.insert(header::HOST, HeaderValue::from_str(authority)?);
    }

    let target = if request.target.starts_with('/') || request.target == "*" {
        request.target
    } else {
        let uri: Uri = request.target.parse()?;
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string()
    };

    let mut builder = Request::builder().method(request.method).uri(target);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    Ok(builder.body(Full::new(request.body))?)
}

#[async_trait::async_trait]
impl ConnectionHandler for HttpHandler {
    async fn handle_connection(&self, socket: TcpStream) -> Result<()> {
        let peer = socket
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        self.serve(socket, &peer).await
    }
}

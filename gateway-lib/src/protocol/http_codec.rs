use anyhow::{bail, Context, Result};
use bytes::{Buf, Bytes, BytesMut};
use http_body_util::BodyExt;
use httparse::Status;
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Response, StatusCode, Uri, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::proxy::buffer_params::ProxyBufferParams;

const MAX_HEADERS: usize = 96;
const READ_CHUNK: usize = 4096;

pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
pub const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n";

/// One proxied request with its body fully buffered.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Request target as sent: authority-form for CONNECT, usually
    /// absolute-form for everything else.
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Host the request addresses: the CONNECT authority, the absolute URI's
    /// authority, or the `Host` header. The port is kept only when present.
    pub fn authority(&self) -> Option<String> {
        if self.method == Method::CONNECT {
            return Some(self.target.clone()).filter(|t| !t.is_empty());
        }
        if let Ok(uri) = self.target.parse::<Uri>() {
            if let Some(host) = uri.host() {
                return Some(match uri.port_u16() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                });
            }
        }
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }

    /// Whether the client asked for the connection to end after this
    /// exchange.
    pub fn wants_close(&self) -> bool {
        let proxy_connection = HeaderName::from_static("proxy-connection");
        let close = has_token(&self.headers, &header::CONNECTION, "close")
            || has_token(&self.headers, &proxy_connection, "close");
        if self.version == Version::HTTP_10 {
            let keep_alive = has_token(&self.headers, &header::CONNECTION, "keep-alive")
                || has_token(&self.headers, &proxy_connection, "keep-alive");
            return close || !keep_alive;
        }
        close
    }
}

fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Reads consecutive HTTP/1.x requests from a client stream.
///
/// Bytes read past the current request stay buffered for the next call, or
/// are handed back by [`into_parts`](Self::into_parts) when the stream
/// switches to tunneling.
pub struct RequestReader<S> {
    stream: S,
    buf: BytesMut,
    params: ProxyBufferParams,
}

struct RequestHead {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
}

impl<S: AsyncRead + Unpin> RequestReader<S> {
    pub fn new(stream: S, params: ProxyBufferParams) -> Self {
        Self { stream, buf: BytesMut::with_capacity(READ_CHUNK), params }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// The stream and whatever was read past the last request.
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    /// Next request, or `None` when the client closed cleanly between
    /// requests.
    pub async fn read_request(&mut self) -> Result<Option<ProxyRequest>> {
        let (head, head_len) = loop {
            if !self.buf.is_empty() {
                if let Some(parsed) = parse_head(&self.buf)? {
                    break parsed;
                }
            }
            if self.buf.len() >= self.params.http_header_buf_size {
                bail!("HTTP headers too large");
            }
            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                bail!("Connection closed before headers");
            }
        };
        if head_len > self.params.http_header_buf_size {
            bail!("HTTP headers too large");
        }
        self.buf.advance(head_len);

        let mut headers = head.headers;
        let body = if head.method == Method::CONNECT {
            Bytes::new()
        } else if is_chunked(&headers) {
            let body = self.read_chunked_body().await?;
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
            body
        } else {
            let len = content_length(&headers)?;
            self.read_sized_body(len).await?
        };

        Ok(Some(ProxyRequest {
            method: head.method,
            target: head.target,
            version: head.version,
            headers,
            body,
        }))
    }

    async fn fill(&mut self) -> Result<usize> {
        self.buf.reserve(READ_CHUNK);
        Ok(self.stream.read_buf(&mut self.buf).await?)
    }

    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                bail!("Connection closed mid-body");
            }
        }
        Ok(())
    }

    async fn read_sized_body(&mut self, len: usize) -> Result<Bytes> {
        if len > self.params.http_body_max_size {
            bail!("request body of {} bytes exceeds limit", len);
        }
        self.fill_to(len).await?;
        Ok(self.buf.split_to(len).freeze())
    }

    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(pos + 2);
                return Ok(std::str::from_utf8(&line[..pos])?.to_string());
            }
            if self.buf.len() >= self.params.http_header_buf_size {
                bail!("chunk header line too long");
            }
            if self.fill().await? == 0 {
                bail!("Connection closed mid-body");
            }
        }
    }

    async fn read_chunked_body(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line().await?;
            let size_str = line.split(';').next().unwrap_or("").trim();
            let chunk_size = usize::from_str_radix(size_str, 16)
                .with_context(|| format!("Invalid chunk size: {}", size_str))?;

            if chunk_size == 0 {
                // Trailer section ends with an empty line
                while !self.read_line().await?.is_empty() {}
                break;
            }
            if chunk_size > self.params.http_body_max_size.saturating_sub(body.len()) {
                bail!("chunked request body exceeds limit");
            }

            let framed_len = chunk_size
                .checked_add(2)
                .context("chunked request body exceeds limit")?;
            self.fill_to(framed_len).await?;
            body.extend_from_slice(&self.buf[..chunk_size]);
            if &self.buf[chunk_size..framed_len] != b"\r\n" {
                warn!("Invalid chunked encoding trailer after chunk data");
            }
            self.buf.advance(framed_len);
        }
        Ok(body.freeze())
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req.parse(buf)? {
        Status::Complete(n) => n,
        Status::Partial => return Ok(None),
    };

    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())?;
    let target = req.path.unwrap_or_default().to_string();
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())?;
        let value = HeaderValue::from_bytes(h.value)?;
        map.append(name, value);
    }

    Ok(Some((RequestHead { method, target, version, headers: map }, head_len)))
}

fn is_chunked(headers: &HeaderMap) -> bool {
    has_token(headers, &header::TRANSFER_ENCODING, "chunked")
}

fn content_length(headers: &HeaderMap) -> Result<usize> {
    match headers.get(header::CONTENT_LENGTH) {
        Some(value) => {
            let value = value.to_str()?;
            value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid Content-Length: {}", value))
        }
        None => Ok(0),
    }
}

/// Write the canned `200 Connection Established` reply for CONNECT.
pub async fn write_connect_established<W: AsyncWrite + Unpin + ?Sized>(w: &mut W) -> std::io::Result<()> {
    w.write_all(CONNECT_ESTABLISHED).await?;
    w.flush().await
}

/// Write an empty `503 Service Unavailable` response.
pub async fn write_service_unavailable<W: AsyncWrite + Unpin + ?Sized>(w: &mut W) -> std::io::Result<()> {
    w.write_all(SERVICE_UNAVAILABLE).await?;
    w.flush().await
}

/// Write `response` to `w` as HTTP/1.x and stream its body.
///
/// Chunked bodies are re-chunked frame by frame. `head_request` suppresses
/// the body, as do 1xx, 204 and 304 statuses. Returns whether the client
/// connection can carry another request afterwards.
pub async fn write_response<W, B>(w: &mut W, response: Response<B>, head_request: bool) -> Result<bool>
where
    W: AsyncWrite + Unpin + ?Sized,
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let status = response.status();
    let version = response.version();
    let chunked = is_chunked(response.headers());
    let sized = response.headers().contains_key(header::CONTENT_LENGTH);
    let bodyless = head_request
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;

    let reason = response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|r| r.as_bytes().to_vec())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").as_bytes().to_vec());

    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(if version == Version::HTTP_10 { b"HTTP/1.0 " } else { b"HTTP/1.1 " });
    head.extend_from_slice(status.as_str().as_bytes());
    head.extend_from_slice(b" ");
    head.extend_from_slice(&reason);
    head.extend_from_slice(b"\r\n");
    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    w.write_all(&head).await?;

    let close_delimited = !bodyless && !chunked && !sized;
    let keep_alive = !close_delimited
        && !has_token(response.headers(), &header::CONNECTION, "close")
        && (version != Version::HTTP_10 || has_token(response.headers(), &header::CONNECTION, "keep-alive"));

    if bodyless {
        w.flush().await?;
        return Ok(keep_alive);
    }

    let mut body = response.into_body();
    let mut total_bytes = 0usize;
    while let Some(frame) = body.frame().await {
        let frame = frame.context("error reading response body")?;
        let Some(chunk) = frame.data_ref() else { continue };
        if chunk.is_empty() {
            continue;
        }
        total_bytes += chunk.len();
        if chunked {
            w.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
            w.write_all(chunk).await?;
            w.write_all(b"\r\n").await?;
        } else {
            w.write_all(chunk).await?;
        }
    }
    if chunked {
        w.write_all(b"0\r\n\r\n").await?;
    }
    w.flush().await?;

    debug!(status = status.as_u16(), bytes = total_bytes, "response complete");
    Ok(keep_alive)
}

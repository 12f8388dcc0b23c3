/// Limits applied while reading proxied HTTP requests.
#[derive(Debug, Clone)]
pub struct ProxyBufferParams {
    /// Upper bound for the buffered request head (request line and headers).
    /// Requests with a larger head are rejected and the connection is closed.
    /// Default: 65536 bytes.
    pub http_header_buf_size: usize,

    /// Upper bound for a buffered request body, whether sized by
    /// `Content-Length` or chunked. Default: 16 MiB.
    pub http_body_max_size: usize,
}

impl Default for ProxyBufferParams {
    fn default() -> Self {
        Self {
            http_header_buf_size: 64 * 1024,
            http_body_max_size: 16 * 1024 * 1024,
        }
    }
}

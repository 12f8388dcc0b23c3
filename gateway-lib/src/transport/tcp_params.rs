use anyhow::Result;
use tokio::net::TcpStream;

/// Socket options applied to accepted and dialed TCP streams.
#[derive(Debug, Clone)]
pub struct TcpParams {
    /// Disable Nagle's algorithm (TCP_NODELAY). The handshake and the HTTP
    /// heads are small writes that should not wait for coalescing.
    /// Default: true.
    pub nodelay: bool,
}

impl Default for TcpParams {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpParams {
    /// Apply these parameters to a connected or accepted `TcpStream`.
    pub fn apply(&self, stream: &TcpStream) -> Result<()> {
        stream.set_nodelay(self.nodelay)?;
        Ok(())
    }
}

pub mod config;
pub mod infra;
pub mod transport;
pub mod protocol;
pub mod engine;
pub mod proxy;

// Re-exports
pub use engine::buffer_pool::{BufferPool, PoolParams, PooledBuffer, Tier};
pub use engine::relay::relay;
pub use transport::listener::{ConnectionHandler, Listener};
pub use transport::dialer::{AsyncStream, BoxStream, Connector, Dialer, DirectDialer, TunnelDialer};
pub use transport::tcp_params::TcpParams;
pub use protocol::socks5::{Endpoint, Host, Socks5Connector, Socks5Error};
pub use protocol::http_codec::{ProxyRequest, RequestReader};
pub use proxy::http::HttpHandler;
pub use proxy::forward::{ForwardClient, HttpClientParams};
pub use proxy::buffer_params::ProxyBufferParams;

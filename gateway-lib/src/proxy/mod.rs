pub mod buffer_params;
pub mod forward;
pub mod http;

pub use buffer_params::ProxyBufferParams;
pub use forward::{ForwardClient, HttpClientParams, UpstreamConn};
pub use http::HttpHandler;

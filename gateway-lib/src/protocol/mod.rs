pub mod http_codec;
pub mod socks5;

pub use http_codec::{ProxyRequest, RequestReader};
pub use socks5::{Endpoint, Host, Socks5Connector, Socks5Error};

pub mod addr;
pub mod dialer;
pub mod listener;
pub mod tcp_params;

pub use dialer::{AsyncStream, BoxStream, Connector, Dialer, DirectDialer, TunnelDialer};
pub use listener::{ConnectionHandler, Listener};
pub use tcp_params::TcpParams;

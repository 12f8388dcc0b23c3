//! SOCKS5 client side (RFC 1928): CONNECT with no authentication.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::transport::addr::AddrError;

pub mod connector;
pub mod endpoint;

pub use connector::Socks5Connector;
pub use endpoint::{Endpoint, Host};

pub const SOCKS_VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const CMD_CONNECT: u8 = 0x01;
pub const RESERVED: u8 = 0x00;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REPLY_SUCCEEDED: u8 = 0x00;

/// Reply status byte of a failed CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCode(pub u8);

impl ReplyCode {
    pub fn message(self) -> &'static str {
        match self.0 {
            0x01 => "general SOCKS server failure",
            0x02 => "connection not allowed by ruleset",
            0x03 => "network unreachable",
            0x04 => "host unreachable",
            0x05 => "connection refused",
            0x06 => "TTL expired",
            0x07 => "command not supported",
            0x08 => "address type not supported",
            _ => "unknown failure",
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.message(), self.0)
    }
}

#[derive(Debug, Error)]
pub enum Socks5Error {
    #[error("network {0:?} is not supported")]
    UnsupportedNetwork(String),
    #[error("invalid address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrError,
    },
    #[error("empty host")]
    EmptyHost,
    #[error("domain name is {0} bytes, longer than 255")]
    DomainTooLong(usize),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("server selected unsupported auth method {0:#04x}")]
    UnsupportedAuth(u8),
    #[error("server rejected connect: {0}")]
    ServerRejected(ReplyCode),
    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),
    #[error("reply truncated")]
    Truncated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

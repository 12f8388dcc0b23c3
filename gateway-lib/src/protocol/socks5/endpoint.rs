use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{Socks5Error, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};
use crate::transport::addr::split_host_port;

const MAX_DOMAIN_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

/// Destination of a CONNECT request, in the shape it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Host,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port`. IPv6 hosts must be bracketed.
    pub fn parse(addr: &str) -> Result<Self, Socks5Error> {
        let (host, port) = split_host_port(addr).map_err(|source| Socks5Error::InvalidAddress {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            host: parse_host(host)?,
            port: parse_port(port)?,
        })
    }

    pub fn address_type(&self) -> u8 {
        match self.host {
            Host::Ipv4(_) => ATYP_IPV4,
            Host::Ipv6(_) => ATYP_IPV6,
            Host::Domain(_) => ATYP_DOMAIN,
        }
    }

    /// Bytes `encode` appends: ATYP, address and port.
    pub fn encoded_len(&self) -> usize {
        let addr_len = match &self.host {
            Host::Ipv4(_) => 4,
            Host::Ipv6(_) => 16,
            Host::Domain(d) => 1 + d.len(),
        };
        1 + addr_len + 2
    }

    /// Append `ATYP ADDR PORT`. A domain longer than 255 bytes has no wire
    /// form and is rejected before anything is written.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Socks5Error> {
        if let Host::Domain(d) = &self.host {
            if d.len() > MAX_DOMAIN_LEN {
                return Err(Socks5Error::DomainTooLong(d.len()));
            }
        }
        buf.reserve(self.encoded_len());
        buf.put_u8(self.address_type());
        match &self.host {
            Host::Ipv4(ip) => buf.put_slice(&ip.octets()),
            Host::Ipv6(ip) => buf.put_slice(&ip.octets()),
            Host::Domain(d) => {
                buf.put_u8(d.len() as u8);
                buf.put_slice(d.as_bytes());
            }
        }
        buf.put_u16(self.port);
        Ok(())
    }

    /// Decode `ATYP ADDR PORT` from the front of `buf`, returning the endpoint
    /// and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        let atyp = *buf.first().ok_or(Socks5Error::Truncated)?;
        let (host, addr_end) = match atyp {
            ATYP_IPV4 => {
                let octets: [u8; 4] = slice(buf, 1, 4)?.try_into().map_err(|_| Socks5Error::Truncated)?;
                (Host::Ipv4(Ipv4Addr::from(octets)), 5)
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] = slice(buf, 1, 16)?.try_into().map_err(|_| Socks5Error::Truncated)?;
                (Host::Ipv6(Ipv6Addr::from(octets)), 17)
            }
            ATYP_DOMAIN => {
                let len = *buf.get(1).ok_or(Socks5Error::Truncated)? as usize;
                let name = slice(buf, 2, len)?;
                (Host::Domain(String::from_utf8_lossy(name).into_owned()), 2 + len)
            }
            other => return Err(Socks5Error::UnsupportedAddressType(other)),
        };
        let port = slice(buf, addr_end, 2)?;
        let port = u16::from_be_bytes([port[0], port[1]]);
        Ok((Self { host, port }, addr_end + 2))
    }
}

fn slice(buf: &[u8], start: usize, len: usize) -> Result<&[u8], Socks5Error> {
    buf.get(start..start + len).ok_or(Socks5Error::Truncated)
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Host::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Host::Domain(d) => write!(f, "{}:{}", d, self.port),
        }
    }
}

/// Literal IPv4, then literal IPv6 (IPv4-mapped addresses collapse to IPv4),
/// otherwise a domain name.
pub fn parse_host(host: &str) -> Result<Host, Socks5Error> {
    if host.is_empty() {
        return Err(Socks5Error::EmptyHost);
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(Host::Ipv4(ip));
    }
    if let Ok(ip) = host.parse::<Ipv6Addr>() {
        return Ok(match ip.to_ipv4_mapped() {
            Some(v4) => Host::Ipv4(v4),
            None => Host::Ipv6(ip),
        });
    }
    if host.len() > MAX_DOMAIN_LEN {
        return Err(Socks5Error::DomainTooLong(host.len()));
    }
    Ok(Host::Domain(host.to_string()))
}

pub fn parse_port(port: &str) -> Result<u16, Socks5Error> {
    port.parse::<u16>()
        .map_err(|_| Socks5Error::InvalidPort(port.to_string()))
}

use anyhow::Result;
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::endpoint::Endpoint;
use super::{
    ReplyCode, Socks5Error, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6, CMD_CONNECT, METHOD_NO_AUTH,
    REPLY_SUCCEEDED, RESERVED, SOCKS_VERSION,
};
use crate::transport::dialer::{is_tcp_network, BoxStream, Connector};

/// VER REP RSV ATYP, plus the longest address (length byte and 255 name
/// bytes) and the port.
const MAX_REPLY_LEN: usize = 4 + 1 + 255 + 2;

/// Runs a no-auth SOCKS5 CONNECT over an already established stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Socks5Connector;

impl Socks5Connector {
    /// Negotiate a CONNECT to `target` and return the server's bound address.
    ///
    /// Reads exactly the greeting reply and the reply frame; anything the
    /// server sends afterwards is left in the stream.
    pub async fn handshake<S>(stream: &mut S, target: &Endpoint) -> Result<Endpoint, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let mut request = BytesMut::with_capacity(3 + target.encoded_len());
        request.put_slice(&[SOCKS_VERSION, CMD_CONNECT, RESERVED]);
        target.encode(&mut request)?;

        stream.write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH]).await?;
        stream.flush().await?;

        let mut choice = [0u8; 2];
        read_frame(stream, &mut choice).await?;
        if choice[0] != SOCKS_VERSION {
            return Err(Socks5Error::UnsupportedVersion(choice[0]));
        }
        if choice[1] != METHOD_NO_AUTH {
            return Err(Socks5Error::UnsupportedAuth(choice[1]));
        }

        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut reply = [0u8; MAX_REPLY_LEN];
        read_frame(stream, &mut reply[..5]).await?;
        if reply[0] != SOCKS_VERSION {
            return Err(Socks5Error::UnsupportedVersion(reply[0]));
        }
        if reply[1] != REPLY_SUCCEEDED {
            return Err(Socks5Error::ServerRejected(ReplyCode(reply[1])));
        }
        let frame_len = match reply[3] {
            ATYP_IPV4 => 4 + 4 + 2,
            ATYP_IPV6 => 4 + 16 + 2,
            ATYP_DOMAIN => 4 + 1 + reply[4] as usize + 2,
            other => return Err(Socks5Error::UnsupportedAddressType(other)),
        };
        read_frame(stream, &mut reply[5..frame_len]).await?;

        let (bound, _) = Endpoint::decode(&reply[3..frame_len])?;
        Ok(bound)
    }
}

async fn read_frame<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), Socks5Error>
where
    S: AsyncRead + Unpin + ?Sized,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Socks5Error::Truncated),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl Connector for Socks5Connector {
    async fn connect(&self, mut stream: BoxStream, network: &str, addr: &str) -> Result<BoxStream> {
        if !is_tcp_network(network) {
            return Err(Socks5Error::UnsupportedNetwork(network.to_string()).into());
        }
        let target = Endpoint::parse(addr)?;

        let bound = Self::handshake(&mut stream, &target).await?;
        debug!(target = %target, bound = %bound, "socks5 tunnel established");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::endpoint::Host;
    use tokio::io::{duplex, DuplexStream};

    /// Plays the server side of one handshake: answer the greeting with
    /// `method`, then answer the request with `reply`. Returns the request
    /// bytes it received.
    async fn fake_server(mut server: DuplexStream, method: [u8; 2], reply: Vec<u8>) -> (DuplexStream, Vec<u8>) {
        let mut greeting = [0u8; 3];
        server.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [SOCKS_VERSION, 1, METHOD_NO_AUTH]);
        server.write_all(&method).await.unwrap();

        let mut head = [0u8; 5];
        server.read_exact(&mut head).await.unwrap();
        let rest = match head[3] {
            ATYP_IPV4 => 3 + 2,
            ATYP_IPV6 => 15 + 2,
            _ => head[4] as usize + 2,
        };
        let mut request = head.to_vec();
        request.resize(5 + rest, 0);
        server.read_exact(&mut request[5..]).await.unwrap();

        server.write_all(&reply).await.unwrap();
        (server, request)
    }

    fn ipv4_reply(status: u8) -> Vec<u8> {
        vec![SOCKS_VERSION, status, RESERVED, ATYP_IPV4, 127, 0, 0, 1, 0x04, 0x38]
    }

    fn downcast(err: anyhow::Error) -> Socks5Error {
        err.downcast::<Socks5Error>().expect("not a socks5 error")
    }

    #[tokio::test]
    async fn test_connect_returns_same_stream() {
        let (client, server) = duplex(1024);
        let server = tokio::spawn(fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], ipv4_reply(REPLY_SUCCEEDED)));

        let mut tunnel = Socks5Connector.connect(Box::new(client), "tcp", "example.com:443").await.unwrap();
        tunnel.write_all(b"after").await.unwrap();

        let (mut server, request) = server.await.unwrap();
        let mut expected = vec![SOCKS_VERSION, CMD_CONNECT, RESERVED, ATYP_DOMAIN, 11];
        expected.extend_from_slice(b"example.com");
        expected.extend_from_slice(&[0x01, 0xbb]);
        assert_eq!(request, expected);

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"after");
    }

    #[tokio::test]
    async fn test_reply_bytes_beyond_frame_are_left_unread() {
        let (client, server) = duplex(1024);
        let mut reply = vec![SOCKS_VERSION, REPLY_SUCCEEDED, RESERVED, ATYP_DOMAIN, 4];
        reply.extend_from_slice(b"host");
        reply.extend_from_slice(&[0x00, 0x50]);
        reply.extend_from_slice(b"EXTRA");
        let server = tokio::spawn(fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], reply));

        let mut tunnel = Socks5Connector.connect(Box::new(client), "tcp", "10.0.0.1:80").await.unwrap();
        let mut buf = [0u8; 5];
        tunnel.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"EXTRA");

        let (_server, request) = server.await.unwrap();
        assert_eq!(request, vec![SOCKS_VERSION, CMD_CONNECT, RESERVED, ATYP_IPV4, 10, 0, 0, 1, 0x00, 0x50]);
    }

    #[tokio::test]
    async fn test_ipv6_bound_address() {
        let (mut client, server) = duplex(1024);
        let mut reply = vec![SOCKS_VERSION, REPLY_SUCCEEDED, RESERVED, ATYP_IPV6];
        reply.extend_from_slice(&"::1".parse::<std::net::Ipv6Addr>().unwrap().octets());
        reply.extend_from_slice(&[0x1f, 0x90]);
        let server = tokio::spawn(fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], reply));

        let target = Endpoint::parse("[2001:db8::2]:8080").unwrap();
        let bound = Socks5Connector::handshake(&mut client, &target).await.unwrap();
        assert_eq!(bound.to_string(), "[::1]:8080");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_auth_sends_no_request() {
        let (client, mut server) = duplex(1024);
        let server = tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            server.read_exact(&mut greeting).await.unwrap();
            server.write_all(&[SOCKS_VERSION, 0xff]).await.unwrap();
            let mut rest = Vec::new();
            server.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let err = Socks5Connector.connect(Box::new(client), "tcp", "example.com:80").await.err().unwrap();
        assert!(matches!(downcast(err), Socks5Error::UnsupportedAuth(0xff)));
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_domain_sends_nothing() {
        let (mut client, mut server) = duplex(1024);
        let target = Endpoint {
            host: Host::Domain("a".repeat(300)),
            port: 80,
        };
        let err = Socks5Connector::handshake(&mut client, &target).await.unwrap_err();
        assert!(matches!(err, Socks5Error::DomainTooLong(300)));

        drop(client);
        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_version_in_greeting() {
        let (mut client, mut server) = duplex(1024);
        tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            server.read_exact(&mut greeting).await.unwrap();
            server.write_all(&[0x04, METHOD_NO_AUTH]).await.unwrap();
        });

        let target = Endpoint::parse("example.com:80").unwrap();
        let err = Socks5Connector::handshake(&mut client, &target).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(0x04)));
    }

    #[tokio::test]
    async fn test_server_rejected() {
        let (client, server) = duplex(1024);
        tokio::spawn(fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], ipv4_reply(0x05)));

        let err = Socks5Connector.connect(Box::new(client), "tcp", "example.com:80").await.err().unwrap();
        match downcast(err) {
            Socks5Error::ServerRejected(code) => assert_eq!(code.message(), "connection refused"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_address_type_in_reply() {
        let (client, server) = duplex(1024);
        let reply = vec![SOCKS_VERSION, REPLY_SUCCEEDED, RESERVED, 0x09, 0];
        tokio::spawn(fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], reply));

        let err = Socks5Connector.connect(Box::new(client), "tcp", "example.com:80").await.err().unwrap();
        assert!(matches!(downcast(err), Socks5Error::UnsupportedAddressType(0x09)));
    }

    #[tokio::test]
    async fn test_truncated_reply() {
        let (client, server) = duplex(1024);
        tokio::spawn(async move {
            let reply = vec![SOCKS_VERSION, REPLY_SUCCEEDED, RESERVED, ATYP_IPV4, 1, 2];
            let (server, _) = fake_server(server, [SOCKS_VERSION, METHOD_NO_AUTH], reply).await;
            drop(server);
        });

        let err = Socks5Connector.connect(Box::new(client), "tcp", "example.com:80").await.err().unwrap();
        assert!(matches!(downcast(err), Socks5Error::Truncated));
    }

    #[tokio::test]
    async fn test_rejects_before_writing() {
        for (network, addr) in [("udp", "example.com:53"), ("tcp", "example.com:http"), ("tcp", "example.com")] {
            let (client, mut server) = duplex(1024);
            let result = Socks5Connector.connect(Box::new(client), network, addr).await;
            assert!(result.is_err(), "{} {} accepted", network, addr);

            let mut written = Vec::new();
            server.read_to_end(&mut written).await.unwrap();
            assert!(written.is_empty(), "{} {} wrote {:?}", network, addr, written);
        }
    }

    #[tokio::test]
    async fn test_unsupported_network_error() {
        let (client, _server) = duplex(64);
        let err = Socks5Connector.connect(Box::new(client), "udp", "example.com:53").await.err().unwrap();
        assert!(matches!(downcast(err), Socks5Error::UnsupportedNetwork(n) if n == "udp"));
    }
}

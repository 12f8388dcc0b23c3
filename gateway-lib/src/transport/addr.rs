use std::net::Ipv6Addr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("missing port in address")]
    MissingPort,
    #[error("too many colons in address")]
    TooManyColons,
    #[error("missing ']' in address")]
    MissingBracket,
}

/// Split `host:port` into its parts, handling IPv6 bracket notation.
///
/// - `example.com:80` → (`example.com`, `80`)
/// - `[::1]:443`      → (`::1`, `443`)
/// - `:8080`          → (``, `8080`)
/// - `example.com`    → `MissingPort`
pub fn split_host_port(addr: &str) -> Result<(&str, &str), AddrError> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or(AddrError::MissingBracket)?;
        let port = after.strip_prefix(':').ok_or(AddrError::MissingPort)?;
        return Ok((host, port));
    }
    let (host, port) = addr.rsplit_once(':').ok_or(AddrError::MissingPort)?;
    if host.contains(':') {
        return Err(AddrError::TooManyColons);
    }
    if host.contains(']') || port.contains(']') {
        return Err(AddrError::MissingBracket);
    }
    Ok((host, port))
}

/// Append `default_port` to `host` unless it already carries a port.
///
/// - `example.com`     → `example.com:80`
/// - `example.com:443` → `example.com:443`
/// - `::1` / `[::1]`   → `[::1]:80`
pub fn with_default_port(host: &str, default_port: u16) -> String {
    match split_host_port(host) {
        Ok((_, port)) if !port.is_empty() => host.to_string(),
        Ok((h, _)) if h.parse::<Ipv6Addr>().is_ok() => format!("[{}]:{}", h, default_port),
        Ok((h, _)) => format!("{}:{}", h, default_port),
        Err(_) => {
            let bare = host.trim_start_matches('[').trim_end_matches(']');
            if bare.parse::<Ipv6Addr>().is_ok() {
                format!("[{}]:{}", bare, default_port)
            } else {
                format!("{}:{}", host, default_port)
            }
        }
    }
}

/// Expand a listen address with an empty host (`:1081`) to a bindable one.
pub fn bind_address(network: &str, addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) if network == "tcp6" => format!("[::]:{}", port),
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(split_host_port("example.com:8080"), Ok(("example.com", "8080")));
        assert_eq!(split_host_port("10.0.0.1:53"), Ok(("10.0.0.1", "53")));
    }

    #[test]
    fn test_split_ipv6_brackets() {
        assert_eq!(split_host_port("[::1]:443"), Ok(("::1", "443")));
        assert_eq!(split_host_port("[::1]"), Err(AddrError::MissingPort));
        assert_eq!(split_host_port("[::1:443"), Err(AddrError::MissingBracket));
    }

    #[test]
    fn test_split_rejects_bare_ipv6_and_missing_port() {
        assert_eq!(split_host_port("::1"), Err(AddrError::TooManyColons));
        assert_eq!(split_host_port("example.com"), Err(AddrError::MissingPort));
    }

    #[test]
    fn test_split_empty_parts() {
        assert_eq!(split_host_port(":8080"), Ok(("", "8080")));
        assert_eq!(split_host_port("example.com:"), Ok(("example.com", "")));
    }

    #[test]
    fn test_default_port_appended() {
        assert_eq!(with_default_port("example.com", 80), "example.com:80");
        assert_eq!(with_default_port("example.com:", 80), "example.com:80");
        assert_eq!(with_default_port("example.com:443", 80), "example.com:443");
    }

    #[test]
    fn test_default_port_ipv6() {
        assert_eq!(with_default_port("[::1]", 80), "[::1]:80");
        assert_eq!(with_default_port("::1", 80), "[::1]:80");
        assert_eq!(with_default_port("[::1]:8443", 80), "[::1]:8443");
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(bind_address("tcp", ":1081"), "0.0.0.0:1081");
        assert_eq!(bind_address("tcp6", ":1081"), "[::]:1081");
        assert_eq!(bind_address("tcp", "127.0.0.1:1081"), "127.0.0.1:1081");
    }
}

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Host and port of a transport endpoint.
///
/// The host is kept as given (name or literal IP) and only resolved when a
/// transport needs a concrete [`SocketAddr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    host: String,
    port: u16,
}

impl SocketAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to the first matching socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        let mut addrs = (host, self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: self.to_string(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Resolve {
            address: self.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
        })
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for SocketAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr: SocketAddress = "127.0.0.1:10010".parse().unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 10010);
        assert_eq!(addr.to_string(), "127.0.0.1:10010");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let addr: SocketAddress = "[::1]:8080".parse().unwrap();
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.to_string(), "[::1]:8080");
    }

    #[test]
    fn rejects_missing_port() {
        assert!(matches!(
            "localhost".parse::<SocketAddress>(),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!("localhost:http".parse::<SocketAddress>().is_err());
        assert!(":80".parse::<SocketAddress>().is_err());
    }

    #[test]
    fn resolves_loopback() {
        let addr = SocketAddress::new("127.0.0.1", 9).resolve().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9);
    }

    #[test]
    fn from_std_socket_addr() {
        let std_addr: SocketAddr = "10.1.2.3:77".parse().unwrap();
        let addr = SocketAddress::from(std_addr);
        assert_eq!(addr, SocketAddress::new("10.1.2.3", 77));
    }
}

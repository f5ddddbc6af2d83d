use std::net::UdpSocket;
use std::time::Duration;

use tracing::info;

use crate::address::SocketAddress;
use crate::error::{Result, TransportError};

/// Bound UDP endpoint.
///
/// There is no persistent peer: every send names its destination and every
/// receive reports the datagram's source.
pub struct DatagramEndpoint {
    socket: UdpSocket,
    address: SocketAddress,
}

impl DatagramEndpoint {
    /// Bind a datagram endpoint on the given address.
    pub fn bind(address: &SocketAddress) -> Result<Self> {
        let resolved = address.resolve()?;
        let socket = UdpSocket::bind(resolved).map_err(|e| TransportError::Bind {
            address: address.to_string(),
            source: e,
        })?;
        let address = SocketAddress::from(socket.local_addr()?);

        info!(%address, "bound udp endpoint");

        Ok(Self { socket, address })
    }

    /// Receive one datagram into `buf`.
    ///
    /// Excess bytes of a datagram larger than `buf` are discarded by the OS.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddress)> {
        let (n, source) = self.socket.recv_from(buf)?;
        Ok((n, source.into()))
    }

    /// Send one datagram to `destination`, returning the bytes written.
    pub fn send_to(&self, buf: &[u8], destination: &SocketAddress) -> Result<usize> {
        let resolved = destination.resolve()?;
        self.socket.send_to(buf, resolved).map_err(Into::into)
    }

    /// Set read timeout for `recv_from`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout for `send_to`.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_write_timeout(timeout).map_err(Into::into)
    }

    /// The address this endpoint is bound to.
    pub fn local_address(&self) -> &SocketAddress {
        &self.address
    }
}

impl std::fmt::Debug for DatagramEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramEndpoint")
            .field("address", &self.address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive_datagram() {
        let left = DatagramEndpoint::bind(&SocketAddress::new("127.0.0.1", 0)).unwrap();
        let right = DatagramEndpoint::bind(&SocketAddress::new("127.0.0.1", 0)).unwrap();

        let sent = left.send_to(b"datagram", right.local_address()).unwrap();
        assert_eq!(sent, 8);

        let mut buf = [0u8; 64];
        let (n, source) = right.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"datagram");
        assert_eq!(&source, left.local_address());
    }

    #[test]
    fn test_read_timeout_reports_would_block() {
        let endpoint = DatagramEndpoint::bind(&SocketAddress::new("127.0.0.1", 0)).unwrap();
        endpoint
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let mut buf = [0u8; 8];
        let err = endpoint.recv_from(&mut buf).unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn test_bind_conflict_reports_bind_error() {
        let first = DatagramEndpoint::bind(&SocketAddress::new("127.0.0.1", 0)).unwrap();
        let result = DatagramEndpoint::bind(first.local_address());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}

use std::net::{TcpListener, TcpStream};

use tracing::{debug, info};

use crate::address::SocketAddress;
use crate::error::{Result, TransportError};
use crate::stream::NetStream;

/// Bound TCP listener.
///
/// Provides bind/accept/connect over IPv4 and IPv6 TCP.
pub struct TcpTransport {
    listener: TcpListener,
    address: SocketAddress,
}

impl TcpTransport {
    /// Bind and listen on the given address.
    ///
    /// Port 0 picks an ephemeral port; [`TcpTransport::local_address`] reports
    /// the one actually bound.
    pub fn bind(address: &SocketAddress) -> Result<Self> {
        let resolved = address.resolve()?;
        let listener = TcpListener::bind(resolved).map_err(|e| TransportError::Bind {
            address: address.to_string(),
            source: e,
        })?;
        let address = SocketAddress::from(listener.local_addr()?);

        info!(%address, "listening on tcp");

        Ok(Self { listener, address })
    }

    /// Accept an incoming connection.
    ///
    /// In non-blocking mode this returns `TransportError::Accept` with kind
    /// `WouldBlock` when no connection is pending.
    pub fn accept(&self) -> Result<NetStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        // Accepted sockets inherit O_NONBLOCK on some platforms.
        stream.set_nonblocking(false)?;
        debug!(%peer, "accepted connection");
        Ok(NetStream::from_tcp(stream))
    }

    /// Switch the listener between blocking and polling accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Connect to a listening TCP endpoint (blocking).
    pub fn connect(address: &SocketAddress) -> Result<NetStream> {
        let resolved = address.resolve()?;
        let stream = TcpStream::connect(resolved).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            source: e,
        })?;
        debug!(%address, "connected over tcp");
        Ok(NetStream::from_tcp(stream))
    }

    /// The address this listener is bound to.
    pub fn local_address(&self) -> &SocketAddress {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn loopback() -> SocketAddress {
        SocketAddress::new("127.0.0.1", 0)
    }

    #[test]
    fn test_bind_accept_connect() {
        let listener = TcpTransport::bind(&loopback()).unwrap();
        let address = listener.local_address().clone();
        assert_ne!(address.port(), 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect(&address).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_nonblocking_accept_reports_would_block() {
        let listener = TcpTransport::bind(&loopback()).unwrap();
        listener.set_nonblocking(true).unwrap();

        let err = listener.accept().unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to obtain a port with nothing listening.
        let port = {
            let listener = TcpTransport::bind(&loopback()).unwrap();
            listener.local_address().port()
        };
        let result = TcpTransport::connect(&SocketAddress::new("127.0.0.1", port));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_shutdown_wakes_reader() {
        let listener = TcpTransport::bind(&loopback()).unwrap();
        let address = listener.local_address().clone();

        let client = TcpTransport::connect(&address).unwrap();
        let _server = listener.accept().unwrap();

        let reader = client.try_clone().unwrap();
        let handle = std::thread::spawn(move || {
            let mut reader = reader;
            let mut buf = [0u8; 16];
            reader.read(&mut buf).unwrap()
        });

        client.shutdown().unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn test_stream_addresses() {
        let listener = TcpTransport::bind(&loopback()).unwrap();
        let address = listener.local_address().clone();

        let client = TcpTransport::connect(&address).unwrap();
        let server = listener.accept().unwrap();

        assert_eq!(client.peer_address().unwrap(), address);
        assert_eq!(
            server.peer_address().unwrap(),
            client.local_address().unwrap()
        );
    }
}

use netcomm_transport::{DatagramEndpoint, SocketAddress, TcpTransport};

use crate::config::SocketConfig;
use crate::error::Result;
use crate::listener::Listener;
use crate::socket::Socket;

/// Connect to a TCP listener with default configuration.
pub fn connect(address: &SocketAddress) -> Result<Socket> {
    connect_with_config(address, SocketConfig::default())
}

/// Connect to a TCP listener.
pub fn connect_with_config(address: &SocketAddress, config: SocketConfig) -> Result<Socket> {
    let stream = TcpTransport::connect(address)?;
    Socket::from_stream(stream, config)
}

/// Bind a TCP listener with default configuration for accepted sockets.
pub fn listen(address: &SocketAddress) -> Result<Listener> {
    Listener::bind(address)
}

/// Bind a UDP socket with default configuration.
pub fn bind_datagram(address: &SocketAddress) -> Result<Socket> {
    bind_datagram_with_config(address, SocketConfig::default())
}

/// Bind a UDP socket.
pub fn bind_datagram_with_config(address: &SocketAddress, config: SocketConfig) -> Result<Socket> {
    let endpoint = DatagramEndpoint::bind(address)?;
    Socket::from_datagram(endpoint, config)
}

//! TCP and UDP transport endpoints.
//!
//! This is the lowest layer of netcomm:
//! - [`TcpTransport`] binds a listener and opens outbound connections
//! - [`NetStream`] is a connected TCP stream
//! - [`DatagramEndpoint`] is a bound UDP socket with per-datagram addressing
//!
//! Everything above works in terms of these types and [`SocketAddress`].

pub mod address;
pub mod error;
pub mod stream;
pub mod tcp;
pub mod udp;

pub use address::SocketAddress;
pub use error::{Result, TransportError};
pub use stream::NetStream;
pub use tcp::TcpTransport;
pub use udp::DatagramEndpoint;

//! Sockets that speak the netcomm frame protocol.
//!
//! A [`Socket`] wraps a TCP connection or a bound UDP endpoint. Installing a
//! handler with [`Socket::on_received`] starts a background receive loop that
//! feeds every read into a [`netcomm_frame::FrameDecoder`] and reports
//! completed frames, stalled frames, parsing errors and end-of-stream as
//! [`ReceivedEvent`]s. [`Listener`] accepts TCP connections on its own loop.

pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod listener;
pub mod socket;
pub mod watchdog;

pub use config::{
    SocketConfig, DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK_SIZE, DEFAULT_STALL_TIMEOUT,
};
pub use connector::{
    bind_datagram, bind_datagram_with_config, connect, connect_with_config, listen,
};
pub use error::{Result, SocketError};
pub use event::{ReceiveResult, ReceivedEvent};
pub use listener::Listener;
pub use socket::{ConnectionState, Protocol, Socket};
pub use watchdog::{ParseProgress, StallWatchdog};

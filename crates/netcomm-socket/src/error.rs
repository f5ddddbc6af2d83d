/// Errors that can occur in socket operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] netcomm_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] netcomm_frame::FrameError),

    /// The socket or listener has been closed.
    #[error("socket closed")]
    Closed,

    /// A receive loop is already running for this socket.
    #[error("receive handler already installed")]
    AlreadyReceiving,

    /// An accept loop is already running for this listener.
    #[error("accept handler already installed")]
    AlreadyAccepting,

    /// Datagram sockets have no peer; use `send_to`.
    #[error("datagram socket requires a destination address")]
    DestinationRequired,

    /// The operation does not apply to this kind of socket.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The OS accepted only part of a datagram.
    #[error("short datagram write ({written} of {len} bytes)")]
    ShortDatagram { written: usize, len: usize },

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SocketError>;

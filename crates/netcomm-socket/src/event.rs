use netcomm_frame::{Frame, TypedValue};
use netcomm_transport::SocketAddress;

/// Why a receive callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveResult {
    /// A frame arrived; command and args are populated.
    Completed,
    /// A frame has been half-received for longer than the stall timeout.
    Interrupted,
    /// The byte stream is malformed; the receive loop has stopped.
    ParsingError,
    /// The transport reached end-of-stream or was closed.
    Closed,
}

impl ReceiveResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiveResult::Completed => "completed",
            ReceiveResult::Interrupted => "interrupted",
            ReceiveResult::ParsingError => "parsing_error",
            ReceiveResult::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ReceiveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification from a socket's receive loop.
///
/// Only `Completed` events carry a command and arguments; the others have
/// command 0 and no args.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    command: u8,
    args: Vec<TypedValue>,
    result: ReceiveResult,
    remote: Option<SocketAddress>,
}

impl ReceivedEvent {
    pub fn completed(frame: Frame, remote: Option<SocketAddress>) -> Self {
        Self {
            command: frame.command,
            args: frame.args,
            result: ReceiveResult::Completed,
            remote,
        }
    }

    pub fn interrupted(remote: Option<SocketAddress>) -> Self {
        Self::empty(ReceiveResult::Interrupted, remote)
    }

    pub fn parsing_error(remote: Option<SocketAddress>) -> Self {
        Self::empty(ReceiveResult::ParsingError, remote)
    }

    pub fn closed(remote: Option<SocketAddress>) -> Self {
        Self::empty(ReceiveResult::Closed, remote)
    }

    fn empty(result: ReceiveResult, remote: Option<SocketAddress>) -> Self {
        Self {
            command: 0,
            args: Vec::new(),
            result,
            remote,
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn args(&self) -> &[TypedValue] {
        &self.args
    }

    pub fn result(&self) -> ReceiveResult {
        self.result
    }

    /// Address of the peer (TCP) or of the datagram's sender (UDP).
    pub fn remote(&self) -> Option<&SocketAddress> {
        self.remote.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.result == ReceiveResult::Completed
    }

    /// The received frame, for `Completed` events.
    pub fn into_frame(self) -> Option<Frame> {
        self.is_completed()
            .then(|| Frame::new(self.command, self.args))
    }
}

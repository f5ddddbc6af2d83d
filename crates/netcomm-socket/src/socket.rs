use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use netcomm_frame::{write_fully, EncodedMessage, FrameDecoder, FrameError, Step, StepResult};
use netcomm_transport::{DatagramEndpoint, NetStream, SocketAddress};
use tracing::{debug, warn};

use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::event::ReceivedEvent;
use crate::watchdog::{ParseProgress, StallWatchdog};

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a socket.
///
/// Changes only on real events: connect/accept/bind, explicit close,
/// end-of-stream and failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Established = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Established,
            _ => ConnectionState::Closed,
        }
    }
}

type Handler = Arc<dyn Fn(&Socket, ReceivedEvent) + Send + Sync>;

enum Endpoint {
    Stream(NetStream),
    Datagram(DatagramEndpoint),
}

struct SocketInner {
    endpoint: Endpoint,
    local: SocketAddress,
    remote: Option<SocketAddress>,
    state: AtomicU8,
    receiving: AtomicBool,
    write_lock: Mutex<()>,
    progress: Arc<ParseProgress>,
    config: SocketConfig,
}

/// A TCP connection or bound UDP endpoint with a background receive loop.
///
/// Cloning is cheap; clones share the endpoint and its state.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    pub(crate) fn from_stream(stream: NetStream, config: SocketConfig) -> Result<Self> {
        let local = stream.local_address()?;
        let remote = stream.peer_address()?;
        stream.set_write_timeout(config.frame.write_timeout)?;
        stream.set_read_timeout(config.frame.read_timeout)?;

        let socket = Self::new(Endpoint::Stream(stream), local, Some(remote), config);
        socket.set_state(ConnectionState::Established);
        debug!(
            local = %socket.inner.local,
            remote = ?socket.inner.remote,
            "tcp socket established"
        );
        Ok(socket)
    }

    pub(crate) fn from_datagram(endpoint: DatagramEndpoint, config: SocketConfig) -> Result<Self> {
        endpoint.set_read_timeout(Some(config.poll_timeout()))?;
        endpoint.set_write_timeout(config.frame.write_timeout)?;
        let local = endpoint.local_address().clone();

        let socket = Self::new(Endpoint::Datagram(endpoint), local, None, config);
        socket.set_state(ConnectionState::Established);
        Ok(socket)
    }

    fn new(
        endpoint: Endpoint,
        local: SocketAddress,
        remote: Option<SocketAddress>,
        config: SocketConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                endpoint,
                local,
                remote,
                state: AtomicU8::new(ConnectionState::Connecting as u8),
                receiving: AtomicBool::new(false),
                write_lock: Mutex::new(()),
                progress: Arc::new(ParseProgress::new()),
                config,
            }),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.inner.endpoint {
            Endpoint::Stream(_) => Protocol::Tcp,
            Endpoint::Datagram(_) => Protocol::Udp,
        }
    }

    pub fn local_address(&self) -> &SocketAddress {
        &self.inner.local
    }

    /// Peer address of a TCP socket; `None` for UDP.
    pub fn remote_address(&self) -> Option<&SocketAddress> {
        self.inner.remote.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    /// True until the socket is closed.
    pub fn is_available(&self) -> bool {
        self.state() != ConnectionState::Closed
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Decoder progress as last published by the receive loop.
    pub fn progress(&self) -> &ParseProgress {
        &self.inner.progress
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Move to `Closed`; true if this call made the transition.
    fn mark_closed(&self) -> bool {
        self.inner
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel)
            != ConnectionState::Closed as u8
    }

    /// Start the receive loop, delivering every event to `handler`.
    ///
    /// The handler runs on the socket's receive thread (and, for
    /// `Interrupted`, on a watchdog thread). A slow handler holds up further
    /// reads on this socket.
    pub fn on_received<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Socket, ReceivedEvent) + Send + Sync + 'static,
    {
        if self.inner.receiving.swap(true, Ordering::AcqRel) {
            return Err(SocketError::AlreadyReceiving);
        }

        let socket = self.clone();
        let handler: Handler = Arc::new(handler);
        thread::Builder::new()
            .name("netcomm-recv".into())
            .spawn(move || socket.receive_loop(handler))
            .map_err(|source| {
                self.inner.receiving.store(false, Ordering::Release);
                SocketError::Spawn {
                    name: "receive",
                    source,
                }
            })?;
        Ok(())
    }

    /// Send a built message over a TCP connection.
    ///
    /// A failed or zero-progress write closes the socket and is returned.
    pub fn send(&self, message: &EncodedMessage) -> Result<()> {
        let bytes = message.wire()?;
        let Endpoint::Stream(stream) = &self.inner.endpoint else {
            return Err(SocketError::DestinationRequired);
        };
        if !self.is_available() {
            return Err(SocketError::Closed);
        }

        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut writer = stream;
        if let Err(err) = write_fully(&mut writer, bytes) {
            if self.mark_closed() {
                debug!(local = %self.inner.local, error = %err, "write failed, socket closed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Send a built message as one datagram to `destination`.
    pub fn send_to(&self, message: &EncodedMessage, destination: &SocketAddress) -> Result<()> {
        let bytes = message.wire()?;
        let Endpoint::Datagram(endpoint) = &self.inner.endpoint else {
            return Err(SocketError::UnsupportedOperation(
                "send_to on a tcp socket (use send)",
            ));
        };
        if !self.is_available() {
            return Err(SocketError::Closed);
        }

        let written = endpoint.send_to(bytes, destination)?;
        if written < bytes.len() {
            return Err(SocketError::ShortDatagram {
                written,
                len: bytes.len(),
            });
        }
        Ok(())
    }

    /// Close the socket.
    ///
    /// A running receive loop notices shortly after and delivers `Closed`.
    pub fn close(&self) -> Result<()> {
        if !self.mark_closed() {
            return Ok(());
        }
        debug!(protocol = %self.protocol(), local = %self.inner.local, "closing socket");
        if let Endpoint::Stream(stream) = &self.inner.endpoint {
            stream.shutdown()?;
        }
        Ok(())
    }

    fn receive_loop(self, handler: Handler) {
        let config = &self.inner.config;
        let mut decoder = FrameDecoder::with_config(&config.frame);
        let mut chunk = vec![0u8; config.read_chunk_size.max(1)];
        let watchdog = StallWatchdog::new(config.stall_timeout, Arc::clone(&self.inner.progress));
        debug!(protocol = %self.protocol(), local = %self.inner.local, "receive loop started");

        let mut remote = self.inner.remote.clone();
        loop {
            let (n, source) = match self.read_chunk(&mut chunk) {
                Ok(Some(read)) => read,
                Ok(None) if self.is_available() => continue,
                Ok(None) => break,
                Err(err) => {
                    if self.is_available() {
                        debug!(local = %self.inner.local, error = %err, "read failed");
                    }
                    break;
                }
            };
            if source.is_some() {
                remote = source;
            }

            if n == 0 {
                if self.protocol() == Protocol::Tcp {
                    break;
                }
                continue;
            }

            decoder.append(&chunk[..n]);
            if !self.drain(&mut decoder, &watchdog, &handler, &remote) {
                self.inner.progress.stop();
                debug!(local = %self.inner.local, "receive loop stopped on parsing error");
                return;
            }
        }

        self.inner.progress.stop();
        self.mark_closed();
        debug!(local = %self.inner.local, "receive loop finished");
        handler(&self, ReceivedEvent::closed(remote));
    }

    /// One transport read. `Ok(None)` means the read timed out.
    fn read_chunk(&self, chunk: &mut [u8]) -> std::io::Result<Option<(usize, Option<SocketAddress>)>> {
        let read = match &self.inner.endpoint {
            Endpoint::Stream(stream) => {
                let mut reader = stream;
                reader.read(chunk).map(|n| (n, None))
            }
            Endpoint::Datagram(endpoint) => match endpoint.recv_from(chunk) {
                Ok((n, source)) => Ok((n, Some(source))),
                Err(netcomm_transport::TransportError::Io(err)) => Err(err),
                Err(other) => Err(std::io::Error::other(other.to_string())),
            },
        };

        match read {
            Ok(read) => Ok(Some(read)),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Step the decoder until it runs dry. False on a parsing error.
    fn drain(
        &self,
        decoder: &mut FrameDecoder,
        watchdog: &StallWatchdog,
        handler: &Handler,
        remote: &Option<SocketAddress>,
    ) -> bool {
        let progress = &self.inner.progress;
        loop {
            let step = decoder.step();
            let generation = decoder.generation();
            match step {
                Ok(Step::Completed(frame)) => {
                    progress.record(generation, StepResult::Completed);
                    handler(self, ReceivedEvent::completed(frame, remote.clone()));
                }
                Ok(Step::InProgress) => {
                    progress.record(generation, StepResult::InProgress);
                    self.arm_watchdog(watchdog, generation, handler, remote);
                    return true;
                }
                Ok(Step::NoData) => {
                    progress.record(generation, StepResult::NoData);
                    return true;
                }
                Err(err) => {
                    progress.record(generation, StepResult::ParsingError);
                    self.report_parse_error(&err);
                    handler(self, ReceivedEvent::parsing_error(remote.clone()));
                    return false;
                }
            }
        }
    }

    fn arm_watchdog(
        &self,
        watchdog: &StallWatchdog,
        generation: u64,
        handler: &Handler,
        remote: &Option<SocketAddress>,
    ) {
        let socket = self.clone();
        let handler = Arc::clone(handler);
        let remote = remote.clone();
        let delay = watchdog.delay();
        let armed = watchdog.arm(generation, move || {
            warn!(
                local = %socket.inner.local,
                generation,
                ?delay,
                "frame stalled mid-transfer"
            );
            handler(&socket, ReceivedEvent::interrupted(remote));
        });
        if let Err(err) = armed {
            warn!(error = %err, "failed to arm stall watchdog");
        }
    }

    fn report_parse_error(&self, err: &FrameError) {
        warn!(
            protocol = %self.protocol(),
            local = %self.inner.local,
            error = %err,
            "parsing error, receive loop stopping"
        );
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("protocol", &self.protocol())
            .field("local", &self.inner.local)
            .field("remote", &self.inner.remote)
            .field("state", &self.state())
            .finish()
    }
}

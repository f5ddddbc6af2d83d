use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use netcomm_transport::{SocketAddress, TcpTransport};
use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::socket::Socket;

/// Listens for and accepts TCP connections.
///
/// The underlying listener is non-blocking and polled every
/// `poll_interval`, so [`Listener::close`] takes effect without a wake-up
/// connection. Clones share the same listening socket.
#[derive(Clone)]
pub struct Listener {
    transport: Arc<TcpTransport>,
    running: Arc<AtomicBool>,
    accepting: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    config: SocketConfig,
}

impl Listener {
    /// Bind a TCP listener.
    pub fn bind(address: &SocketAddress) -> Result<Self> {
        let transport = TcpTransport::bind(address)?;
        transport.set_nonblocking(true)?;
        Ok(Self {
            transport: Arc::new(transport),
            running: Arc::new(AtomicBool::new(true)),
            accepting: Arc::new(AtomicBool::new(false)),
            accepted: Arc::new(AtomicU64::new(0)),
            config: SocketConfig::default(),
        })
    }

    /// Override the configuration given to accepted sockets.
    pub fn with_socket_config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection (blocking).
    ///
    /// Returns `SocketError::Closed` once the listener has been closed.
    pub fn accept(&self) -> Result<Socket> {
        loop {
            if !self.is_running() {
                return Err(SocketError::Closed);
            }
            match self.transport.accept() {
                Ok(stream) => {
                    let socket = Socket::from_stream(stream, self.config.clone())?;
                    let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        listener = %self.transport.local_address(),
                        remote = ?socket.remote_address(),
                        count,
                        "accepted connection"
                    );
                    return Ok(socket);
                }
                Err(err) if err.is_would_block() => thread::sleep(self.config.poll_timeout()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Run the accept loop on a background thread, handing every accepted
    /// socket to `handler`. The loop ends when the listener is closed.
    pub fn on_accept<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Socket) + Send + Sync + 'static,
    {
        if self.accepting.swap(true, Ordering::AcqRel) {
            return Err(SocketError::AlreadyAccepting);
        }

        let listener = self.clone();
        thread::Builder::new()
            .name("netcomm-accept".into())
            .spawn(move || listener.accept_loop(handler))
            .map_err(|source| {
                self.accepting.store(false, Ordering::Release);
                SocketError::Spawn {
                    name: "accept",
                    source,
                }
            })?;
        Ok(())
    }

    fn accept_loop<F: Fn(Socket)>(self, handler: F) {
        info!(address = %self.transport.local_address(), "accept loop started");
        loop {
            match self.accept() {
                Ok(socket) => handler(socket),
                Err(SocketError::Closed) => break,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(self.config.poll_timeout());
                }
            }
        }
        self.accepting.store(false, Ordering::Release);
        info!(address = %self.transport.local_address(), "accept loop stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop accepting. Sockets already accepted stay open.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!(address = %self.transport.local_address(), "listener closed");
        }
    }

    pub fn local_address(&self) -> &SocketAddress {
        self.transport.local_address()
    }

    /// Number of connections accepted so far.
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("address", self.transport.local_address())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::connector::connect;

    fn loopback() -> SocketAddress {
        SocketAddress::new("127.0.0.1", 0)
    }

    #[test]
    fn accept_returns_established_socket() {
        let listener = Listener::bind(&loopback()).expect("listener should bind");
        let address = listener.local_address().clone();

        let client = thread::spawn(move || connect(&address).expect("client should connect"));
        let server = listener.accept().expect("listener should accept");
        let client = client.join().expect("client thread should finish");

        assert!(server.is_connected());
        assert_eq!(server.remote_address(), Some(client.local_address()));
        assert_eq!(listener.accepted_count(), 1);
    }

    #[test]
    fn accept_after_close_reports_closed() {
        let listener = Listener::bind(&loopback()).expect("listener should bind");
        listener.close();
        assert!(!listener.is_running());
        assert!(matches!(listener.accept(), Err(SocketError::Closed)));
    }

    #[test]
    fn accept_loop_delivers_each_connection() {
        let listener = Listener::bind(&loopback()).expect("listener should bind");
        let (tx, rx) = mpsc::channel();
        listener
            .on_accept(move |socket| {
                let _ = tx.send(socket);
            })
            .expect("accept loop should start");

        let _c1 = connect(listener.local_address()).expect("first client should connect");
        let _c2 = connect(listener.local_address()).expect("second client should connect");

        let wait = Duration::from_secs(5);
        let first = rx.recv_timeout(wait).expect("first socket");
        let second = rx.recv_timeout(wait).expect("second socket");
        assert_ne!(first.remote_address(), second.remote_address());

        listener.close();
    }

    #[test]
    fn second_accept_loop_is_rejected() {
        let listener = Listener::bind(&loopback()).expect("listener should bind");
        listener.on_accept(|_| {}).expect("accept loop should start");
        assert!(matches!(
            listener.on_accept(|_| {}),
            Err(SocketError::AlreadyAccepting)
        ));
        listener.close();
    }
}

use std::time::Duration;

use netcomm_frame::FrameConfig;

/// Delay before an incomplete frame is reported as interrupted.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_millis(15_000);
/// Bytes requested per transport read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
/// Wake-up interval for loops that have to notice `close()`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Behavior knobs shared by sockets and listeners.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// How long a frame may sit half-received before an `Interrupted` event.
    pub stall_timeout: Duration,
    /// Read buffer size for the receive loop.
    pub read_chunk_size: usize,
    /// Poll interval for UDP receive loops and listener accept loops.
    pub poll_interval: Duration,
    /// Decoder limits and socket I/O timeouts.
    pub frame: FrameConfig,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame: FrameConfig::default(),
        }
    }
}

impl SocketConfig {
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Poll interval clamped to something the OS accepts as a read timeout.
    pub(crate) fn poll_timeout(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }
}

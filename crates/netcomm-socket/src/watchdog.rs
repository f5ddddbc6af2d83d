//! Stall detection for half-received frames.
//!
//! The receive loop publishes the decoder's generation (frames completed so
//! far) and last step result into a [`ParseProgress`]. When a step ends
//! mid-frame the loop arms a [`StallWatchdog`] for the current generation. The
//! watchdog sleeps for the stall timeout and then fires only if the same
//! generation is still in progress and the loop is still running, so a frame
//! that completes in the meantime never yields a spurious notification.
//!
//! At most one watchdog is armed per generation.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netcomm_frame::StepResult;
use tracing::{debug, trace};

/// Decoder progress shared between a receive loop and its watchdogs.
#[derive(Debug)]
pub struct ParseProgress {
    generation: AtomicU64,
    last: AtomicU8,
    live: AtomicBool,
    // generation + 1 of the armed watchdog, 0 when none is armed
    armed: AtomicU64,
}

impl Default for ParseProgress {
    fn default() -> Self {
        Self {
            generation: AtomicU64::new(0),
            last: AtomicU8::new(StepResult::NoData as u8),
            live: AtomicBool::new(true),
            armed: AtomicU64::new(0),
        }
    }
}

impl ParseProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of a decoder step.
    pub fn record(&self, generation: u64, result: StepResult) {
        self.generation.store(generation, Ordering::Release);
        self.last.store(result as u8, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn last_result(&self) -> StepResult {
        StepResult::from_u8(self.last.load(Ordering::Acquire)).unwrap_or(StepResult::NoData)
    }

    /// True if the frame of `generation` is still incomplete and the loop
    /// that started it is still running.
    pub fn is_stalled(&self, generation: u64) -> bool {
        self.is_live()
            && self.generation() == generation
            && self.last_result() == StepResult::InProgress
    }

    /// Mark the receive loop as finished; pending watchdogs stay silent.
    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Claim the watchdog slot for `generation`. False if one is already armed.
    pub fn try_arm(&self, generation: u64) -> bool {
        self.armed.swap(generation + 1, Ordering::AcqRel) != generation + 1
    }

    /// Release the slot if it still belongs to `generation`.
    pub fn disarm(&self, generation: u64) {
        let _ = self.armed.compare_exchange(
            generation + 1,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire) != 0
    }
}

/// One-shot delayed stall check.
#[derive(Debug, Clone)]
pub struct StallWatchdog {
    delay: Duration,
    progress: Arc<ParseProgress>,
}

impl StallWatchdog {
    pub fn new(delay: Duration, progress: Arc<ParseProgress>) -> Self {
        Self { delay, progress }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm a watchdog for `generation`, running `on_stall` if the frame is
    /// still incomplete after the delay.
    ///
    /// Returns `Ok(false)` without spawning when a watchdog for this
    /// generation is already armed.
    pub fn arm<F>(&self, generation: u64, on_stall: F) -> std::io::Result<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.progress.try_arm(generation) {
            trace!(generation, "stall watchdog already armed");
            return Ok(false);
        }

        let delay = self.delay;
        let progress = Arc::clone(&self.progress);
        let spawned = thread::Builder::new()
            .name("netcomm-watchdog".into())
            .spawn(move || {
                thread::sleep(delay);
                progress.disarm(generation);
                if progress.is_stalled(generation) {
                    on_stall();
                } else {
                    debug!(generation, "frame finished before stall timeout");
                }
            });

        match spawned {
            Ok(_) => Ok(true),
            Err(err) => {
                self.progress.disarm(generation);
                Err(err)
            }
        }
    }
}

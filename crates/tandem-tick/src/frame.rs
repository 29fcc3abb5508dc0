//! Fixed-timestep frame clock.
//!
//! Stands in for a game engine's frame loop when the client runs
//! headless. Late frames are never replayed: the clock skips ahead and
//! reports how many frames were lost, which is all the heartbeat and
//! position sync need.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Configuration for [`FrameClock`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Frames per second. Clamped to `1..=MAX_RATE_HZ`.
    pub rate_hz: u32,
    /// Random delay (0..max µs) before the first frame.
    pub initial_jitter_us: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60,
            initial_jitter_us: 0,
        }
    }
}

impl FrameConfig {
    pub const MAX_RATE_HZ: u32 = 240;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamp the rate into the supported range.
    pub fn validated(mut self) -> Self {
        if self.rate_hz == 0 || self.rate_hz > Self::MAX_RATE_HZ {
            let clamped = self.rate_hz.clamp(1, Self::MAX_RATE_HZ);
            warn!(rate = self.rate_hz, clamped, "frame rate out of range, clamping");
            self.rate_hz = clamped;
        }
        self
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz as f64)
    }
}

/// Returned by [`FrameClock::wait_for_frame`].
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Fixed delta for this frame. Feed this to the heartbeat, not wall time.
    pub dt: Duration,
    /// `true` when the frame fired more than 10% late.
    pub overrun: bool,
    pub frames_skipped: u64,
}

/// Async fixed-rate clock.
pub struct FrameClock {
    frame_duration: Duration,
    frame_count: u64,
    next_frame: Instant,
    paused: bool,
    total_skipped: u64,
}

impl FrameClock {
    pub fn new(config: FrameConfig) -> Self {
        let config = config.validated();
        let frame_duration = config.frame_duration();

        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };

        debug!(
            rate_hz = config.rate_hz,
            frame_ms = frame_duration.as_secs_f64() * 1000.0,
            "frame clock created"
        );

        Self {
            frame_duration,
            frame_count: 0,
            next_frame: Instant::now() + frame_duration + jitter,
            paused: false,
            total_skipped: 0,
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(FrameConfig::with_rate(rate_hz))
    }

    /// Wait for the next frame.
    ///
    /// Pends forever while paused, so it is safe inside `tokio::select!`.
    pub async fn wait_for_frame(&mut self) -> FrameInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let due = self.next_frame;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.frame_count += 1;

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.frame_duration / 10;
        let mut frames_skipped = 0;
        if overrun {
            frames_skipped = (late_by.as_nanos() / self.frame_duration.as_nanos()) as u64;
            if frames_skipped > 0 {
                warn!(
                    frame = self.frame_count,
                    skipped = frames_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "frame overrun, skipping ahead"
                );
            }
        }
        self.total_skipped += frames_skipped;
        // Schedule from now, not from the missed deadline.
        self.next_frame = now + self.frame_duration;

        trace!(frame = self.frame_count, overrun, "frame fired");

        FrameInfo {
            frame: self.frame_count,
            dt: self.frame_duration,
            overrun,
            frames_skipped,
        }
    }

    /// Stop producing frames until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(frame = self.frame_count, "frame clock paused");
        }
    }

    /// Resume after a pause. The next frame is one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_frame = Instant::now() + self.frame_duration;
            debug!(frame = self.frame_count, "frame clock resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames lost to overruns since creation.
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}

//! Keep-alive and reconnect scheduling.

use std::time::Duration;

use rand::Rng;
use tandem_transport::ConnectionState;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing for the heartbeat loop.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// How long to stay disconnected before the next connect attempt.
    pub reconnect_interval: Duration,
    /// Time between keep-alive pings while connected.
    pub ping_interval: Duration,
    /// Upper bound of a random delay added to every reconnect interval so a
    /// server restart doesn't get every client back on the same frame.
    pub reconnect_jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            reconnect_jitter: Duration::ZERO,
        }
    }
}

impl HeartbeatConfig {
    /// Shortest interval accepted for either timer.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`HeartbeatScheduler::new`]. Intervals shorter
    /// than [`Self::MIN_INTERVAL`] would turn the heartbeat into a busy loop.
    pub fn validated(mut self) -> Self {
        if self.reconnect_interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.reconnect_interval.as_millis() as u64,
                "reconnect_interval below minimum, clamping"
            );
            self.reconnect_interval = Self::MIN_INTERVAL;
        }
        if self.ping_interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.ping_interval.as_millis() as u64,
                "ping_interval below minimum, clamping"
            );
            self.ping_interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// What the caller should do after a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Call `connect` now. The attempt counter has already been reset.
    Reconnect,
    /// Send a `ping`. The next one is scheduled without waiting for a reply.
    Ping,
}

/// Accumulates elapsed time per connection state and reports when a
/// reconnect or ping is due.
///
/// ```text
/// Disconnected: reconnect_elapsed += dt → ≥ interval(+jitter) → Reconnect, reset
/// Connecting:   nothing
/// Connected:    since_ping += dt        → ≥ ping_interval     → Ping, reset
/// ```
///
/// Liveness is fire-and-forget: a missing pong never delays the next ping.
/// Detecting a dead peer is left to the transport's read side.
pub struct HeartbeatScheduler {
    config: HeartbeatConfig,
    reconnect_elapsed: Duration,
    reconnect_due: Duration,
    since_ping: Duration,
    last_state: ConnectionState,
    reconnect_attempts: u64,
    pings_sent: u64,
}

impl HeartbeatScheduler {
    /// Create a scheduler from config.
    pub fn new(config: HeartbeatConfig) -> Self {
        let config = config.validated();
        let reconnect_due = roll_reconnect_due(&config);
        debug!(
            reconnect_s = config.reconnect_interval.as_secs_f64(),
            ping_s = config.ping_interval.as_secs_f64(),
            "heartbeat scheduler created"
        );
        Self {
            config,
            reconnect_elapsed: Duration::ZERO,
            reconnect_due,
            since_ping: Duration::ZERO,
            last_state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            pings_sent: 0,
        }
    }

    /// Advance by `dt` given the transport's current state.
    pub fn tick(&mut self, dt: Duration, state: ConnectionState) -> HeartbeatAction {
        if state != self.last_state {
            trace!(from = %self.last_state, to = %state, "heartbeat saw state change");
            match state {
                // A fresh connection starts a full ping interval.
                ConnectionState::Connected => self.since_ping = Duration::ZERO,
                ConnectionState::Disconnected => self.reconnect_elapsed = Duration::ZERO,
                ConnectionState::Connecting => {}
            }
            self.last_state = state;
        }

        match state {
            ConnectionState::Disconnected => {
                self.reconnect_elapsed += dt;
                if self.reconnect_elapsed >= self.reconnect_due {
                    // Reset on every attempt, whatever its outcome.
                    self.reconnect_elapsed = Duration::ZERO;
                    self.reconnect_due = roll_reconnect_due(&self.config);
                    self.reconnect_attempts += 1;
                    debug!(attempt = self.reconnect_attempts, "reconnect due");
                    HeartbeatAction::Reconnect
                } else {
                    HeartbeatAction::Idle
                }
            }
            ConnectionState::Connecting => HeartbeatAction::Idle,
            ConnectionState::Connected => {
                self.since_ping += dt;
                if self.since_ping >= self.config.ping_interval {
                    self.since_ping = Duration::ZERO;
                    self.pings_sent += 1;
                    trace!(pings = self.pings_sent, "ping due");
                    HeartbeatAction::Ping
                } else {
                    HeartbeatAction::Idle
                }
            }
        }
    }

    /// Number of reconnect attempts requested so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    /// Number of pings requested so far.
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}

fn roll_reconnect_due(config: &HeartbeatConfig) -> Duration {
    if config.reconnect_jitter.is_zero() {
        return config.reconnect_interval;
    }
    let max_ms = config.reconnect_jitter.as_millis() as u64;
    let extra = rand::rng().random_range(0..=max_ms);
    config.reconnect_interval + Duration::from_millis(extra)
}

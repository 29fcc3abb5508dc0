//! Integration tests for the frame clock and its pairing with the heartbeat.
//!
//! All async tests run with a paused Tokio clock, so `sleep_until`
//! resolves as soon as the runtime auto-advances time.

use std::time::Duration;

use tandem_tick::{
    FrameClock, FrameConfig, HeartbeatAction, HeartbeatConfig, HeartbeatScheduler,
};
use tandem_transport::ConnectionState;

// =========================================================================
// FrameConfig
// =========================================================================

#[test]
fn test_default_config_is_60hz() {
    let cfg = FrameConfig::default();
    assert_eq!(cfg.rate_hz, 60);
    assert_eq!(cfg.frame_duration(), Duration::from_secs_f64(1.0 / 60.0));
}

#[test]
fn test_zero_rate_is_clamped_to_one() {
    let cfg = FrameConfig::with_rate(0).validated();
    assert_eq!(cfg.rate_hz, 1);
}

#[test]
fn test_excessive_rate_is_clamped() {
    let cfg = FrameConfig::with_rate(10_000).validated();
    assert_eq!(cfg.rate_hz, FrameConfig::MAX_RATE_HZ);
}

// =========================================================================
// Frame firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_frames_are_numbered_from_one() {
    let mut clock = FrameClock::with_rate(20);

    let first = clock.wait_for_frame().await;
    let second = clock.wait_for_frame().await;

    assert_eq!(first.frame, 1);
    assert_eq!(second.frame, 2);
    assert_eq!(first.dt, Duration::from_millis(50));
    assert!(!first.overrun);
    assert_eq!(clock.frame_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_frame_skips_ahead() {
    let mut clock = FrameClock::with_rate(20);
    clock.wait_for_frame().await;

    // Block the "game" for 5 frame periods.
    tokio::time::advance(Duration::from_millis(250)).await;

    let info = clock.wait_for_frame().await;
    assert!(info.overrun);
    assert!(info.frames_skipped >= 3, "skipped {}", info.frames_skipped);
    assert_eq!(clock.total_skipped(), info.frames_skipped);

    // Cadence resumes normally afterwards.
    let next = clock.wait_for_frame().await;
    assert!(!next.overrun);
}

#[tokio::test(start_paused = true)]
async fn test_paused_clock_never_fires() {
    let mut clock = FrameClock::with_rate(20);
    clock.pause();
    assert!(clock.is_paused());

    let fired = tokio::time::timeout(Duration::from_secs(5), clock.wait_for_frame()).await;
    assert!(fired.is_err(), "paused clock should pend");

    clock.resume();
    let info = clock.wait_for_frame().await;
    assert_eq!(info.frame, 1);
    assert!(!info.overrun, "resume must not report the pause as overrun");
}

// =========================================================================
// Driving the heartbeat
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reconnects_after_ten_seconds_of_frames() {
    let mut clock = FrameClock::with_rate(10);
    let mut heartbeat = HeartbeatScheduler::new(HeartbeatConfig::default());

    let mut reconnect_frame = None;
    for _ in 0..150 {
        let info = clock.wait_for_frame().await;
        if heartbeat.tick(info.dt, ConnectionState::Disconnected) == HeartbeatAction::Reconnect {
            reconnect_frame = Some(info.frame);
            break;
        }
    }

    // 100 frames of 100ms, give or take float rounding of the period.
    let frame = reconnect_frame.expect("reconnect should be due");
    assert!((100..=101).contains(&frame), "fired on frame {frame}");
}

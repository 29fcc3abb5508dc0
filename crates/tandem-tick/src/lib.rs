//! Time-driven scheduling for Tandem clients.
//!
//! Two pieces live here:
//!
//! - [`HeartbeatScheduler`] decides, once per game tick, whether the
//!   client should try to reconnect or send a keep-alive `ping`. It is pure
//!   bookkeeping over elapsed time, so the host's own frame loop can drive it.
//! - [`FrameClock`] is a fixed-timestep async clock for hosts that have no
//!   engine frame of their own (the demo client, tests).
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(line) = input.recv() => client.submit_input(&line),
//!         frame = clock.wait_for_frame() => {
//!             client.on_tick(frame.dt).await;
//!         }
//!     }
//! }
//! ```

mod frame;
mod heartbeat;

pub use frame::{FrameClock, FrameConfig, FrameInfo};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatScheduler};

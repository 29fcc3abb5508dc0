//! # Tandem
//!
//! Peer-to-peer sessions for a single-player RPG: chat, position relay,
//! item/creature trades and turn-based battles between two players,
//! carried over one WebSocket link to a relay server.
//!
//! The game implements [`Host`] and embeds a [`TandemClient`]; everything
//! else runs inside [`TandemClient::on_tick`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use tandem::prelude::*;
//!
//! # async fn run(game: impl Host + 'static) -> Result<(), NetError> {
//! let config = ClientConfig::for_player("ash");
//! let mut client = TandemClient::new(config, game)?;
//! client.connect().await?;
//!
//! let mut clock = FrameClock::new(FrameConfig::default());
//! loop {
//!     let frame = clock.wait_for_frame().await;
//!     client.on_tick(frame.dt).await;
//!     if client.trade_active() {
//!         // draw the trade screen
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod commands;
mod client;
mod config;
pub mod directory;
pub mod dispatch;
mod error;
pub mod link;

pub use chat::{ChatEntry, ChatKind, ChatLog};
pub use client::TandemClient;
pub use commands::{Command, CommandError, CommandRouter};
pub use config::{ClientConfig, ServerDescriptor};
pub use directory::{PeerDirectory, PeerSnapshot, PeerUpdate, SpriteHandle};
pub use dispatch::Dispatcher;
pub use error::NetError;
pub use link::{Link, LinkEvent};

/// Convenience re-exports for hosts embedding Tandem.
pub mod prelude {
    pub use crate::{ChatKind, ClientConfig, NetError, ServerDescriptor, TandemClient};
    pub use tandem_protocol::{
        Action, BattleOutcome, ItemId, PeerId, PositionUpdate, RosterEntry, SessionKind,
    };
    pub use tandem_session::{Host, Notice, OfferChange, PartyMember, TurnContext};
    pub use tandem_tick::{FrameClock, FrameConfig};
    pub use tandem_transport::ConnectionState;
}

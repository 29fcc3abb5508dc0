//! Wire protocol for Tandem.
//!
//! This crate defines what two game clients say to each other through the
//! session server:
//!
//! - **Types** ([`Message`], [`Payload`], [`PeerId`], etc.): the structures
//!   that travel on the wire, one [`Payload`] variant per message type.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the session
//! state machines. It knows nothing about connections or session phases.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (trade / battle state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Action, BattleOutcome, Direction, ItemId, ItemStack, Message, MessageKind,
    MoveId, Payload, PeerId, PositionUpdate, RosterEntry, RosterStatus,
    SessionKind, TradeUpdate, now_millis,
};

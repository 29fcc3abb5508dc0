//! Two-party sessions for Tandem: trades and battles.
//!
//! This crate owns the rules, not the network:
//!
//! 1. **Proposals**: who asked whom for what, and when it times out
//!    ([`SessionRegistry`])
//! 2. **Trades**: offers, confirmation, and the final exchange
//!    ([`TradeSession`])
//! 3. **Battles**: rosters, one action per side per turn, and the result
//!    ([`BattleSession`])
//!
//! The game itself is reached through the [`Host`] trait.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (tandem)           ← dispatches inbound messages, sends Effects
//!     ↕
//! Session Layer (this crate) ← pure state machines over Payloads
//!     ↕
//! Protocol Layer (below)     ← Payload, PeerId, RosterEntry, Action
//! ```

mod battle;
mod error;
mod host;
mod registry;
mod trade;

pub use battle::{BattlePhase, BattleSession, TurnReport, check_battle_result};
pub use error::{SessionError, ValidationError};
pub use host::{Host, PartyMember, TurnContext};
pub use registry::{
    CancelReason, Effects, Notice, OfferChange, PendingRequest, RequestDirection, RequestStatus,
    SessionConfig, SessionRegistry,
};
pub use trade::{TradeOffer, TradePhase, TradeSession};

//! Error types for the session layer.

use tandem_protocol::{ItemId, PeerId, SessionKind};

/// Errors from [`SessionRegistry`](crate::SessionRegistry) operations and
/// from applying inbound session messages.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session of this kind is already running. Only one trade and one
    /// battle may be active at a time.
    #[error("a {0} session is already active")]
    AlreadyInSession(SessionKind),

    /// An outgoing proposal of this kind to the same peer hasn't been
    /// answered yet.
    #[error("a {0} request to {1} is still pending")]
    RequestPending(SessionKind, PeerId),

    /// There is no incoming proposal of this kind from that peer (it may
    /// have expired).
    #[error("no pending {0} request from {1}")]
    NoPendingRequest(SessionKind, PeerId),

    #[error("no active {0} session")]
    NoActiveSession(SessionKind),

    /// A local operation was refused. Nothing changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An inbound message that the current session or phase cannot accept.
    /// The message is discarded and state is left unchanged.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl SessionError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

/// Why a local trade or battle operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("you can't start a session with yourself")]
    SelfTarget,

    #[error("quantity must be greater than zero")]
    ZeroQuantity,

    #[error("not enough of item {item}: offering {requested}, own {owned}")]
    InsufficientItems { item: ItemId, requested: u32, owned: u32 },

    #[error("item {item} is offered {offered} times, can't remove {requested}")]
    NotOffered {
        item: ItemId,
        offered: u32,
        requested: u32,
    },

    #[error("no party member in slot {0}")]
    InvalidCreatureSlot(usize),

    #[error("party slot {0} is already offered")]
    CreatureAlreadyOffered(usize),

    #[error("party slot {0} is not in the offer")]
    CreatureNotOffered(usize),

    #[error("not enough money: offering {requested}, own {owned}")]
    InsufficientMoney { requested: u64, owned: u64 },

    /// The local offer is confirmed and can no longer change.
    #[error("offer is confirmed and can't be changed")]
    OfferFrozen,

    #[error("no party member can battle")]
    NoEligibleCreatures,

    #[error("an action was already chosen this turn")]
    ActionAlreadyPending,

    #[error("the current creature is fainted")]
    CreatureFainted,

    #[error("the current creature has no move in slot {0}")]
    UnknownMove(usize),

    #[error("item {0} is not in the inventory")]
    ItemNotOwned(ItemId),

    #[error("can't switch to roster slot {0}")]
    InvalidSwitch(usize),

    #[error("you can't flee from a battle against another player")]
    FleeNotAllowed,
}

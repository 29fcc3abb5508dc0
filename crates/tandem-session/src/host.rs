//! The game-side collaborator that sessions read from and write to.

use std::collections::BTreeSet;

use tandem_protocol::{Action, ItemId, MoveId, PeerId, RosterEntry};

/// One creature in the local player's party, as the game reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMember {
    pub slot_index: usize,
    pub species: u16,
    pub level: u8,
    pub hp: u32,
    pub max_hp: u32,
    pub moves: Vec<MoveId>,
}

/// Both sides of a turn, handed to [`Host::resolve_turn`] after switches
/// have been applied.
///
/// The host may change any `hp`; fainting is derived from `hp == 0`
/// afterwards, so hooks don't need to touch `status`.
#[derive(Debug)]
pub struct TurnContext<'a> {
    pub turn: u32,
    pub local: &'a mut [RosterEntry],
    pub local_current: usize,
    pub local_action: Action,
    pub remote: &'a mut [RosterEntry],
    pub remote_current: usize,
    pub remote_action: Action,
}

/// Everything the session layer needs from the running game.
///
/// Queries are used for validation; mutations are only called when a
/// trade completes. The two hooks have no-op defaults so a host without a
/// battle engine still works (turns then only apply switches).
pub trait Host {
    fn party(&self) -> Vec<PartyMember>;

    fn item_count(&self, item: ItemId) -> u32;

    fn money(&self) -> u64;

    fn take_item(&mut self, item: ItemId, amount: u32);

    fn give_item(&mut self, item: ItemId, amount: u32);

    fn spend_money(&mut self, amount: u64);

    fn earn_money(&mut self, amount: u64);

    /// Hand the given party slots over to `to`.
    fn release_creatures(&mut self, to: &PeerId, slots: &BTreeSet<usize>);

    /// Receive the creatures `from` offered out of their party slots.
    fn receive_creatures(&mut self, from: &PeerId, slots: &BTreeSet<usize>);

    /// Apply damage and effects for one turn.
    fn resolve_turn(&mut self, turn: &mut TurnContext<'_>) {
        let _ = turn;
    }

    /// The opponent's team arrived and the battle can be shown.
    fn start_encounter(&mut self, opponent: &PeerId, team: &[RosterEntry]) {
        let _ = (opponent, team);
    }
}

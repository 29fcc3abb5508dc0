//! Item, creature and money exchange between two players.
//!
//! Each side owns exactly one [`TradeOffer`] and mirrors the other. The
//! exchange happens once both offers are confirmed; each client applies
//! its half independently, so the commit is not atomic across the pair.

use std::collections::{BTreeMap, BTreeSet};

use tandem_protocol::{ItemId, ItemStack, Payload, PeerId, TradeUpdate};
use tracing::{debug, info};

use crate::{Host, SessionError, ValidationError};

/// One side's offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeOffer {
    /// Item id to quantity. Entries are removed when they reach zero.
    pub items: BTreeMap<ItemId, u32>,
    /// Party slot indices of the offering player.
    pub creatures: BTreeSet<usize>,
    pub money: u64,
    pub confirmed: bool,
}

impl TradeOffer {
    pub fn to_update(&self) -> TradeUpdate {
        TradeUpdate {
            items: self
                .items
                .iter()
                .map(|(&id, &amount)| ItemStack { id, amount })
                .collect(),
            creatures: self.creatures.iter().copied().collect(),
            money: self.money,
            confirmed: self.confirmed,
        }
    }

    /// Builds a mirror from the wire. Repeated item ids are summed and
    /// zero amounts dropped; a sum that overflows is a protocol violation.
    pub fn from_update(update: &TradeUpdate) -> Result<Self, SessionError> {
        let mut items = BTreeMap::new();
        for stack in update.items.iter().filter(|s| s.amount > 0) {
            let total: &mut u32 = items.entry(stack.id).or_insert(0);
            *total = total.checked_add(stack.amount).ok_or_else(|| {
                SessionError::violation(format!("item {} quantity overflows", stack.id))
            })?;
        }
        Ok(Self {
            items,
            creatures: update.creatures.iter().copied().collect(),
            money: update.money,
            confirmed: update.confirmed,
        })
    }

    /// Same contents, ignoring the confirmation flag.
    fn same_contents(&self, other: &Self) -> bool {
        self.items == other.items && self.creatures == other.creatures && self.money == other.money
    }
}

/// Where a trade is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePhase {
    Active,
    Completed,
    Cancelled,
}

/// An accepted trade with one peer.
#[derive(Debug)]
pub struct TradeSession {
    peer: PeerId,
    phase: TradePhase,
    local: TradeOffer,
    remote: TradeOffer,
}

impl TradeSession {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            phase: TradePhase::Active,
            local: TradeOffer::default(),
            remote: TradeOffer::default(),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    pub fn local(&self) -> &TradeOffer {
        &self.local
    }

    pub fn remote(&self) -> &TradeOffer {
        &self.remote
    }

    fn ensure_open(&self) -> Result<(), ValidationError> {
        if self.local.confirmed {
            return Err(ValidationError::OfferFrozen);
        }
        Ok(())
    }

    /// Add `amount` of `item` to the offer. The total offered may not
    /// exceed what the host owns.
    pub fn add_item(
        &mut self,
        host: &impl Host,
        item: ItemId,
        amount: u32,
    ) -> Result<(), ValidationError> {
        self.ensure_open()?;
        if amount == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        let offered = self.local.items.get(&item).copied().unwrap_or(0);
        let requested = offered.saturating_add(amount);
        let owned = host.item_count(item);
        if requested > owned {
            return Err(ValidationError::InsufficientItems {
                item,
                requested,
                owned,
            });
        }
        self.local.items.insert(item, requested);
        debug!(peer = %self.peer, item, total = requested, "item added to offer");
        Ok(())
    }

    /// Take `amount` of `item` back out of the offer.
    pub fn remove_item(&mut self, item: ItemId, amount: u32) -> Result<(), ValidationError> {
        self.ensure_open()?;
        if amount == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        let offered = self.local.items.get(&item).copied().unwrap_or(0);
        if amount > offered {
            return Err(ValidationError::NotOffered {
                item,
                offered,
                requested: amount,
            });
        }
        if amount == offered {
            self.local.items.remove(&item);
        } else {
            self.local.items.insert(item, offered - amount);
        }
        Ok(())
    }

    pub fn add_creature(&mut self, host: &impl Host, slot: usize) -> Result<(), ValidationError> {
        self.ensure_open()?;
        if slot >= host.party().len() {
            return Err(ValidationError::InvalidCreatureSlot(slot));
        }
        if !self.local.creatures.insert(slot) {
            return Err(ValidationError::CreatureAlreadyOffered(slot));
        }
        Ok(())
    }

    pub fn remove_creature(&mut self, slot: usize) -> Result<(), ValidationError> {
        self.ensure_open()?;
        if !self.local.creatures.remove(&slot) {
            return Err(ValidationError::CreatureNotOffered(slot));
        }
        Ok(())
    }

    pub fn set_money(&mut self, host: &impl Host, amount: u64) -> Result<(), ValidationError> {
        self.ensure_open()?;
        let owned = host.money();
        if amount > owned {
            return Err(ValidationError::InsufficientMoney {
                requested: amount,
                owned,
            });
        }
        self.local.money = amount;
        Ok(())
    }

    /// The full local offer as a `trade_update`.
    pub fn publish(&self) -> Payload {
        Payload::TradeUpdate(self.local.to_update())
    }

    /// Lock the local offer. Returns the `trade_update` carrying the
    /// confirmation.
    pub fn confirm(&mut self) -> Result<Payload, ValidationError> {
        self.ensure_open()?;
        self.local.confirmed = true;
        debug!(peer = %self.peer, "local offer confirmed");
        Ok(self.publish())
    }

    /// Replace the mirror of the peer's offer.
    ///
    /// Once the peer has confirmed, their offer is frozen too: an update
    /// that changes its contents (or withdraws the confirmation) is rejected.
    pub fn apply_remote(&mut self, update: &TradeUpdate) -> Result<(), SessionError> {
        let incoming = TradeOffer::from_update(update)?;
        if self.remote.confirmed && !(incoming.confirmed && incoming.same_contents(&self.remote)) {
            return Err(SessionError::violation(format!(
                "{} changed a confirmed offer",
                self.peer
            )));
        }
        self.remote = incoming;
        Ok(())
    }

    /// Both sides have confirmed.
    pub fn is_ready(&self) -> bool {
        self.phase == TradePhase::Active && self.local.confirmed && self.remote.confirmed
    }

    /// Apply the exchange through the host. Only runs once, and only when
    /// both sides are confirmed; returns whether anything was applied.
    pub fn complete(&mut self, host: &mut impl Host) -> bool {
        if !self.is_ready() {
            return false;
        }

        for (&item, &amount) in &self.local.items {
            host.take_item(item, amount);
        }
        if !self.local.creatures.is_empty() {
            host.release_creatures(&self.peer, &self.local.creatures);
        }
        if self.local.money > 0 {
            host.spend_money(self.local.money);
        }

        for (&item, &amount) in &self.remote.items {
            host.give_item(item, amount);
        }
        if !self.remote.creatures.is_empty() {
            host.receive_creatures(&self.peer, &self.remote.creatures);
        }
        if self.remote.money > 0 {
            host.earn_money(self.remote.money);
        }

        self.phase = TradePhase::Completed;
        info!(peer = %self.peer, "trade completed");
        true
    }

    /// Mark the trade cancelled and return the `trade_cancel` for the peer.
    pub fn cancel(&mut self) -> Payload {
        self.phase = TradePhase::Cancelled;
        Payload::TradeCancel {
            target: self.peer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockHost;

    fn session() -> (TradeSession, MockHost) {
        (TradeSession::new(PeerId::new("misty")), MockHost::with_party(&[40, 40, 0]))
    }

    #[test]
    fn test_add_item_merges_quantities() {
        let (mut trade, host) = session();
        trade.add_item(&host, 1, 2).unwrap();
        trade.add_item(&host, 1, 3).unwrap();
        assert_eq!(trade.local().items[&1], 5);
    }

    #[test]
    fn test_add_item_rejects_more_than_owned_in_total() {
        let (mut trade, host) = session();
        trade.add_item(&host, 4, 2).unwrap();

        let err = trade.add_item(&host, 4, 1).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientItems {
                item: 4,
                requested: 3,
                owned: 2
            }
        );
        assert_eq!(trade.local().items[&4], 2);
    }

    #[test]
    fn test_add_item_rejects_zero() {
        let (mut trade, host) = session();
        assert_eq!(trade.add_item(&host, 1, 0), Err(ValidationError::ZeroQuantity));
    }

    #[test]
    fn test_quantities_track_additions_minus_removals() {
        let (mut trade, host) = session();
        trade.add_item(&host, 1, 4).unwrap();
        trade.remove_item(1, 1).unwrap();
        trade.add_item(&host, 1, 1).unwrap();
        trade.remove_item(1, 2).unwrap();
        assert_eq!(trade.local().items[&1], 2);

        // Removing more than offered is refused rather than clamped.
        assert!(matches!(
            trade.remove_item(1, 3),
            Err(ValidationError::NotOffered { offered: 2, .. })
        ));
        trade.remove_item(1, 2).unwrap();
        assert!(trade.local().items.is_empty());
    }

    #[test]
    fn test_creature_slots() {
        let (mut trade, host) = session();
        trade.add_creature(&host, 0).unwrap();
        assert_eq!(
            trade.add_creature(&host, 0),
            Err(ValidationError::CreatureAlreadyOffered(0))
        );
        assert_eq!(
            trade.add_creature(&host, 3),
            Err(ValidationError::InvalidCreatureSlot(3))
        );
        assert_eq!(
            trade.remove_creature(1),
            Err(ValidationError::CreatureNotOffered(1))
        );
        trade.remove_creature(0).unwrap();
    }

    #[test]
    fn test_set_money_capped_by_owned() {
        let (mut trade, host) = session();
        trade.set_money(&host, 1_000).unwrap();
        assert!(matches!(
            trade.set_money(&host, 1_001),
            Err(ValidationError::InsufficientMoney { owned: 1_000, .. })
        ));
        assert_eq!(trade.local().money, 1_000);
    }

    #[test]
    fn test_confirmed_offer_is_frozen() {
        let (mut trade, host) = session();
        trade.add_item(&host, 1, 1).unwrap();
        trade.confirm().unwrap();

        assert_eq!(trade.add_item(&host, 1, 1), Err(ValidationError::OfferFrozen));
        assert_eq!(trade.remove_item(1, 1), Err(ValidationError::OfferFrozen));
        assert_eq!(trade.set_money(&host, 1), Err(ValidationError::OfferFrozen));
        assert_eq!(trade.confirm(), Err(ValidationError::OfferFrozen));
    }

    #[test]
    fn test_one_sided_confirmation_is_not_ready() {
        let (mut trade, mut host) = session();
        trade.confirm().unwrap();
        assert!(!trade.is_ready());
        assert!(!trade.complete(&mut host));
        assert_eq!(trade.phase(), TradePhase::Active);
    }

    #[test]
    fn test_apply_remote_rejects_change_after_confirmation() {
        let (mut trade, _) = session();
        let confirmed = TradeUpdate {
            money: 50,
            confirmed: true,
            ..Default::default()
        };
        trade.apply_remote(&confirmed).unwrap();
        // Re-sending the same confirmed offer is harmless.
        trade.apply_remote(&confirmed).unwrap();

        let changed = TradeUpdate {
            money: 500,
            ..confirmed
        };
        assert!(matches!(
            trade.apply_remote(&changed),
            Err(SessionError::ProtocolViolation(_))
        ));
        assert_eq!(trade.remote().money, 50);
    }

    #[test]
    fn test_complete_applies_exchange_once() {
        let (mut trade, mut host) = session();
        trade.add_item(&host, 1, 2).unwrap();
        trade.add_creature(&host, 1).unwrap();
        trade.set_money(&host, 100).unwrap();
        trade.confirm().unwrap();
        trade
            .apply_remote(&TradeUpdate {
                items: vec![ItemStack { id: 9, amount: 1 }],
                creatures: vec![0],
                money: 30,
                confirmed: true,
            })
            .unwrap();

        assert!(trade.complete(&mut host));
        assert!(!trade.complete(&mut host));

        assert_eq!(host.items[&1], 3);
        assert_eq!(host.items[&9], 1);
        assert_eq!(host.money, 930);
        assert_eq!(host.released.len(), 1);
        assert_eq!(host.received[0].1, BTreeSet::from([0]));
        assert_eq!(trade.phase(), TradePhase::Completed);
    }

    #[test]
    fn test_from_update_sums_repeated_items() {
        let offer = TradeOffer::from_update(&TradeUpdate {
            items: vec![
                ItemStack { id: 2, amount: 1 },
                ItemStack { id: 2, amount: 3 },
                ItemStack { id: 5, amount: 0 },
            ],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(offer.items, BTreeMap::from([(2, 4)]));
    }

    #[test]
    fn test_from_update_overflowing_quantity_is_violation() {
        let update = TradeUpdate {
            items: vec![
                ItemStack {
                    id: 1,
                    amount: u32::MAX,
                },
                ItemStack { id: 1, amount: 1 },
            ],
            ..Default::default()
        };
        assert!(matches!(
            TradeOffer::from_update(&update),
            Err(SessionError::ProtocolViolation(_))
        ));

        let (mut trade, _) = session();
        trade
            .apply_remote(&TradeUpdate {
                money: 5,
                ..Default::default()
            })
            .unwrap();
        assert!(trade.apply_remote(&update).is_err());
        assert_eq!(trade.remote().money, 5);
        assert!(trade.remote().items.is_empty());
    }
}

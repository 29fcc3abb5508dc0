//! The session registry: proposals, the active trade and the active battle.
//!
//! Every operation is synchronous and returns [`Effects`]: payloads for the
//! link to send and [`Notice`]s for the UI. The registry never touches the
//! network itself, which keeps it deterministic under test.
//!
//! # Lifecycle
//!
//! ```text
//! start_*() ─→ [Outgoing Pending] ─┬─ *_accept ──→ session Active
//!                                  ├─ *_reject ──→ removed
//!                                  └─ expire()  ──→ removed
//!
//! *_request ─→ [Incoming Pending] ─┬─ accept_incoming() ──→ session Active
//!                                  ├─ reject_incoming() ──→ removed
//!                                  └─ expire()          ──→ removed
//! ```
//!
//! A request is removed the moment it is answered, so a late timeout can
//! never fire for it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tandem_protocol::{Action, BattleOutcome, ItemId, Payload, PeerId, RosterEntry, SessionKind};
use tracing::{debug, info, warn};

use crate::battle::BattleSession;
use crate::trade::TradeSession;
use crate::{Host, SessionError, ValidationError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long a proposal may stay unanswered.
    pub proposal_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            proposal_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub const MIN_PROPOSAL_TIMEOUT: Duration = Duration::from_secs(1);

    /// Clamp the timeout to at least [`Self::MIN_PROPOSAL_TIMEOUT`].
    pub fn validated(mut self) -> Self {
        if self.proposal_timeout < Self::MIN_PROPOSAL_TIMEOUT {
            warn!(
                timeout_ms = self.proposal_timeout.as_millis() as u64,
                "proposal_timeout below minimum, clamping"
            );
            self.proposal_timeout = Self::MIN_PROPOSAL_TIMEOUT;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Pending requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// A proposal waiting for an answer.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub kind: SessionKind,
    pub peer: PeerId,
    pub direction: RequestDirection,
    pub issued_at: Instant,
    pub status: RequestStatus,
}

type RequestKey = (SessionKind, RequestDirection, PeerId);

// ---------------------------------------------------------------------------
// Effects and notices
// ---------------------------------------------------------------------------

/// Why a session ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled by the local player.
    Local,
    /// The peer cancelled.
    Peer,
    /// The link dropped.
    ConnectionLost,
}

/// Something the player should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RequestSent { kind: SessionKind, peer: PeerId },
    RequestReceived { kind: SessionKind, peer: PeerId },
    RequestRejected { kind: SessionKind, peer: PeerId },
    RequestExpired {
        kind: SessionKind,
        peer: PeerId,
        direction: RequestDirection,
    },
    /// A pending proposal was dropped without an answer.
    RequestWithdrawn { kind: SessionKind, peer: PeerId },
    SessionStarted { kind: SessionKind, peer: PeerId },
    OfferUpdated { peer: PeerId },
    TradeCompleted { peer: PeerId },
    SessionCancelled {
        kind: SessionKind,
        peer: PeerId,
        reason: CancelReason,
    },
    TurnResolved { peer: PeerId, turn: u32 },
    BattleEnded { peer: PeerId, outcome: BattleOutcome },
}

/// What an operation wants the outside world to see.
#[derive(Debug, Default)]
pub struct Effects {
    /// Payloads to send, in order.
    pub outbound: Vec<Payload>,
    pub notices: Vec<Notice>,
}

impl Effects {
    fn send(&mut self, payload: Payload) {
        self.outbound.push(payload);
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.notices.is_empty()
    }

    /// Append another batch after this one.
    pub fn extend(&mut self, other: Effects) {
        self.outbound.extend(other.outbound);
        self.notices.extend(other.notices);
    }
}

/// A change to the local trade offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferChange {
    AddItem { item: ItemId, amount: u32 },
    RemoveItem { item: ItemId, amount: u32 },
    AddCreature(usize),
    RemoveCreature(usize),
    SetMoney(u64),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every proposal and the (at most one each) active trade and battle.
///
/// Not thread-safe: the client drives it from its own tick.
pub struct SessionRegistry {
    local: PeerId,
    config: SessionConfig,
    pending: BTreeMap<RequestKey, PendingRequest>,
    trade: Option<TradeSession>,
    battle: Option<BattleSession>,
}

impl SessionRegistry {
    pub fn new(local: PeerId, config: SessionConfig) -> Self {
        Self {
            local,
            config: config.validated(),
            pending: BTreeMap::new(),
            trade: None,
            battle: None,
        }
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    pub fn trade(&self) -> Option<&TradeSession> {
        self.trade.as_ref()
    }

    pub fn battle(&self) -> Option<&BattleSession> {
        self.battle.as_ref()
    }

    pub fn is_active(&self, kind: SessionKind) -> bool {
        match kind {
            SessionKind::Trade => self.trade.is_some(),
            SessionKind::Battle => self.battle.is_some(),
        }
    }

    /// All outstanding proposals, both directions.
    pub fn pending(&self) -> impl Iterator<Item = &PendingRequest> {
        self.pending.values()
    }

    /// Peers with an unanswered proposal of `kind` addressed to us.
    pub fn incoming(&self, kind: SessionKind) -> Vec<PeerId> {
        self.pending
            .values()
            .filter(|r| r.kind == kind && r.direction == RequestDirection::Incoming)
            .map(|r| r.peer.clone())
            .collect()
    }

    // -- proposals ----------------------------------------------------------

    /// Propose a trade to `peer`.
    pub fn start_trade(&mut self, peer: PeerId, now: Instant) -> Result<Effects, SessionError> {
        self.propose(SessionKind::Trade, peer, now)
    }

    /// Propose a battle to `peer`. Needs at least one healthy party member.
    pub fn start_battle(
        &mut self,
        host: &impl Host,
        peer: PeerId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        if !host.party().iter().any(|m| m.hp > 0) {
            return Err(ValidationError::NoEligibleCreatures.into());
        }
        self.propose(SessionKind::Battle, peer, now)
    }

    fn propose(
        &mut self,
        kind: SessionKind,
        peer: PeerId,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        if peer == self.local {
            return Err(ValidationError::SelfTarget.into());
        }
        if self.is_active(kind) {
            return Err(SessionError::AlreadyInSession(kind));
        }
        let key = (kind, RequestDirection::Outgoing, peer.clone());
        if self.pending.contains_key(&key) {
            return Err(SessionError::RequestPending(kind, peer));
        }

        self.pending.insert(
            key,
            PendingRequest {
                kind,
                peer: peer.clone(),
                direction: RequestDirection::Outgoing,
                issued_at: now,
                status: RequestStatus::Pending,
            },
        );
        info!(%kind, %peer, "request sent");

        let mut fx = Effects::default();
        fx.send(request_payload(kind, peer.clone()));
        fx.notify(Notice::RequestSent { kind, peer });
        Ok(fx)
    }

    /// Accept a proposal `peer` sent us.
    pub fn accept_incoming(
        &mut self,
        host: &mut impl Host,
        kind: SessionKind,
        peer: &PeerId,
    ) -> Result<Effects, SessionError> {
        if self.is_active(kind) {
            return Err(SessionError::AlreadyInSession(kind));
        }
        let key = (kind, RequestDirection::Incoming, peer.clone());
        if !self.pending.contains_key(&key) {
            return Err(SessionError::NoPendingRequest(kind, peer.clone()));
        }

        let mut fx = Effects::default();
        match kind {
            SessionKind::Trade => {
                self.trade = Some(TradeSession::new(peer.clone()));
                fx.send(Payload::TradeAccept {
                    target: peer.clone(),
                });
            }
            SessionKind::Battle => {
                // Validate before touching pending state so a refusal changes nothing.
                let battle = BattleSession::from_party(peer.clone(), &host.party())?;
                fx.send(Payload::BattleAccept {
                    target: peer.clone(),
                });
                fx.send(battle.team_payload());
                self.battle = Some(battle);
            }
        }

        self.resolve_request(&key, RequestStatus::Accepted);
        self.withdraw_outgoing(kind, &mut fx);
        info!(%kind, %peer, "request accepted");
        fx.notify(Notice::SessionStarted {
            kind,
            peer: peer.clone(),
        });
        Ok(fx)
    }

    /// Turn down a proposal `peer` sent us.
    pub fn reject_incoming(
        &mut self,
        kind: SessionKind,
        peer: &PeerId,
    ) -> Result<Effects, SessionError> {
        let key = (kind, RequestDirection::Incoming, peer.clone());
        if self.resolve_request(&key, RequestStatus::Rejected).is_none() {
            return Err(SessionError::NoPendingRequest(kind, peer.clone()));
        }
        info!(%kind, %peer, "request rejected");
        let mut fx = Effects::default();
        fx.send(reject_payload(kind, peer.clone()));
        Ok(fx)
    }

    // -- active sessions ----------------------------------------------------

    /// Tear down the active session of `kind` and tell the peer.
    pub fn cancel(&mut self, kind: SessionKind) -> Result<Effects, SessionError> {
        let mut fx = Effects::default();
        match kind {
            SessionKind::Trade => {
                let mut trade = self.trade.take().ok_or(SessionError::NoActiveSession(kind))?;
                fx.send(trade.cancel());
                fx.notify(Notice::SessionCancelled {
                    kind,
                    peer: trade.peer().clone(),
                    reason: CancelReason::Local,
                });
                info!(peer = %trade.peer(), "trade cancelled");
            }
            SessionKind::Battle => {
                let mut battle = self.battle.take().ok_or(SessionError::NoActiveSession(kind))?;
                battle.end(BattleOutcome::Cancel);
                fx.send(Payload::BattleResult {
                    result: BattleOutcome::Cancel,
                    target: Some(battle.peer().clone()),
                });
                fx.notify(Notice::SessionCancelled {
                    kind,
                    peer: battle.peer().clone(),
                    reason: CancelReason::Local,
                });
                info!(peer = %battle.peer(), "battle cancelled");
            }
        }
        Ok(fx)
    }

    /// Change the local trade offer and publish it.
    pub fn update_offer(
        &mut self,
        host: &impl Host,
        change: OfferChange,
    ) -> Result<Effects, SessionError> {
        let trade = self
            .trade
            .as_mut()
            .ok_or(SessionError::NoActiveSession(SessionKind::Trade))?;
        match change {
            OfferChange::AddItem { item, amount } => trade.add_item(host, item, amount)?,
            OfferChange::RemoveItem { item, amount } => trade.remove_item(item, amount)?,
            OfferChange::AddCreature(slot) => trade.add_creature(host, slot)?,
            OfferChange::RemoveCreature(slot) => trade.remove_creature(slot)?,
            OfferChange::SetMoney(amount) => trade.set_money(host, amount)?,
        }
        let mut fx = Effects::default();
        fx.send(trade.publish());
        Ok(fx)
    }

    /// Confirm the local offer; completes the trade if the peer already has.
    pub fn confirm_trade(&mut self, host: &mut impl Host) -> Result<Effects, SessionError> {
        let trade = self
            .trade
            .as_mut()
            .ok_or(SessionError::NoActiveSession(SessionKind::Trade))?;
        let mut fx = Effects::default();
        fx.send(trade.confirm()?);
        self.try_complete_trade(host, &mut fx);
        Ok(fx)
    }

    /// Choose this turn's battle action; resolves the turn if the peer's
    /// action is already in.
    pub fn select_action(
        &mut self,
        host: &mut impl Host,
        action: Action,
    ) -> Result<Effects, SessionError> {
        let battle = self
            .battle
            .as_mut()
            .ok_or(SessionError::NoActiveSession(SessionKind::Battle))?;
        let mut fx = Effects::default();
        fx.send(battle.select_action(host, action)?);
        self.try_resolve_turn(host, &mut fx);
        Ok(fx)
    }

    // -- inbound ------------------------------------------------------------

    /// Apply one inbound session message from `sender`.
    ///
    /// Requests and answers addressed to another player are ignored.
    pub fn handle(
        &mut self,
        host: &mut impl Host,
        sender: &PeerId,
        payload: &Payload,
        now: Instant,
    ) -> Result<Effects, SessionError> {
        match payload {
            Payload::TradeRequest { target } | Payload::BattleRequest { target } => {
                let kind = session_kind(payload)?;
                if target != &self.local {
                    return Ok(Effects::default());
                }
                Ok(self.on_request(kind, sender, now))
            }
            Payload::TradeAccept { target } | Payload::BattleAccept { target } => {
                let kind = session_kind(payload)?;
                if target != &self.local {
                    return Ok(Effects::default());
                }
                self.on_accept(host, kind, sender)
            }
            Payload::TradeReject { target } | Payload::BattleReject { target } => {
                let kind = session_kind(payload)?;
                if target != &self.local {
                    return Ok(Effects::default());
                }
                self.on_reject(kind, sender)
            }
            Payload::TradeUpdate(update) => {
                let trade = self.active_trade_with(sender)?;
                trade.apply_remote(update)?;
                let mut fx = Effects::default();
                fx.notify(Notice::OfferUpdated {
                    peer: sender.clone(),
                });
                self.try_complete_trade(host, &mut fx);
                Ok(fx)
            }
            Payload::TradeCancel { target } => {
                if target != &self.local {
                    return Ok(Effects::default());
                }
                Ok(self.on_trade_cancel(sender))
            }
            Payload::BattleTeam { team, current } => {
                self.on_battle_team(host, sender, team.clone(), *current)
            }
            Payload::BattleAction(action) => {
                let battle = self.active_battle_with(sender)?;
                battle.apply_remote_action(*action)?;
                let mut fx = Effects::default();
                self.try_resolve_turn(host, &mut fx);
                Ok(fx)
            }
            Payload::BattleState {
                turn,
                my_team,
                current,
            } => {
                if self.battle.is_none() {
                    // Both sides broadcast their final state; ours may have
                    // ended the battle already.
                    debug!(peer = %sender, turn, "battle_state for no battle");
                    return Ok(Effects::default());
                }
                let battle = self.active_battle_with(sender)?;
                let outcome = battle.apply_remote_state(*turn, my_team.clone(), *current);
                let mut fx = Effects::default();
                if let Some(outcome) = outcome {
                    self.finish_battle(outcome, true, &mut fx);
                }
                Ok(fx)
            }
            Payload::BattleResult { result, target } => {
                if target.as_ref().is_some_and(|t| t != &self.local) {
                    return Ok(Effects::default());
                }
                Ok(self.on_battle_result(sender, *result))
            }
            other => Err(SessionError::violation(format!(
                "`{}` is not a session message",
                other.kind()
            ))),
        }
    }

    /// Drop every proposal older than the timeout.
    pub fn expire(&mut self, now: Instant) -> Effects {
        let timeout = self.config.proposal_timeout;
        let stale: Vec<RequestKey> = self
            .pending
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.issued_at) >= timeout)
            .map(|(key, _)| key.clone())
            .collect();

        let mut fx = Effects::default();
        for key in stale {
            if let Some(request) = self.resolve_request(&key, RequestStatus::Expired) {
                info!(kind = %request.kind, peer = %request.peer, direction = ?request.direction, "request expired");
                fx.notify(Notice::RequestExpired {
                    kind: request.kind,
                    peer: request.peer,
                    direction: request.direction,
                });
            }
        }
        fx
    }

    /// The link dropped: cancel everything locally. Nothing is sent and
    /// nothing comes back after a reconnect.
    pub fn connection_lost(&mut self) -> Effects {
        let mut fx = Effects::default();
        if let Some(mut trade) = self.trade.take() {
            trade.cancel();
            fx.notify(Notice::SessionCancelled {
                kind: SessionKind::Trade,
                peer: trade.peer().clone(),
                reason: CancelReason::ConnectionLost,
            });
        }
        if let Some(mut battle) = self.battle.take() {
            battle.end(BattleOutcome::Cancel);
            fx.notify(Notice::SessionCancelled {
                kind: SessionKind::Battle,
                peer: battle.peer().clone(),
                reason: CancelReason::ConnectionLost,
            });
        }
        for (_, request) in std::mem::take(&mut self.pending) {
            fx.notify(Notice::RequestWithdrawn {
                kind: request.kind,
                peer: request.peer,
            });
        }
        if !fx.is_empty() {
            warn!(dropped = fx.notices.len(), "connection lost, sessions cancelled");
        }
        fx
    }

    /// `peer` went offline: end anything we had going with them.
    pub fn peer_left(&mut self, peer: &PeerId) -> Effects {
        let mut fx = Effects::default();
        if self.trade.as_ref().is_some_and(|t| t.peer() == peer) {
            if let Some(mut trade) = self.trade.take() {
                trade.cancel();
                fx.notify(Notice::SessionCancelled {
                    kind: SessionKind::Trade,
                    peer: peer.clone(),
                    reason: CancelReason::Peer,
                });
            }
        }
        if self.battle.as_ref().is_some_and(|b| b.peer() == peer) {
            if let Some(mut battle) = self.battle.take() {
                battle.end(BattleOutcome::Cancel);
                fx.notify(Notice::SessionCancelled {
                    kind: SessionKind::Battle,
                    peer: peer.clone(),
                    reason: CancelReason::Peer,
                });
            }
        }
        let keys: Vec<RequestKey> = self
            .pending
            .keys()
            .filter(|(_, _, p)| p == peer)
            .cloned()
            .collect();
        for key in keys {
            if let Some(request) = self.pending.remove(&key) {
                fx.notify(Notice::RequestWithdrawn {
                    kind: request.kind,
                    peer: request.peer,
                });
            }
        }
        if !fx.is_empty() {
            info!(%peer, "peer left, sessions dropped");
        }
        fx
    }

    // -- internals ----------------------------------------------------------

    fn on_request(&mut self, kind: SessionKind, sender: &PeerId, now: Instant) -> Effects {
        let mut fx = Effects::default();
        let key = (kind, RequestDirection::Incoming, sender.clone());
        // A repeated request refreshes the timestamp without a second notice.
        if let Some(existing) = self.pending.get_mut(&key) {
            existing.issued_at = now;
            return fx;
        }
        self.pending.insert(
            key,
            PendingRequest {
                kind,
                peer: sender.clone(),
                direction: RequestDirection::Incoming,
                issued_at: now,
                status: RequestStatus::Pending,
            },
        );
        info!(%kind, peer = %sender, "request received");
        fx.notify(Notice::RequestReceived {
            kind,
            peer: sender.clone(),
        });
        fx
    }

    fn on_accept(
        &mut self,
        host: &mut impl Host,
        kind: SessionKind,
        sender: &PeerId,
    ) -> Result<Effects, SessionError> {
        let key = (kind, RequestDirection::Outgoing, sender.clone());
        let mut fx = Effects::default();

        if !self.pending.contains_key(&key) || self.is_active(kind) {
            // Nothing to accept (expired, withdrawn, or we're busy). Answer
            // with a cancel so the peer doesn't sit in a session alone.
            warn!(%kind, peer = %sender, "accept without an outstanding request");
            fx.send(cancel_payload(kind, sender.clone()));
            return Ok(fx);
        }

        match kind {
            SessionKind::Trade => {
                self.trade = Some(TradeSession::new(sender.clone()));
            }
            SessionKind::Battle => match BattleSession::from_party(sender.clone(), &host.party()) {
                Ok(battle) => {
                    fx.send(battle.team_payload());
                    self.battle = Some(battle);
                }
                Err(err) => {
                    warn!(peer = %sender, %err, "can't start accepted battle");
                    self.resolve_request(&key, RequestStatus::Accepted);
                    fx.send(cancel_payload(kind, sender.clone()));
                    fx.notify(Notice::SessionCancelled {
                        kind,
                        peer: sender.clone(),
                        reason: CancelReason::Local,
                    });
                    return Ok(fx);
                }
            },
        }

        self.resolve_request(&key, RequestStatus::Accepted);
        self.withdraw_outgoing(kind, &mut fx);
        info!(%kind, peer = %sender, "request accepted by peer");
        fx.notify(Notice::SessionStarted {
            kind,
            peer: sender.clone(),
        });
        Ok(fx)
    }

    fn on_reject(&mut self, kind: SessionKind, sender: &PeerId) -> Result<Effects, SessionError> {
        let key = (kind, RequestDirection::Outgoing, sender.clone());
        if self.resolve_request(&key, RequestStatus::Rejected).is_none() {
            return Err(SessionError::violation(format!(
                "{sender} rejected a {kind} request we didn't send"
            )));
        }
        info!(%kind, peer = %sender, "request rejected by peer");
        let mut fx = Effects::default();
        fx.notify(Notice::RequestRejected {
            kind,
            peer: sender.clone(),
        });
        Ok(fx)
    }

    fn on_trade_cancel(&mut self, sender: &PeerId) -> Effects {
        let mut fx = Effects::default();
        if self.trade.as_ref().is_some_and(|t| t.peer() == sender) {
            if let Some(mut trade) = self.trade.take() {
                trade.cancel();
                info!(peer = %sender, "trade cancelled by peer");
                fx.notify(Notice::SessionCancelled {
                    kind: SessionKind::Trade,
                    peer: sender.clone(),
                    reason: CancelReason::Peer,
                });
            }
            return fx;
        }
        // The peer may be withdrawing a proposal that was never answered.
        for direction in [RequestDirection::Incoming, RequestDirection::Outgoing] {
            let key = (SessionKind::Trade, direction, sender.clone());
            if self.pending.remove(&key).is_some() {
                fx.notify(Notice::RequestWithdrawn {
                    kind: SessionKind::Trade,
                    peer: sender.clone(),
                });
            }
        }
        if fx.is_empty() {
            debug!(peer = %sender, "trade_cancel for no trade");
        }
        fx
    }

    fn on_battle_team(
        &mut self,
        host: &mut impl Host,
        sender: &PeerId,
        team: Vec<RosterEntry>,
        current: usize,
    ) -> Result<Effects, SessionError> {
        let battle = self.active_battle_with(sender)?;
        battle.apply_remote_team(team, current)?;
        host.start_encounter(sender, battle.remote_roster());
        let mut fx = Effects::default();
        self.try_resolve_turn(host, &mut fx);
        Ok(fx)
    }

    fn on_battle_result(&mut self, sender: &PeerId, result: BattleOutcome) -> Effects {
        let mut fx = Effects::default();
        if self.battle.as_ref().is_some_and(|b| b.peer() == sender) {
            // The peer's result is from their side.
            let outcome = result.mirrored();
            if outcome == BattleOutcome::Cancel {
                if let Some(mut battle) = self.battle.take() {
                    battle.end(outcome);
                    info!(peer = %sender, "battle cancelled by peer");
                    fx.notify(Notice::SessionCancelled {
                        kind: SessionKind::Battle,
                        peer: sender.clone(),
                        reason: CancelReason::Peer,
                    });
                }
            } else {
                self.finish_battle(outcome, false, &mut fx);
            }
            return fx;
        }
        // Both sides announce the result; the second one finds no battle.
        debug!(peer = %sender, %result, "battle_result for no battle");
        fx
    }

    fn active_trade_with(&mut self, sender: &PeerId) -> Result<&mut TradeSession, SessionError> {
        match self.trade.as_mut() {
            Some(trade) if trade.peer() == sender => Ok(trade),
            Some(_) => Err(SessionError::violation(format!(
                "trade message from {sender}, who is not our trade partner"
            ))),
            None => Err(SessionError::violation(format!(
                "trade message from {sender} with no active trade"
            ))),
        }
    }

    fn active_battle_with(&mut self, sender: &PeerId) -> Result<&mut BattleSession, SessionError> {
        match self.battle.as_mut() {
            Some(battle) if battle.peer() == sender => Ok(battle),
            Some(_) => Err(SessionError::violation(format!(
                "battle message from {sender}, who is not our opponent"
            ))),
            None => Err(SessionError::violation(format!(
                "battle message from {sender} with no active battle"
            ))),
        }
    }

    fn try_complete_trade(&mut self, host: &mut impl Host, fx: &mut Effects) {
        let Some(trade) = self.trade.as_mut() else {
            return;
        };
        if trade.complete(host) {
            fx.notify(Notice::TradeCompleted {
                peer: trade.peer().clone(),
            });
            self.trade = None;
        }
    }

    fn try_resolve_turn(&mut self, host: &mut impl Host, fx: &mut Effects) {
        let Some(battle) = self.battle.as_mut() else {
            return;
        };
        let Some(report) = battle.process_turn(host) else {
            return;
        };
        fx.send(report.state);
        fx.notify(Notice::TurnResolved {
            peer: battle.peer().clone(),
            turn: report.turn,
        });
        if let Some(outcome) = report.outcome {
            self.finish_battle(outcome, true, fx);
        }
    }

    /// End the battle. `announce` is false when the peer's own result
    /// caused the end.
    fn finish_battle(&mut self, outcome: BattleOutcome, announce: bool, fx: &mut Effects) {
        let Some(mut battle) = self.battle.take() else {
            return;
        };
        battle.end(outcome);
        info!(peer = %battle.peer(), %outcome, turn = battle.turn(), "battle ended");
        if announce {
            fx.send(Payload::BattleResult {
                result: outcome,
                target: Some(battle.peer().clone()),
            });
        }
        fx.notify(Notice::BattleEnded {
            peer: battle.peer().clone(),
            outcome,
        });
    }

    fn resolve_request(
        &mut self,
        key: &RequestKey,
        status: RequestStatus,
    ) -> Option<PendingRequest> {
        let mut request = self.pending.remove(key)?;
        request.status = status;
        debug!(kind = %request.kind, peer = %request.peer, ?status, "request resolved");
        Some(request)
    }

    /// Drop the other outgoing proposals of `kind` once a session started.
    fn withdraw_outgoing(&mut self, kind: SessionKind, fx: &mut Effects) {
        let keys: Vec<RequestKey> = self
            .pending
            .keys()
            .filter(|(k, dir, _)| *k == kind && *dir == RequestDirection::Outgoing)
            .cloned()
            .collect();
        for key in keys {
            if let Some(request) = self.pending.remove(&key) {
                fx.notify(Notice::RequestWithdrawn {
                    kind,
                    peer: request.peer,
                });
            }
        }
    }
}

fn session_kind(payload: &Payload) -> Result<SessionKind, SessionError> {
    payload
        .kind()
        .session()
        .ok_or_else(|| SessionError::violation(format!("`{}` has no session kind", payload.kind())))
}

fn request_payload(kind: SessionKind, target: PeerId) -> Payload {
    match kind {
        SessionKind::Trade => Payload::TradeRequest { target },
        SessionKind::Battle => Payload::BattleRequest { target },
    }
}

fn reject_payload(kind: SessionKind, target: PeerId) -> Payload {
    match kind {
        SessionKind::Trade => Payload::TradeReject { target },
        SessionKind::Battle => Payload::BattleReject { target },
    }
}

fn cancel_payload(kind: SessionKind, target: PeerId) -> Payload {
    match kind {
        SessionKind::Trade => Payload::TradeCancel { target },
        SessionKind::Battle => Payload::BattleResult {
            result: BattleOutcome::Cancel,
            target: Some(target),
        },
    }
}

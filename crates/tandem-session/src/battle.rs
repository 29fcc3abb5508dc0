//! Turn-based battle between two players.
//!
//! Each client is authoritative for its own roster: it resolves a turn once
//! both actions are known and broadcasts its own team in `battle_state`.
//! The opponent's roster is whatever they last reported.

use tandem_protocol::{Action, BattleOutcome, Payload, PeerId, RosterEntry, RosterStatus};
use tracing::{debug, trace};

use crate::host::{PartyMember, TurnContext};
use crate::{Host, SessionError, ValidationError};

/// Decide a battle from whether each side is wiped out.
///
/// | local fainted | remote fainted | result |
/// |---------------|----------------|--------|
/// | yes           | yes            | Draw   |
/// | yes           | no             | Lose   |
/// | no            | yes            | Win    |
/// | no            | no             | none   |
pub fn check_battle_result(
    all_local_fainted: bool,
    all_remote_fainted: bool,
) -> Option<BattleOutcome> {
    match (all_local_fainted, all_remote_fainted) {
        (true, true) => Some(BattleOutcome::Draw),
        (true, false) => Some(BattleOutcome::Lose),
        (false, true) => Some(BattleOutcome::Win),
        (false, false) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattlePhase {
    Active,
    Ended,
}

/// Result of resolving one turn.
#[derive(Debug)]
pub struct TurnReport {
    pub turn: u32,
    /// The `battle_state` to broadcast.
    pub state: Payload,
    pub outcome: Option<BattleOutcome>,
}

#[derive(Debug)]
pub struct BattleSession {
    peer: PeerId,
    phase: BattlePhase,
    turn: u32,
    local_roster: Vec<RosterEntry>,
    remote_roster: Vec<RosterEntry>,
    local_current: usize,
    remote_current: usize,
    local_pending: Option<Action>,
    remote_pending: Option<Action>,
    result: Option<BattleOutcome>,
}

impl BattleSession {
    /// Build the local side from the party. Fainted members sit out.
    pub fn from_party(peer: PeerId, party: &[PartyMember]) -> Result<Self, ValidationError> {
        let local_roster: Vec<RosterEntry> = party
            .iter()
            .filter(|m| m.hp > 0)
            .map(|m| RosterEntry {
                slot_index: m.slot_index,
                species: m.species,
                level: m.level,
                hp: m.hp.min(m.max_hp),
                max_hp: m.max_hp,
                moves: m.moves.clone(),
                status: RosterStatus::Ready,
            })
            .collect();

        if local_roster.is_empty() {
            return Err(ValidationError::NoEligibleCreatures);
        }

        Ok(Self {
            peer,
            phase: BattlePhase::Active,
            turn: 0,
            local_roster,
            remote_roster: Vec::new(),
            local_current: 0,
            remote_current: 0,
            local_pending: None,
            remote_pending: None,
            result: None,
        })
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn local_roster(&self) -> &[RosterEntry] {
        &self.local_roster
    }

    pub fn remote_roster(&self) -> &[RosterEntry] {
        &self.remote_roster
    }

    pub fn local_current(&self) -> usize {
        self.local_current
    }

    pub fn remote_current(&self) -> usize {
        self.remote_current
    }

    pub fn local_pending(&self) -> Option<Action> {
        self.local_pending
    }

    pub fn remote_pending(&self) -> Option<Action> {
        self.remote_pending
    }

    pub fn result(&self) -> Option<BattleOutcome> {
        self.result
    }

    /// Whether the opponent's team has arrived.
    pub fn has_remote_team(&self) -> bool {
        !self.remote_roster.is_empty()
    }

    /// The local `battle_team` announcement.
    pub fn team_payload(&self) -> Payload {
        Payload::BattleTeam {
            team: self.local_roster.clone(),
            current: self.local_current,
        }
    }

    /// Store the opponent's team. It is sent once; later roster changes
    /// only arrive through `battle_state`.
    pub fn apply_remote_team(
        &mut self,
        team: Vec<RosterEntry>,
        current: usize,
    ) -> Result<(), SessionError> {
        if self.has_remote_team() {
            return Err(SessionError::violation(format!(
                "{} sent a second battle team",
                self.peer
            )));
        }
        if team.is_empty() || current >= team.len() {
            return Err(SessionError::violation(format!(
                "{} sent an unusable battle team",
                self.peer
            )));
        }
        self.remote_roster = team;
        self.remote_current = current;
        Ok(())
    }

    /// Validate and record the local action for this turn. Returns the
    /// `battle_action` to send.
    pub fn select_action(
        &mut self,
        host: &impl Host,
        action: Action,
    ) -> Result<Payload, ValidationError> {
        if self.local_pending.is_some() {
            return Err(ValidationError::ActionAlreadyPending);
        }
        self.validate(host, action)?;
        self.local_pending = Some(action);
        trace!(peer = %self.peer, turn = self.turn, ?action, "local action selected");
        Ok(Payload::BattleAction(action))
    }

    fn validate(&self, host: &impl Host, action: Action) -> Result<(), ValidationError> {
        match action {
            Action::Attack(slot) => {
                let current = &self.local_roster[self.local_current];
                if current.is_fainted() {
                    return Err(ValidationError::CreatureFainted);
                }
                if slot >= current.moves.len() {
                    return Err(ValidationError::UnknownMove(slot));
                }
            }
            Action::UseItem(item) => {
                if host.item_count(item) == 0 {
                    return Err(ValidationError::ItemNotOwned(item));
                }
            }
            Action::Switch(index) => {
                let ready = self
                    .local_roster
                    .get(index)
                    .is_some_and(|entry| !entry.is_fainted());
                if !ready || index == self.local_current {
                    return Err(ValidationError::InvalidSwitch(index));
                }
            }
            Action::Flee => return Err(ValidationError::FleeNotAllowed),
        }
        Ok(())
    }

    /// Record the opponent's action for this turn.
    pub fn apply_remote_action(&mut self, action: Action) -> Result<(), SessionError> {
        if self.remote_pending.is_some() {
            return Err(SessionError::violation(format!(
                "{} sent a second action in turn {}",
                self.peer, self.turn
            )));
        }
        self.remote_pending = Some(action);
        Ok(())
    }

    /// Both actions are in and the opponent's team is known.
    pub fn ready_to_resolve(&self) -> bool {
        self.phase == BattlePhase::Active
            && self.local_pending.is_some()
            && self.remote_pending.is_some()
            && self.has_remote_team()
    }

    /// Resolve the turn if [`ready_to_resolve`](Self::ready_to_resolve).
    pub fn process_turn(&mut self, host: &mut impl Host) -> Option<TurnReport> {
        if !self.ready_to_resolve() {
            return None;
        }
        let (local_action, remote_action) = (self.local_pending?, self.remote_pending?);

        self.turn += 1;

        if let Action::Switch(index) = local_action {
            self.local_current = index;
        }
        if let Action::Switch(index) = remote_action {
            if index < self.remote_roster.len() {
                self.remote_current = index;
            }
        }

        let mut ctx = TurnContext {
            turn: self.turn,
            local: &mut self.local_roster,
            local_current: self.local_current,
            local_action,
            remote: &mut self.remote_roster,
            remote_current: self.remote_current,
            remote_action,
        };
        host.resolve_turn(&mut ctx);

        normalize(&mut self.local_roster);
        normalize(&mut self.remote_roster);

        self.local_pending = None;
        self.remote_pending = None;

        let outcome = self.evaluate();
        debug!(peer = %self.peer, turn = self.turn, ?outcome, "turn resolved");

        Some(TurnReport {
            turn: self.turn,
            state: Payload::BattleState {
                turn: self.turn,
                my_team: self.local_roster.clone(),
                current: self.local_current,
            },
            outcome,
        })
    }

    /// Take the opponent's authoritative roster. States older than the
    /// local turn are ignored. Returns the battle result, if decided.
    pub fn apply_remote_state(
        &mut self,
        turn: u32,
        team: Vec<RosterEntry>,
        current: usize,
    ) -> Option<BattleOutcome> {
        if turn < self.turn {
            debug!(peer = %self.peer, turn, local_turn = self.turn, "stale battle_state ignored");
            return None;
        }
        if !team.is_empty() {
            self.remote_current = current.min(team.len() - 1);
            self.remote_roster = team;
            normalize(&mut self.remote_roster);
        }
        self.evaluate()
    }

    /// Current result from the two rosters. Undecided until the opponent's
    /// team is known.
    pub fn evaluate(&self) -> Option<BattleOutcome> {
        if !self.has_remote_team() {
            return None;
        }
        check_battle_result(
            self.local_roster.iter().all(RosterEntry::is_fainted),
            self.remote_roster.iter().all(RosterEntry::is_fainted),
        )
    }

    /// Move to the terminal phase.
    pub fn end(&mut self, outcome: BattleOutcome) {
        self.phase = BattlePhase::Ended;
        self.result = Some(outcome);
    }
}

fn normalize(roster: &mut [RosterEntry]) {
    for entry in roster {
        entry.hp = entry.hp.min(entry.max_hp);
        if entry.hp == 0 {
            entry.status = RosterStatus::Fainted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, member};

    fn battle(hps: &[u32]) -> (BattleSession, MockHost) {
        let host = MockHost::with_party(hps);
        let session = BattleSession::from_party(PeerId::new("brock"), &host.party()).unwrap();
        (session, host)
    }

    fn remote_team(hps: &[u32]) -> Vec<RosterEntry> {
        hps.iter()
            .enumerate()
            .map(|(i, &hp)| RosterEntry {
                slot_index: i,
                species: 74,
                level: 14,
                hp,
                max_hp: 40,
                moves: vec![33],
                status: if hp == 0 {
                    RosterStatus::Fainted
                } else {
                    RosterStatus::Ready
                },
            })
            .collect()
    }

    #[test]
    fn test_check_battle_result_truth_table() {
        assert_eq!(check_battle_result(true, true), Some(BattleOutcome::Draw));
        assert_eq!(check_battle_result(true, false), Some(BattleOutcome::Lose));
        assert_eq!(check_battle_result(false, true), Some(BattleOutcome::Win));
        assert_eq!(check_battle_result(false, false), None);
    }

    #[test]
    fn test_from_party_skips_fainted_members() {
        let (session, _) = battle(&[0, 30, 40]);
        let slots: Vec<usize> = session.local_roster().iter().map(|e| e.slot_index).collect();
        assert_eq!(slots, vec![1, 2]);
        assert_eq!(session.local_current(), 0);
    }

    #[test]
    fn test_from_party_all_fainted_is_rejected() {
        let party = vec![member(0, 0)];
        let err = BattleSession::from_party(PeerId::new("brock"), &party).unwrap_err();
        assert_eq!(err, ValidationError::NoEligibleCreatures);
    }

    #[test]
    fn test_select_action_second_in_same_turn_rejected() {
        let (mut session, host) = battle(&[40]);
        session.select_action(&host, Action::Attack(0)).unwrap();
        assert_eq!(
            session.select_action(&host, Action::Attack(1)),
            Err(ValidationError::ActionAlreadyPending)
        );
        assert_eq!(session.local_pending(), Some(Action::Attack(0)));
    }

    #[test]
    fn test_select_action_validation() {
        let (mut session, host) = battle(&[40, 40]);
        assert_eq!(
            session.select_action(&host, Action::Attack(7)),
            Err(ValidationError::UnknownMove(7))
        );
        assert_eq!(
            session.select_action(&host, Action::UseItem(99)),
            Err(ValidationError::ItemNotOwned(99))
        );
        assert_eq!(
            session.select_action(&host, Action::Switch(0)),
            Err(ValidationError::InvalidSwitch(0))
        );
        assert_eq!(
            session.select_action(&host, Action::Switch(5)),
            Err(ValidationError::InvalidSwitch(5))
        );
        assert_eq!(
            session.select_action(&host, Action::Flee),
            Err(ValidationError::FleeNotAllowed)
        );
        assert_eq!(session.local_pending(), None);

        session.select_action(&host, Action::UseItem(1)).unwrap();
    }

    #[test]
    fn test_remote_action_twice_is_violation() {
        let (mut session, _) = battle(&[40]);
        session.apply_remote_action(Action::Attack(0)).unwrap();
        assert!(matches!(
            session.apply_remote_action(Action::Attack(0)),
            Err(SessionError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_process_turn_waits_for_both_actions_and_team() {
        let (mut session, mut host) = battle(&[40]);
        session.select_action(&host, Action::Attack(0)).unwrap();
        session.apply_remote_action(Action::Attack(0)).unwrap();
        // Opponent's team hasn't arrived yet.
        assert!(session.process_turn(&mut host).is_none());

        session.apply_remote_team(remote_team(&[40]), 0).unwrap();
        let report = session.process_turn(&mut host).unwrap();
        assert_eq!(report.turn, 1);
        assert_eq!(report.outcome, None);
        assert_eq!(session.local_roster()[0].hp, 30);
        assert_eq!(session.local_pending(), None);
        assert_eq!(session.remote_pending(), None);
        match report.state {
            Payload::BattleState { turn, my_team, current } => {
                assert_eq!(turn, 1);
                assert_eq!(my_team[0].hp, 30);
                assert_eq!(current, 0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_process_turn_applies_switches_before_damage() {
        let (mut session, mut host) = battle(&[40, 40]);
        session.apply_remote_team(remote_team(&[40]), 0).unwrap();
        session.select_action(&host, Action::Switch(1)).unwrap();
        session.apply_remote_action(Action::Attack(0)).unwrap();

        session.process_turn(&mut host).unwrap();
        assert_eq!(session.local_current(), 1);
        assert_eq!(session.local_roster()[0].hp, 40);
        assert_eq!(session.local_roster()[1].hp, 30);
    }

    #[test]
    fn test_knockout_decides_the_battle() {
        let (mut session, mut host) = battle(&[40]);
        host.damage = 50;
        session.apply_remote_team(remote_team(&[40]), 0).unwrap();
        session.select_action(&host, Action::Attack(0)).unwrap();
        session.apply_remote_action(Action::Switch(0)).unwrap();

        let report = session.process_turn(&mut host).unwrap();
        assert!(session.remote_roster()[0].is_fainted());
        assert_eq!(report.outcome, Some(BattleOutcome::Win));
    }

    #[test]
    fn test_apply_remote_state_ignores_older_turns() {
        let (mut session, mut host) = battle(&[40]);
        session.apply_remote_team(remote_team(&[40]), 0).unwrap();
        session.select_action(&host, Action::UseItem(1)).unwrap();
        session.apply_remote_action(Action::UseItem(1)).unwrap();
        session.process_turn(&mut host).unwrap();

        assert_eq!(session.apply_remote_state(0, remote_team(&[0]), 0), None);
        assert_eq!(session.remote_roster()[0].hp, 40);

        assert_eq!(
            session.apply_remote_state(1, remote_team(&[0]), 0),
            Some(BattleOutcome::Win)
        );
    }

    #[test]
    fn test_apply_remote_team_rejects_bad_current() {
        let (mut session, _) = battle(&[40]);
        assert!(session.apply_remote_team(remote_team(&[40]), 3).is_err());
        assert!(session.apply_remote_team(Vec::new(), 0).is_err());
        assert!(!session.has_remote_team());
    }

    #[test]
    fn test_apply_remote_team_twice_is_violation() {
        let (mut session, _) = battle(&[40]);
        session.apply_remote_team(remote_team(&[40]), 0).unwrap();
        session.apply_remote_state(1, remote_team(&[0]), 0);

        // A resent team must not heal the fainted roster.
        let err = session.apply_remote_team(remote_team(&[40]), 0).unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
        assert_eq!(session.remote_roster()[0].hp, 0);
    }
}

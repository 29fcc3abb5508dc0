//! Chat history and the system lines the client prints into it.

use std::collections::VecDeque;

use tandem_protocol::{BattleOutcome, PeerId, SessionKind, now_millis};
use tandem_session::{CancelReason, Notice, RequestDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Normal,
    System,
    Whisper,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub kind: ChatKind,
    /// `None` for lines the client produced itself.
    pub sender: Option<PeerId>,
    pub text: String,
    /// Milliseconds since the UNIX epoch.
    pub at: u64,
}

/// Bounded chat history. Once full, the oldest line is dropped.
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
    total: u64,
}

impl ChatLog {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, kind: ChatKind, sender: Option<PeerId>, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ChatEntry {
            kind,
            sender,
            text: text.into(),
            at: now_millis(),
        });
        self.total += 1;
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(ChatKind::System, None, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(ChatKind::Error, None, text);
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines ever pushed, including dropped ones. Lets a renderer find
    /// what is new since it last looked.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Lines pushed after the first `seen`, as far as history still has them.
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &ChatEntry> {
        let fresh = self.total.saturating_sub(seen).min(self.entries.len() as u64) as usize;
        self.entries.iter().skip(self.entries.len() - fresh)
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// The system line shown for a session notice.
pub fn describe(notice: &Notice) -> String {
    match notice {
        Notice::RequestSent { kind, peer } => format!("Sent a {kind} request to {peer}."),
        Notice::RequestReceived { kind, peer } => {
            format!("{peer} wants to {}. Use /accept {kind} or /decline {kind}.", verb(*kind))
        }
        Notice::RequestRejected { kind, peer } => format!("{peer} declined your {kind} request."),
        Notice::RequestExpired {
            kind,
            peer,
            direction,
        } => match direction {
            RequestDirection::Outgoing => format!("Your {kind} request to {peer} expired."),
            RequestDirection::Incoming => format!("The {kind} request from {peer} expired."),
        },
        Notice::RequestWithdrawn { kind, peer } => {
            format!("The {kind} request with {peer} was withdrawn.")
        }
        Notice::SessionStarted { kind, peer } => format!("{} with {peer} started.", title(*kind)),
        Notice::OfferUpdated { peer } => format!("{peer} changed their offer."),
        Notice::TradeCompleted { peer } => format!("Trade with {peer} completed!"),
        Notice::SessionCancelled { kind, peer, reason } => match reason {
            CancelReason::Local => format!("You left the {kind} with {peer}."),
            CancelReason::Peer => format!("{peer} cancelled the {kind}."),
            CancelReason::ConnectionLost => {
                format!("The {kind} with {peer} ended: connection lost.")
            }
        },
        Notice::TurnResolved { peer, turn } => format!("Turn {turn} against {peer} resolved."),
        Notice::BattleEnded { peer, outcome } => match outcome {
            BattleOutcome::Win => format!("You won the battle against {peer}!"),
            BattleOutcome::Lose => format!("You lost the battle against {peer}."),
            BattleOutcome::Draw => format!("The battle against {peer} ended in a draw."),
            BattleOutcome::Cancel => format!("The battle against {peer} was cancelled."),
        },
    }
}

fn verb(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Trade => "trade with you",
        SessionKind::Battle => "battle you",
    }
}

fn title(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Trade => "Trade",
        SessionKind::Battle => "Battle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_drops_oldest_when_full() {
        let mut log = ChatLog::new(3);
        for i in 0..5 {
            log.push(ChatKind::Normal, Some(PeerId::new("ash")), format!("line {i}"));
        }
        let texts: Vec<&str> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.total(), 5);
    }

    #[test]
    fn test_since_returns_only_new_lines() {
        let mut log = ChatLog::new(4);
        log.system("a");
        log.system("b");
        let seen = log.total();
        log.system("c");
        let fresh: Vec<&str> = log.since(seen).map(|e| e.text.as_str()).collect();
        assert_eq!(fresh, vec!["c"]);

        // More new lines than history holds: only what is left.
        for i in 0..6 {
            log.system(format!("x{i}"));
        }
        assert_eq!(log.since(seen).count(), 4);
    }

    #[test]
    fn test_zero_capacity_keeps_one_line() {
        let mut log = ChatLog::new(0);
        log.system("a");
        log.error("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.last().unwrap().kind, ChatKind::Error);
    }

    #[test]
    fn test_describe_request_received_mentions_commands() {
        let line = describe(&Notice::RequestReceived {
            kind: SessionKind::Battle,
            peer: PeerId::new("gary"),
        });
        assert_eq!(
            line,
            "gary wants to battle you. Use /accept battle or /decline battle."
        );
    }

    #[test]
    fn test_describe_expiry_by_direction() {
        let peer = PeerId::new("brock");
        let out = describe(&Notice::RequestExpired {
            kind: SessionKind::Trade,
            peer: peer.clone(),
            direction: RequestDirection::Outgoing,
        });
        assert_eq!(out, "Your trade request to brock expired.");
        let inc = describe(&Notice::RequestExpired {
            kind: SessionKind::Trade,
            peer,
            direction: RequestDirection::Incoming,
        });
        assert_eq!(inc, "The trade request from brock expired.");
    }
}

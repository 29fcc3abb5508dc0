//! Core protocol types for Tandem's wire format.
//!
//! Everything in this module travels "on the wire": it is serialized by a
//! [`Codec`](crate::Codec), relayed by the session server, and decoded by
//! the peer. The JSON shapes are what a server implementation must relay
//! unchanged.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity and game-data aliases
// ---------------------------------------------------------------------------

/// The unique name of a remote (or the local) player.
///
/// Player names double as identities in this design, so two clients with
/// the same name are indistinguishable. `#[serde(transparent)]` keeps it a
/// plain JSON string: `"misty"`, not `{"0":"misty"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer id from a player name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The player name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Host-defined item identifier.
pub type ItemId = u16;

/// Host-defined move identifier.
pub type MoveId = u16;

/// Facing direction, numpad convention (2 = down, 4 = left, 6 = right, 8 = up).
pub type Direction = u8;

/// Milliseconds since the UNIX epoch, used for [`Message::sent_at`].
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// SessionKind
// ---------------------------------------------------------------------------

/// The two kinds of two-party session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Trade,
    Battle,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trade => f.write_str("trade"),
            Self::Battle => f.write_str("battle"),
        }
    }
}

impl FromStr for SessionKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trade" => Ok(Self::Trade),
            "battle" => Ok(Self::Battle),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown session kind `{other}`"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade payloads
// ---------------------------------------------------------------------------

/// One offered item line: `{ "id": 4, "amount": 2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: ItemId,
    pub amount: u32,
}

/// The full contents of one side's trade offer, as broadcast after every
/// change and on confirmation.
///
/// Creature slots travel under the `pokemon` key for compatibility with
/// the existing server scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeUpdate {
    #[serde(default)]
    pub items: Vec<ItemStack>,
    #[serde(default, rename = "pokemon")]
    pub creatures: Vec<usize>,
    #[serde(default)]
    pub money: u64,
    #[serde(default)]
    pub confirmed: bool,
}

// ---------------------------------------------------------------------------
// Battle payloads
// ---------------------------------------------------------------------------

/// Whether a roster entry can still fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterStatus {
    Ready,
    Fainted,
}

/// One creature in a battling roster.
///
/// `slot_index` points into the owner's party, not into the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub slot_index: usize,
    pub species: u16,
    pub level: u8,
    pub hp: u32,
    pub max_hp: u32,
    #[serde(default)]
    pub moves: Vec<MoveId>,
    pub status: RosterStatus,
}

impl RosterEntry {
    pub fn is_fainted(&self) -> bool {
        self.status == RosterStatus::Fainted
    }
}

/// A battle action chosen for one turn.
///
/// Serialized adjacently tagged so it reads like the classic
/// `{ "type": "attack", "id": 1 }` shape. `Flee` carries no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Action {
    /// Use the move in this slot of the current creature's move list.
    Attack(usize),
    /// Use an item from the acting player's inventory.
    UseItem(ItemId),
    /// Switch to this roster index.
    Switch(usize),
    Flee,
}

/// How a battle ended, from the point of view of whoever sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Win,
    Lose,
    Draw,
    Cancel,
}

impl BattleOutcome {
    /// The same outcome seen from the other side of the battle.
    pub fn mirrored(self) -> Self {
        match self {
            Self::Win => Self::Lose,
            Self::Lose => Self::Win,
            other => other,
        }
    }
}

impl fmt::Display for BattleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Win => "win",
            Self::Lose => "lose",
            Self::Draw => "draw",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Position relay
// ---------------------------------------------------------------------------

/// A player's map position and, optionally, appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub map_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_hue: Option<u16>,
}

// ---------------------------------------------------------------------------
// Payload: one variant per message type
// ---------------------------------------------------------------------------

/// The content of a message.
///
/// `#[serde(tag = "type", content = "data")]` produces adjacently tagged
/// JSON, so the message type is always readable before the data:
///
/// ```text
/// { "type": "battle_action", "data": { "type": "attack", "id": 1 } }
/// { "type": "ping" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Client → Server keep-alive. No reply is expected.
    Ping,

    /// Chat line. Broadcast when `target` is `None`, whispered otherwise.
    Chat {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<PeerId>,
    },

    /// The sender's current position, relayed to everyone.
    Position(PositionUpdate),

    TradeRequest { target: PeerId },
    TradeAccept { target: PeerId },
    TradeReject { target: PeerId },
    TradeUpdate(TradeUpdate),
    TradeCancel { target: PeerId },

    BattleRequest { target: PeerId },
    BattleAccept { target: PeerId },
    BattleReject { target: PeerId },
    /// The sender's battling roster and the index of its first creature.
    BattleTeam { team: Vec<RosterEntry>, current: usize },
    BattleAction(Action),
    /// The sender's own roster after resolving `turn`.
    BattleState {
        turn: u32,
        my_team: Vec<RosterEntry>,
        current: usize,
    },
    /// `target` names the opponent so other players on the relay ignore it.
    BattleResult {
        result: BattleOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<PeerId>,
    },

    /// Client → Server: "who is online?"
    RequestPlayerList,
    /// Server → Client reply to [`Payload::RequestPlayerList`].
    PlayerList { players: Vec<PeerId> },
    /// Server → Client: a player went offline.
    PlayerLeft { name: PeerId },
}

impl Payload {
    /// The message type tag, used for dispatch.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Ping => MessageKind::Ping,
            Self::Chat { .. } => MessageKind::Chat,
            Self::Position(_) => MessageKind::Position,
            Self::TradeRequest { .. } => MessageKind::TradeRequest,
            Self::TradeAccept { .. } => MessageKind::TradeAccept,
            Self::TradeReject { .. } => MessageKind::TradeReject,
            Self::TradeUpdate(_) => MessageKind::TradeUpdate,
            Self::TradeCancel { .. } => MessageKind::TradeCancel,
            Self::BattleRequest { .. } => MessageKind::BattleRequest,
            Self::BattleAccept { .. } => MessageKind::BattleAccept,
            Self::BattleReject { .. } => MessageKind::BattleReject,
            Self::BattleTeam { .. } => MessageKind::BattleTeam,
            Self::BattleAction(_) => MessageKind::BattleAction,
            Self::BattleState { .. } => MessageKind::BattleState,
            Self::BattleResult { .. } => MessageKind::BattleResult,
            Self::RequestPlayerList => MessageKind::RequestPlayerList,
            Self::PlayerList { .. } => MessageKind::PlayerList,
            Self::PlayerLeft { .. } => MessageKind::PlayerLeft,
        }
    }
}

/// Data-less mirror of [`Payload`]'s variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Chat,
    Position,
    TradeRequest,
    TradeAccept,
    TradeReject,
    TradeUpdate,
    TradeCancel,
    BattleRequest,
    BattleAccept,
    BattleReject,
    BattleTeam,
    BattleAction,
    BattleState,
    BattleResult,
    RequestPlayerList,
    PlayerList,
    PlayerLeft,
}

impl MessageKind {
    /// The wire tag (`"trade_request"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Chat => "chat",
            Self::Position => "position",
            Self::TradeRequest => "trade_request",
            Self::TradeAccept => "trade_accept",
            Self::TradeReject => "trade_reject",
            Self::TradeUpdate => "trade_update",
            Self::TradeCancel => "trade_cancel",
            Self::BattleRequest => "battle_request",
            Self::BattleAccept => "battle_accept",
            Self::BattleReject => "battle_reject",
            Self::BattleTeam => "battle_team",
            Self::BattleAction => "battle_action",
            Self::BattleState => "battle_state",
            Self::BattleResult => "battle_result",
            Self::RequestPlayerList => "request_player_list",
            Self::PlayerList => "player_list",
            Self::PlayerLeft => "player_left",
        }
    }

    /// The session kind this message type belongs to, if any.
    pub fn session(self) -> Option<SessionKind> {
        match self {
            Self::TradeRequest
            | Self::TradeAccept
            | Self::TradeReject
            | Self::TradeUpdate
            | Self::TradeCancel => Some(SessionKind::Trade),
            Self::BattleRequest
            | Self::BattleAccept
            | Self::BattleReject
            | Self::BattleTeam
            | Self::BattleAction
            | Self::BattleState
            | Self::BattleResult => Some(SessionKind::Battle),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Message: the top-level wire format
// ---------------------------------------------------------------------------

/// Every frame on the wire is one `Message`.
///
/// ```text
/// ┌──────────────────────────────────────────┐
/// │ sender: "ash"        ← stamped by client  │
/// │ sent_at: 1718000000000                    │
/// │ payload: { type: "trade_request", ... }   │
/// └──────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the sending player. The client stamps its own name; a
    /// relay server may overwrite it with the authenticated name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PeerId>,

    /// Milliseconds since the UNIX epoch when the message was built.
    pub sent_at: u64,

    pub payload: Payload,
}

impl Message {
    /// Wraps a payload, timestamped now, without a sender.
    pub fn new(payload: Payload) -> Self {
        Self {
            sender: None,
            sent_at: now_millis(),
            payload,
        }
    }

    /// Sets the sender.
    pub fn from_peer(mut self, sender: PeerId) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Shorthand for `self.payload.kind()`.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes here are what the relay server forwards, so these
    //! tests pin the serde attributes down.

    use super::*;

    #[test]
    fn test_peer_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PeerId::new("misty")).unwrap();
        assert_eq!(json, "\"misty\"");
    }

    #[test]
    fn test_peer_id_display_is_the_name() {
        assert_eq!(PeerId::from("brock").to_string(), "brock");
    }

    #[test]
    fn test_session_kind_from_str_is_case_insensitive() {
        assert_eq!("Trade".parse::<SessionKind>().unwrap(), SessionKind::Trade);
        assert_eq!("BATTLE".parse::<SessionKind>().unwrap(), SessionKind::Battle);
        assert!("duel".parse::<SessionKind>().is_err());
    }

    #[test]
    fn test_payload_unit_variant_has_no_data() {
        let json = serde_json::to_value(Payload::Ping).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "ping" }));
    }

    #[test]
    fn test_payload_trade_request_json_format() {
        let json = serde_json::to_value(Payload::TradeRequest {
            target: PeerId::new("misty"),
        })
        .unwrap();
        assert_eq!(json["type"], "trade_request");
        assert_eq!(json["data"]["target"], "misty");
    }

    #[test]
    fn test_trade_update_uses_pokemon_key() {
        let json = serde_json::to_value(Payload::TradeUpdate(TradeUpdate {
            items: vec![ItemStack { id: 4, amount: 2 }],
            creatures: vec![0, 3],
            money: 500,
            confirmed: true,
        }))
        .unwrap();

        let data = &json["data"];
        assert_eq!(data["items"][0]["id"], 4);
        assert_eq!(data["items"][0]["amount"], 2);
        assert_eq!(data["pokemon"], serde_json::json!([0, 3]));
        assert_eq!(data["money"], 500);
        assert_eq!(data["confirmed"], true);
    }

    #[test]
    fn test_trade_update_missing_fields_default() {
        let json = r#"{ "type": "trade_update", "data": { "money": 10 } }"#;
        let payload: Payload = serde_json::from_str(json).unwrap();
        match payload {
            Payload::TradeUpdate(update) => {
                assert_eq!(update.money, 10);
                assert!(update.items.is_empty());
                assert!(!update.confirmed);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_battle_action_json_format() {
        let json =
            serde_json::to_value(Payload::BattleAction(Action::Attack(1))).unwrap();
        assert_eq!(json["type"], "battle_action");
        assert_eq!(json["data"], serde_json::json!({ "type": "attack", "id": 1 }));

        let flee = serde_json::to_value(Action::Flee).unwrap();
        assert_eq!(flee, serde_json::json!({ "type": "flee" }));
    }

    #[test]
    fn test_battle_result_round_trip() {
        let payload = Payload::BattleResult {
            result: BattleOutcome::Draw,
            target: Some(PeerId::new("misty")),
        };
        let bytes = serde_json::to_vec(&payload).unwrap();
        let decoded: Payload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_battle_result_without_target_still_decodes() {
        let json = r#"{"type":"battle_result","data":{"result":"cancel"}}"#;
        let payload: Payload = serde_json::from_str(json).unwrap();
        assert_eq!(
            payload,
            Payload::BattleResult {
                result: BattleOutcome::Cancel,
                target: None,
            }
        );
    }

    #[test]
    fn test_battle_outcome_mirrored() {
        assert_eq!(BattleOutcome::Win.mirrored(), BattleOutcome::Lose);
        assert_eq!(BattleOutcome::Lose.mirrored(), BattleOutcome::Win);
        assert_eq!(BattleOutcome::Draw.mirrored(), BattleOutcome::Draw);
        assert_eq!(BattleOutcome::Cancel.mirrored(), BattleOutcome::Cancel);
    }

    #[test]
    fn test_chat_without_target_omits_field() {
        let json = serde_json::to_value(Payload::Chat {
            message: "hi".into(),
            target: None,
        })
        .unwrap();
        assert!(json["data"].get("target").is_none());
    }

    #[test]
    fn test_payload_kind_matches_wire_tag() {
        let payloads = [
            Payload::Ping,
            Payload::RequestPlayerList,
            Payload::TradeCancel { target: "a".into() },
            Payload::BattleState {
                turn: 1,
                my_team: vec![],
                current: 0,
            },
            Payload::PlayerLeft { name: "a".into() },
        ];
        for payload in payloads {
            let json = serde_json::to_value(&payload).unwrap();
            assert_eq!(json["type"], payload.kind().as_str());
        }
    }

    #[test]
    fn test_message_kind_session_grouping() {
        assert_eq!(MessageKind::TradeUpdate.session(), Some(SessionKind::Trade));
        assert_eq!(MessageKind::BattleTeam.session(), Some(SessionKind::Battle));
        assert_eq!(MessageKind::Chat.session(), None);
    }

    #[test]
    fn test_message_sender_is_optional_on_the_wire() {
        let json = r#"{ "sent_at": 5, "payload": { "type": "ping" } }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender, None);
        assert_eq!(msg.kind(), MessageKind::Ping);
    }

    #[test]
    fn test_message_from_peer_round_trip() {
        let msg = Message::new(Payload::Position(PositionUpdate {
            x: 3,
            y: -1,
            direction: 2,
            map_id: 7,
            character_name: Some("trchar001".into()),
            character_hue: None,
        }))
        .from_peer(PeerId::new("ash"));

        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let unknown = r#"{ "sent_at": 1, "payload": { "type": "fly_to_moon" } }"#;
        let result: Result<Message, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }
}

//! `TandemClient`: the one object a game embeds.
//!
//! The host calls [`TandemClient::on_tick`] once per frame and forwards
//! player movement and chat input through the other hooks. Everything else
//! (reconnecting, pinging, routing inbound messages, expiring proposals,
//! syncing position) happens inside the tick.
//!
//! ```text
//!  on_tick(dt)
//!    ├─ Link::poll ──→ Dispatcher ──→ chat / directory / sessions
//!    ├─ SessionRegistry::expire
//!    ├─ HeartbeatScheduler::tick ──→ reconnect | ping
//!    ├─ periodic position sync
//!    └─ flush outbox ──→ Link::send
//! ```

use std::time::{Duration, Instant};

use tandem_protocol::{
    Action, Codec, JsonCodec, Message, MessageKind, Payload, PeerId, PositionUpdate, SessionKind,
};
use tandem_session::{Effects, Host, Notice, OfferChange, SessionError, SessionRegistry};
use tandem_tick::{HeartbeatAction, HeartbeatScheduler};
use tandem_transport::{ConnectionState, Connector, WebSocketConnector};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::chat::{ChatKind, ChatLog, describe};
use crate::commands::{Command, CommandError, CommandRouter};
use crate::directory::{PeerDirectory, PeerUpdate};
use crate::dispatch::Dispatcher;
use crate::link::{Link, LinkEvent};
use crate::{ClientConfig, NetError};

const SESSION_KINDS: &[MessageKind] = &[
    MessageKind::TradeRequest,
    MessageKind::TradeAccept,
    MessageKind::TradeReject,
    MessageKind::TradeUpdate,
    MessageKind::TradeCancel,
    MessageKind::BattleRequest,
    MessageKind::BattleAccept,
    MessageKind::BattleReject,
    MessageKind::BattleTeam,
    MessageKind::BattleAction,
    MessageKind::BattleState,
    MessageKind::BattleResult,
];

/// Wall-clock reading that follows tokio's clock, so paused-time tests
/// can drive proposal expiry.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

// ---------------------------------------------------------------------------
// State shared with message handlers
// ---------------------------------------------------------------------------

/// Everything inbound handlers are allowed to touch.
struct ClientState<H> {
    host: H,
    local: PeerId,
    registry: SessionRegistry,
    directory: PeerDirectory,
    chat: ChatLog,
    notices: Vec<Notice>,
    outbox: Vec<Payload>,
    now: Instant,
}

impl<H: Host> ClientState<H> {
    fn apply(&mut self, fx: Effects) {
        self.outbox.extend(fx.outbound);
        for notice in fx.notices {
            self.chat.system(describe(&notice));
            self.notices.push(notice);
        }
    }
}

fn sender_of(msg: &Message) -> Option<&PeerId> {
    if msg.sender.is_none() {
        warn!(kind = %msg.kind(), "message without a sender dropped");
    }
    msg.sender.as_ref()
}

fn on_chat<H: Host>(state: &mut ClientState<H>, msg: &Message) {
    let Payload::Chat { message, target } = &msg.payload else {
        return;
    };
    let Some(sender) = sender_of(msg) else {
        return;
    };
    if *sender == state.local {
        return;
    }
    match target {
        None => state.chat.push(ChatKind::Normal, Some(sender.clone()), message.clone()),
        Some(target) if *target == state.local => {
            state.chat.push(ChatKind::Whisper, Some(sender.clone()), message.clone())
        }
        Some(target) => trace!(%sender, %target, "whisper for someone else"),
    }
}

fn on_position<H: Host>(state: &mut ClientState<H>, msg: &Message) {
    let Payload::Position(pos) = &msg.payload else {
        return;
    };
    let Some(sender) = sender_of(msg) else {
        return;
    };
    if *sender != state.local {
        state.directory.upsert(sender, PeerUpdate::from(pos));
    }
}

fn on_session<H: Host>(state: &mut ClientState<H>, msg: &Message) {
    let Some(sender) = sender_of(msg) else {
        return;
    };
    if *sender == state.local {
        return;
    }
    let now = state.now;
    match state.registry.handle(&mut state.host, sender, &msg.payload, now) {
        Ok(fx) => state.apply(fx),
        Err(err) => warn!(peer = %sender, kind = %msg.kind(), %err, "session message discarded"),
    }
}

fn on_player_list<H: Host>(state: &mut ClientState<H>, msg: &Message) {
    let Payload::PlayerList { players } = &msg.payload else {
        return;
    };
    let names: Vec<&str> = players.iter().map(PeerId::as_str).collect();
    state
        .chat
        .system(format!("Online ({}): {}", names.len(), names.join(", ")));
}

fn on_player_left<H: Host>(state: &mut ClientState<H>, msg: &Message) {
    let Payload::PlayerLeft { name } = &msg.payload else {
        return;
    };
    state.directory.remove(name);
    let fx = state.registry.peer_left(name);
    state.apply(fx);
    state.chat.system(format!("{name} left."));
}

fn register_handlers<H: Host + 'static>(
    dispatcher: &mut Dispatcher<ClientState<H>>,
) -> Result<(), NetError> {
    // The relay may echo keep-alives; there is nothing to do with them.
    dispatcher.register(MessageKind::Ping, |_, _| {})?;
    dispatcher.register(MessageKind::Chat, on_chat::<H>)?;
    dispatcher.register(MessageKind::Position, on_position::<H>)?;
    dispatcher.register_all(SESSION_KINDS, on_session::<H>)?;
    dispatcher.register(MessageKind::PlayerList, on_player_list::<H>)?;
    dispatcher.register(MessageKind::PlayerLeft, on_player_left::<H>)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// TandemClient
// ---------------------------------------------------------------------------

/// The multiplayer layer of one running game.
///
/// Generic over the game (`H`), how it dials (`K`) and the wire encoding
/// (`C`); the defaults are WebSocket and JSON.
pub struct TandemClient<H, K: Connector = WebSocketConnector, C: Codec = JsonCodec> {
    config: ClientConfig,
    link: Link<K, C>,
    heartbeat: HeartbeatScheduler,
    dispatcher: Dispatcher<ClientState<H>>,
    state: ClientState<H>,
    server_index: usize,
    auto_reconnect: bool,
    position: Option<PositionUpdate>,
    position_dirty: bool,
    frames_since_sync: u32,
}

impl<H: Host + 'static> TandemClient<H> {
    /// A WebSocket client for `host`. Nothing is dialed until the first
    /// reconnect tick or an explicit [`connect`](Self::connect).
    pub fn new(config: ClientConfig, host: H) -> Result<Self, NetError> {
        let config = config.validated()?;
        let link =
            Link::websocket(config.local_peer()).with_connect_timeout(config.connect_timeout());
        Self::assemble(config, host, link)
    }
}

impl<H, K, C> TandemClient<H, K, C>
where
    H: Host + 'static,
    K: Connector,
    C: Codec,
{
    pub fn with_link(config: ClientConfig, host: H, link: Link<K, C>) -> Result<Self, NetError> {
        Self::assemble(config.validated()?, host, link)
    }

    /// Build from an already validated config.
    fn assemble(config: ClientConfig, host: H, link: Link<K, C>) -> Result<Self, NetError> {
        let local = config.local_peer();

        let mut dispatcher = Dispatcher::new();
        register_handlers(&mut dispatcher)?;

        let state = ClientState {
            host,
            registry: SessionRegistry::new(local.clone(), config.session()),
            local,
            directory: PeerDirectory::new(),
            chat: ChatLog::new(config.chat_history),
            notices: Vec::new(),
            outbox: Vec::new(),
            now: now(),
        };

        Ok(Self {
            heartbeat: HeartbeatScheduler::new(config.heartbeat()),
            config,
            link,
            dispatcher,
            state,
            server_index: 0,
            auto_reconnect: true,
            position: None,
            position_dirty: false,
            frames_since_sync: 0,
        })
    }

    // -- host hooks ---------------------------------------------------------

    /// Advance the client by one frame of `dt`.
    pub async fn on_tick(&mut self, dt: Duration) {
        let now = now();
        self.state.now = now;

        for event in self.link.poll() {
            match event {
                LinkEvent::Message(msg) => {
                    self.dispatcher.dispatch(&mut self.state, &msg);
                }
                LinkEvent::Closed { reason } => self.on_connection_lost(reason),
            }
        }

        let fx = self.state.registry.expire(now);
        self.state.apply(fx);

        match self.heartbeat.tick(dt, self.link.state()) {
            HeartbeatAction::Reconnect if self.auto_reconnect => self.reconnect().await,
            HeartbeatAction::Ping => self.state.outbox.push(Payload::Ping),
            _ => {}
        }

        self.sync_position();
        self.flush();
    }

    /// The local player moved or turned. Sent right away when it changed.
    pub fn on_player_moved(&mut self, position: PositionUpdate) {
        if self.position.as_ref() == Some(&position) {
            return;
        }
        self.position = Some(position);
        self.position_dirty = true;
        self.sync_position_now();
    }

    /// The host switched maps.
    pub fn on_scene_update(&mut self, map_id: u32) {
        if let Some(pos) = self.position.as_mut() {
            if pos.map_id != map_id {
                pos.map_id = map_id;
                self.position_dirty = true;
                self.sync_position_now();
            }
        }
        debug!(map_id, "scene changed");
    }

    /// One line typed into the chat box: a `/command` or plain chat.
    ///
    /// Never fails: problems become error lines in [`chat`](Self::chat).
    pub fn submit_input(&mut self, text: &str) {
        let command = match CommandRouter::parse(text) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(err) => {
                self.state.chat.error(err.to_string());
                return;
            }
        };
        if let Err(err) = self.run_command(command) {
            self.state.chat.error(error_line(&err));
        }
    }

    fn run_command(&mut self, command: Command) -> Result<(), NetError> {
        match command {
            Command::Say(message) => self.say(&message),
            Command::Whisper { target, message } => self.whisper(target, &message),
            Command::Help => {
                self.state.chat.system("Commands:");
                for line in CommandRouter::help_lines() {
                    self.state.chat.system(line);
                }
                Ok(())
            }
            Command::Online => self.request_player_list(),
            Command::Trade(peer) => self.start_trade(peer),
            Command::Battle(peer) => self.start_battle(peer),
            Command::Accept { kind, peer } => {
                let peer = self.pick_incoming(kind, peer, "/accept trade|battle <name>")?;
                self.accept_incoming(kind, &peer)
            }
            Command::Decline { kind, peer } => {
                let peer = self.pick_incoming(kind, peer, "/decline trade|battle <name>")?;
                self.reject_incoming(kind, &peer)
            }
            Command::Cancel(kind) => self.cancel(kind),
        }
    }

    /// Resolve `/accept trade` without a name to the single pending sender.
    fn pick_incoming(
        &self,
        kind: SessionKind,
        peer: Option<PeerId>,
        usage: &'static str,
    ) -> Result<PeerId, CommandError> {
        if let Some(peer) = peer {
            return Ok(peer);
        }
        let mut incoming = self.state.registry.incoming(kind);
        match incoming.len() {
            0 => Err(CommandError::NothingPending(kind)),
            1 => Ok(incoming.remove(0)),
            _ => Err(CommandError::Usage(usage)),
        }
    }

    // -- entry points -------------------------------------------------------

    /// Dial the current server now instead of waiting for the heartbeat.
    pub async fn connect(&mut self) -> Result<(), NetError> {
        self.auto_reconnect = true;
        let server = self
            .config
            .servers
            .get(self.server_index)
            .cloned()
            .ok_or_else(|| NetError::Config("no server configured".into()))?;
        self.link.connect(&server).await?;
        self.on_connected(&server.name);
        Ok(())
    }

    /// Leave the server: active sessions are cancelled (and the peers told)
    /// before the socket closes. The heartbeat will not reconnect until
    /// [`connect`](Self::connect) is called again.
    pub async fn disconnect(&mut self) -> Result<(), NetError> {
        if !self.link.is_connected() {
            return Err(NetError::NotConnected);
        }
        self.auto_reconnect = false;
        for kind in [SessionKind::Trade, SessionKind::Battle] {
            if self.state.registry.is_active(kind) {
                let fx = self.state.registry.cancel(kind)?;
                self.state.apply(fx);
            }
        }
        self.flush();
        self.link.disconnect().await?;

        let fx = self.state.registry.connection_lost();
        self.state.apply(fx);
        self.state.directory.clear();
        self.state.chat.system("Disconnected.");
        Ok(())
    }

    /// Broadcast a chat line.
    pub fn say(&mut self, message: &str) -> Result<(), NetError> {
        self.ensure_connected()?;
        self.link.send(Payload::Chat {
            message: message.to_string(),
            target: None,
        })?;
        let local = self.state.local.clone();
        self.state.chat.push(ChatKind::Normal, Some(local), message);
        Ok(())
    }

    pub fn whisper(&mut self, target: PeerId, message: &str) -> Result<(), NetError> {
        self.ensure_connected()?;
        self.link.send(Payload::Chat {
            message: message.to_string(),
            target: Some(target.clone()),
        })?;
        self.state
            .chat
            .push(ChatKind::Whisper, None, format!("To {target}: {message}"));
        Ok(())
    }

    /// Ask the server who is online; the answer lands in the chat.
    pub fn request_player_list(&mut self) -> Result<(), NetError> {
        self.ensure_connected()?;
        self.link.send(Payload::RequestPlayerList)?;
        self.state.chat.system("Requesting the player list...");
        Ok(())
    }

    pub fn start_trade(&mut self, peer: PeerId) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self.state.registry.start_trade(peer, now())?;
        self.send_effects(fx)
    }

    pub fn start_battle(&mut self, peer: PeerId) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self
            .state
            .registry
            .start_battle(&self.state.host, peer, now())?;
        self.send_effects(fx)
    }

    pub fn accept_incoming(&mut self, kind: SessionKind, peer: &PeerId) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self
            .state
            .registry
            .accept_incoming(&mut self.state.host, kind, peer)?;
        self.send_effects(fx)
    }

    pub fn reject_incoming(&mut self, kind: SessionKind, peer: &PeerId) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self.state.registry.reject_incoming(kind, peer)?;
        self.send_effects(fx)
    }

    /// Leave the active trade or battle.
    pub fn cancel(&mut self, kind: SessionKind) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self.state.registry.cancel(kind)?;
        self.send_effects(fx)
    }

    /// Change the local trade offer; the new offer is published at once.
    pub fn offer(&mut self, change: OfferChange) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self.state.registry.update_offer(&self.state.host, change)?;
        self.send_effects(fx)
    }

    pub fn confirm_trade(&mut self) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self.state.registry.confirm_trade(&mut self.state.host)?;
        self.send_effects(fx)
    }

    /// Choose this turn's battle action.
    pub fn select_action(&mut self, action: Action) -> Result<(), NetError> {
        self.ensure_connected()?;
        let fx = self
            .state
            .registry
            .select_action(&mut self.state.host, action)?;
        self.send_effects(fx)
    }

    // -- queries ------------------------------------------------------------

    pub fn trade_active(&self) -> bool {
        self.state.registry.is_active(SessionKind::Trade)
    }

    pub fn battle_active(&self) -> bool {
        self.state.registry.is_active(SessionKind::Battle)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Observe connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.link.subscribe()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.state.chat
    }

    /// Notices raised since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.state.notices)
    }

    pub fn local(&self) -> &PeerId {
        &self.state.local
    }

    pub fn host(&self) -> &H {
        &self.state.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.state.host
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.state.directory
    }

    /// For attaching sprites and draining released ones.
    pub fn directory_mut(&mut self) -> &mut PeerDirectory {
        &mut self.state.directory
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    pub fn heartbeat(&self) -> &HeartbeatScheduler {
        &self.heartbeat
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- internals ----------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), NetError> {
        if self.link.is_connected() {
            Ok(())
        } else {
            Err(NetError::NotConnected)
        }
    }

    fn send_effects(&mut self, fx: Effects) -> Result<(), NetError> {
        self.state.apply(fx);
        self.flush();
        Ok(())
    }

    fn flush(&mut self) {
        if self.state.outbox.is_empty() {
            return;
        }
        if !self.link.is_connected() {
            debug!(dropped = self.state.outbox.len(), "not connected, outbox dropped");
            self.state.outbox.clear();
            return;
        }
        for payload in self.state.outbox.drain(..) {
            if let Err(err) = self.link.send(payload) {
                warn!(%err, "send failed, outbox dropped");
                break;
            }
        }
    }

    async fn reconnect(&mut self) {
        let servers = &self.config.servers;
        let count = servers.len().max(1);
        let Some(server) = servers.get(self.server_index % count).cloned() else {
            return;
        };
        info!(server = %server.name, attempt = self.heartbeat.reconnect_attempts(), "reconnecting");
        match self.link.connect(&server).await {
            Ok(()) => self.on_connected(&server.name),
            Err(err) => {
                self.server_index = (self.server_index + 1) % count;
                warn!(server = %server.name, %err, "reconnect failed");
            }
        }
    }

    fn on_connected(&mut self, server: &str) {
        self.state.chat.system(format!("Connected to {server}."));
        self.position_dirty = true;
        self.sync_position_now();
    }

    fn on_connection_lost(&mut self, reason: Option<String>) {
        let fx = self.state.registry.connection_lost();
        self.state.apply(fx);
        self.state.outbox.clear();
        self.state.directory.clear();
        let line = match reason {
            Some(reason) => format!("Connection lost: {reason}"),
            None => "Connection closed by the server.".to_string(),
        };
        self.state.chat.error(line);
    }

    fn sync_position(&mut self) {
        self.frames_since_sync = self.frames_since_sync.saturating_add(1);
        if self.position_dirty || self.frames_since_sync >= self.config.position_sync_frames {
            self.sync_position_now();
        }
    }

    fn sync_position_now(&mut self) {
        let Some(position) = self.position.clone() else {
            return;
        };
        if !self.link.is_connected() {
            return;
        }
        match self.link.send(Payload::Position(position)) {
            Ok(()) => {
                self.position_dirty = false;
                self.frames_since_sync = 0;
            }
            Err(err) => debug!(%err, "position not sent"),
        }
    }
}

/// How an error reads in the chat box.
fn error_line(err: &NetError) -> String {
    match err {
        NetError::NotConnected => "You are not connected to the server.".to_string(),
        NetError::Session(SessionError::NoPendingRequest(kind, peer)) => {
            format!("No pending {kind} request from {peer}.")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::ServerDescriptor;
    use tandem_protocol::{ItemId, TradeUpdate};
    use tandem_session::PartyMember;

    #[derive(Debug, Default)]
    struct Bag {
        money: u64,
    }

    impl Host for Bag {
        fn party(&self) -> Vec<PartyMember> {
            vec![PartyMember {
                slot_index: 0,
                species: 7,
                level: 10,
                hp: 30,
                max_hp: 30,
                moves: vec![33],
            }]
        }
        fn item_count(&self, _item: ItemId) -> u32 {
            0
        }
        fn money(&self) -> u64 {
            self.money
        }
        fn take_item(&mut self, _item: ItemId, _amount: u32) {}
        fn give_item(&mut self, _item: ItemId, _amount: u32) {}
        fn spend_money(&mut self, amount: u64) {
            self.money -= amount;
        }
        fn earn_money(&mut self, amount: u64) {
            self.money += amount;
        }
        fn release_creatures(&mut self, _to: &PeerId, _slots: &BTreeSet<usize>) {}
        fn receive_creatures(&mut self, _from: &PeerId, _slots: &BTreeSet<usize>) {}
    }

    fn client() -> TandemClient<Bag> {
        let mut config = ClientConfig::for_player("ash");
        // Port 1 on loopback refuses connections straight away.
        config.servers = vec![
            ServerDescriptor::new("first", "127.0.0.1", 1),
            ServerDescriptor::new("second", "127.0.0.1", 1),
        ];
        TandemClient::new(config, Bag { money: 100 }).unwrap()
    }

    fn deliver(client: &mut TandemClient<Bag>, from: &str, payload: Payload) {
        let msg = Message::new(payload).from_peer(PeerId::new(from));
        client.dispatcher.dispatch(&mut client.state, &msg);
    }

    fn last_line(client: &TandemClient<Bag>) -> String {
        client.chat().last().map(|e| e.text.clone()).unwrap_or_default()
    }

    #[test]
    fn test_new_uses_the_validated_config() {
        let mut config = ClientConfig::for_player("  ash  ");
        config.chat_history = 0;
        let client = TandemClient::new(config, Bag::default()).unwrap();
        assert_eq!(client.config().player_name, "ash");
        assert_eq!(client.local(), &PeerId::new("ash"));
        assert_eq!(client.chat().capacity(), 1);

        let blank = ClientConfig::for_player(" ");
        assert!(matches!(
            TandemClient::new(blank, Bag::default()),
            Err(NetError::Config(_))
        ));
    }

    #[test]
    fn test_submit_input_while_disconnected_is_error_line() {
        let mut client = client();
        client.submit_input("hello");
        let line = client.chat().last().unwrap();
        assert_eq!(line.kind, ChatKind::Error);
        assert_eq!(line.text, "You are not connected to the server.");
        assert!(!client.trade_active());
    }

    #[test]
    fn test_submit_input_unknown_command_changes_nothing() {
        let mut client = client();
        client.submit_input("/fly home");
        assert_eq!(
            last_line(&client),
            "Unknown command. Use /help for the list of commands."
        );
        assert!(client.registry().pending().next().is_none());
    }

    #[test]
    fn test_submit_input_help_lists_commands() {
        let mut client = client();
        client.submit_input("/help");
        assert!(client.chat().entries().any(|e| e.text == "Commands:"));
        assert!(last_line(&client).starts_with("/cancel trade|battle"));
    }

    #[test]
    fn test_inbound_chat_and_whisper() {
        let mut client = client();
        deliver(
            &mut client,
            "misty",
            Payload::Chat {
                message: "hi all".into(),
                target: None,
            },
        );
        deliver(
            &mut client,
            "misty",
            Payload::Chat {
                message: "psst".into(),
                target: Some(PeerId::new("ash")),
            },
        );
        deliver(
            &mut client,
            "misty",
            Payload::Chat {
                message: "not for ash".into(),
                target: Some(PeerId::new("brock")),
            },
        );

        let lines: Vec<(ChatKind, &str)> = client
            .chat()
            .entries()
            .map(|e| (e.kind, e.text.as_str()))
            .collect();
        assert_eq!(
            lines,
            vec![(ChatKind::Normal, "hi all"), (ChatKind::Whisper, "psst")]
        );
    }

    #[test]
    fn test_inbound_position_feeds_directory() {
        let mut client = client();
        deliver(
            &mut client,
            "misty",
            Payload::Position(PositionUpdate {
                x: 3,
                y: 4,
                direction: 2,
                map_id: 5,
                character_name: None,
                character_hue: None,
            }),
        );
        assert_eq!(client.directory().on_map(5).len(), 1);

        deliver(
            &mut client,
            "server",
            Payload::PlayerLeft {
                name: PeerId::new("misty"),
            },
        );
        assert!(client.directory().is_empty());
        assert_eq!(last_line(&client), "misty left.");
    }

    #[test]
    fn test_incoming_request_raises_notice_and_line() {
        let mut client = client();
        deliver(
            &mut client,
            "misty",
            Payload::TradeRequest {
                target: PeerId::new("ash"),
            },
        );
        assert_eq!(
            client.take_notices(),
            vec![Notice::RequestReceived {
                kind: SessionKind::Trade,
                peer: PeerId::new("misty"),
            }]
        );
        assert!(last_line(&client).starts_with("misty wants to trade with you."));
        assert!(client.take_notices().is_empty());
    }

    #[test]
    fn test_stray_session_message_is_discarded() {
        let mut client = client();
        deliver(
            &mut client,
            "misty",
            Payload::TradeUpdate(TradeUpdate::default()),
        );
        assert!(!client.trade_active());
        assert!(client.take_notices().is_empty());
    }

    #[test]
    fn test_message_without_sender_is_dropped() {
        let mut client = client();
        let msg = Message::new(Payload::Chat {
            message: "who?".into(),
            target: None,
        });
        client.dispatcher.dispatch(&mut client.state, &msg);
        assert!(client.chat().is_empty());
    }

    #[test]
    fn test_player_list_is_printed() {
        let mut client = client();
        deliver(
            &mut client,
            "server",
            Payload::PlayerList {
                players: vec![PeerId::new("ash"), PeerId::new("misty")],
            },
        );
        assert_eq!(last_line(&client), "Online (2): ash, misty");
    }

    #[tokio::test]
    async fn test_failed_reconnect_rotates_servers() {
        let mut client = client();
        client.on_tick(Duration::from_secs(10)).await;
        assert_eq!(client.heartbeat().reconnect_attempts(), 1);
        assert_eq!(client.server_index, 1);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        client.on_tick(Duration::from_secs(10)).await;
        assert_eq!(client.server_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_request_expires_on_tick() {
        let mut client = client();
        deliver(
            &mut client,
            "misty",
            Payload::BattleRequest {
                target: PeerId::new("ash"),
            },
        );
        client.take_notices();

        tokio::time::advance(Duration::from_secs(31)).await;
        client.on_tick(Duration::from_millis(16)).await;

        assert!(client.registry().incoming(SessionKind::Battle).is_empty());
        assert_eq!(last_line(&client), "The battle request from misty expired.");
    }

    #[test]
    fn test_entry_points_need_connection() {
        let mut client = client();
        assert!(matches!(
            client.start_trade(PeerId::new("misty")),
            Err(NetError::NotConnected)
        ));
        assert!(matches!(
            client.select_action(Action::Flee),
            Err(NetError::NotConnected)
        ));
        assert!(client.registry().pending().next().is_none());
    }
}

//! Terminal client for trying Tandem against a relay server.
//!
//! ```text
//! chat-client [config.json]
//! ```
//!
//! Chat and `/commands` are typed as in the game. Lines starting with `!`
//! stand in for the game's trade and battle screens:
//!
//! ```text
//! !item <id> <amount>   offer items        !confirm          confirm the trade
//! !money <amount>       offer money        !attack <slot>    use a move
//! !pokemon <slot>       offer a creature   !switch <index>   switch creature
//! !bag                  show inventory     !flee             run away
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tandem::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// A tiny stand-in game
// ---------------------------------------------------------------------------

struct TerminalGame {
    party: Vec<PartyMember>,
    items: BTreeMap<ItemId, u32>,
    money: u64,
}

impl TerminalGame {
    fn new() -> Self {
        let member = |slot_index, species, moves: &[u16]| PartyMember {
            slot_index,
            species,
            level: 12,
            hp: 36,
            max_hp: 36,
            moves: moves.to_vec(),
        };
        Self {
            party: vec![member(0, 25, &[84, 98]), member(1, 7, &[33, 55])],
            items: BTreeMap::from([(1, 3), (4, 5)]),
            money: 500,
        }
    }
}

impl Host for TerminalGame {
    fn party(&self) -> Vec<PartyMember> {
        self.party.clone()
    }

    fn item_count(&self, item: ItemId) -> u32 {
        self.items.get(&item).copied().unwrap_or(0)
    }

    fn money(&self) -> u64 {
        self.money
    }

    fn take_item(&mut self, item: ItemId, amount: u32) {
        if let Some(count) = self.items.get_mut(&item) {
            *count = count.saturating_sub(amount);
        }
    }

    fn give_item(&mut self, item: ItemId, amount: u32) {
        *self.items.entry(item).or_default() += amount;
    }

    fn spend_money(&mut self, amount: u64) {
        self.money = self.money.saturating_sub(amount);
    }

    fn earn_money(&mut self, amount: u64) {
        self.money += amount;
    }

    fn release_creatures(&mut self, to: &PeerId, slots: &BTreeSet<usize>) {
        info!(%to, ?slots, "creatures sent");
        let mut slot = 0;
        self.party.retain(|_| {
            let keep = !slots.contains(&slot);
            slot += 1;
            keep
        });
        for (i, member) in self.party.iter_mut().enumerate() {
            member.slot_index = i;
        }
    }

    fn receive_creatures(&mut self, from: &PeerId, slots: &BTreeSet<usize>) {
        // The peer's roster isn't shared during a trade, so arrivals are
        // placeholders until the game syncs real data.
        for _ in slots {
            let slot_index = self.party.len();
            self.party.push(PartyMember {
                slot_index,
                species: 0,
                level: 5,
                hp: 20,
                max_hp: 20,
                moves: vec![33],
            });
        }
        info!(%from, count = slots.len(), "creatures received");
    }

    fn resolve_turn(&mut self, turn: &mut TurnContext<'_>) {
        if let Action::Attack(_) = turn.local_action {
            if let Some(them) = turn.remote.get_mut(turn.remote_current) {
                them.hp = them.hp.saturating_sub(12);
            }
        }
        if let Action::Attack(_) = turn.remote_action {
            if let Some(me) = turn.local.get_mut(turn.local_current) {
                me.hp = me.hp.saturating_sub(12);
            }
        }
    }

    fn start_encounter(&mut self, opponent: &PeerId, team: &[RosterEntry]) {
        println!("*** battle against {opponent} ({} creatures) ***", team.len());
    }
}

// ---------------------------------------------------------------------------
// `!` commands
// ---------------------------------------------------------------------------

fn run_game_command(client: &mut TandemClient<TerminalGame>, line: &str) -> Result<(), String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let mut number = |what: &str| -> Result<u64, String> {
        words
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| format!("{verb} needs a {what}"))
    };

    let result = match verb {
        "item" => {
            let item = number("item id")? as ItemId;
            let amount = number("amount")? as u32;
            client.offer(OfferChange::AddItem { item, amount })
        }
        "money" => client.offer(OfferChange::SetMoney(number("amount")?)),
        "pokemon" => client.offer(OfferChange::AddCreature(number("slot")? as usize)),
        "confirm" => client.confirm_trade(),
        "attack" => client.select_action(Action::Attack(number("move slot")? as usize)),
        "switch" => client.select_action(Action::Switch(number("roster index")? as usize)),
        "flee" => client.select_action(Action::Flee),
        "bag" => {
            let game = client.host();
            println!("money: {}  items: {:?}", game.money, game.items);
            Ok(())
        }
        other => return Err(format!("unknown game command `{other}`")),
    };
    result.map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn load_config() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(ClientConfig::from_json(&json)?)
        }
        None => {
            let name = std::env::var("TANDEM_PLAYER").unwrap_or_else(|_| "player".into());
            Ok(ClientConfig::for_player(name).validated()?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    info!(player = %config.player_name, servers = config.servers.len(), "starting chat client");

    let mut client = TandemClient::new(config, TerminalGame::new())?;
    if let Err(err) = client.connect().await {
        warn!(%err, "first connect failed, will retry");
    }

    let mut clock = FrameClock::with_rate(30);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match line.strip_prefix('!') {
                    Some(cmd) => {
                        if let Err(err) = run_game_command(&mut client, cmd) {
                            println!("! {err}");
                        }
                    }
                    None => client.submit_input(&line),
                },
                None => break,
            },
            frame = clock.wait_for_frame() => {
                client.on_tick(frame.dt).await;
            }
        }

        for entry in client.chat().since(printed) {
            match (&entry.sender, entry.kind) {
                (Some(sender), ChatKind::Whisper) => println!("[{sender} whispers] {}", entry.text),
                (Some(sender), _) => println!("<{sender}> {}", entry.text),
                (None, ChatKind::Error) => println!("!! {}", entry.text),
                (None, _) => println!("-- {}", entry.text),
            }
        }
        printed = client.chat().total();
    }

    if client.connection_state().is_connected() {
        client.disconnect().await?;
    }
    Ok(())
}

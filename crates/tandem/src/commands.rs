//! Slash commands typed into the chat box.
//!
//! Anything that starts with `/` is looked up in [`COMMANDS`] by name or
//! alias (case-insensitive); everything else is ordinary chat. Parsing is
//! pure: [`CommandRouter::parse`] only turns text into a [`Command`], and
//! the client decides what to send.

use tandem_protocol::{PeerId, SessionKind};

/// What the player asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat to everyone.
    Say(String),
    Whisper { target: PeerId, message: String },
    Help,
    Online,
    Trade(PeerId),
    Battle(PeerId),
    /// Accept a proposal. Without a name, the only pending one of that kind.
    Accept {
        kind: SessionKind,
        peer: Option<PeerId>,
    },
    Decline {
        kind: SessionKind,
        peer: Option<PeerId>,
    },
    Cancel(SessionKind),
}

/// Input that could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command. Use /help for the list of commands.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("No pending {0} request.")]
    NothingPending(SessionKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Help,
    Whisper,
    Online,
    Trade,
    Battle,
    Accept,
    Decline,
    Cancel,
}

/// One row of the command table.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
    verb: Verb,
}

impl CommandSpec {
    fn matches(&self, word: &str) -> bool {
        self.name.eq_ignore_ascii_case(word)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(word))
    }
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        aliases: &[],
        usage: "/help",
        description: "Show the list of commands",
        verb: Verb::Help,
    },
    CommandSpec {
        name: "whisper",
        aliases: &["w", "msg", "pm"],
        usage: "/whisper <name> <message>",
        description: "Send a private message to another player",
        verb: Verb::Whisper,
    },
    CommandSpec {
        name: "online",
        aliases: &["players"],
        usage: "/online",
        description: "List the players that are online",
        verb: Verb::Online,
    },
    CommandSpec {
        name: "trade",
        aliases: &[],
        usage: "/trade <name>",
        description: "Propose a trade to another player",
        verb: Verb::Trade,
    },
    CommandSpec {
        name: "battle",
        aliases: &[],
        usage: "/battle <name>",
        description: "Challenge another player to a battle",
        verb: Verb::Battle,
    },
    CommandSpec {
        name: "accept",
        aliases: &[],
        usage: "/accept trade|battle [name]",
        description: "Accept a trade or battle proposal",
        verb: Verb::Accept,
    },
    CommandSpec {
        name: "decline",
        aliases: &[],
        usage: "/decline trade|battle [name]",
        description: "Turn down a trade or battle proposal",
        verb: Verb::Decline,
    },
    CommandSpec {
        name: "cancel",
        aliases: &[],
        usage: "/cancel trade|battle",
        description: "Leave the current trade or battle",
        verb: Verb::Cancel,
    },
];

pub struct CommandRouter;

impl CommandRouter {
    /// Parse one line of chat input. Blank input is `Ok(None)`.
    pub fn parse(input: &str) -> Result<Option<Command>, CommandError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        let Some(rest) = input.strip_prefix('/') else {
            return Ok(Some(Command::Say(input.to_string())));
        };

        let (word, args) = match rest.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim()),
            None => (rest, ""),
        };
        let spec = Self::lookup(word).ok_or_else(|| CommandError::Unknown(word.to_string()))?;
        let usage = CommandError::Usage(spec.usage);
        let mut words = args.split_whitespace();

        let command = match spec.verb {
            Verb::Help => Command::Help,
            Verb::Online => Command::Online,
            Verb::Whisper => {
                let (target, message) = args.split_once(char::is_whitespace).ok_or(usage)?;
                let message = message.trim();
                if message.is_empty() {
                    return Err(CommandError::Usage(spec.usage));
                }
                Command::Whisper {
                    target: PeerId::new(target),
                    message: message.to_string(),
                }
            }
            Verb::Trade => Command::Trade(PeerId::new(words.next().ok_or(usage)?)),
            Verb::Battle => Command::Battle(PeerId::new(words.next().ok_or(usage)?)),
            Verb::Accept | Verb::Decline => {
                let kind = words
                    .next()
                    .and_then(|w| w.parse::<SessionKind>().ok())
                    .ok_or(usage)?;
                let peer = words.next().map(PeerId::from);
                if spec.verb == Verb::Accept {
                    Command::Accept { kind, peer }
                } else {
                    Command::Decline { kind, peer }
                }
            }
            Verb::Cancel => Command::Cancel(
                words
                    .next()
                    .and_then(|w| w.parse::<SessionKind>().ok())
                    .ok_or(usage)?,
            ),
        };
        Ok(Some(command))
    }

    pub fn lookup(word: &str) -> Option<&'static CommandSpec> {
        COMMANDS.iter().find(|spec| spec.matches(word))
    }

    /// One line per command, for `/help`.
    pub fn help_lines() -> Vec<String> {
        COMMANDS
            .iter()
            .map(|spec| format!("{} - {}", spec.usage, spec.description))
            .collect()
    }
}

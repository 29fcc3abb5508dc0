//! Client configuration.
//!
//! Everything here is plain data with serde derives so hosts can load it
//! from a JSON file. Durations are stored as whole seconds to keep the file
//! readable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_protocol::PeerId;
use tandem_session::SessionConfig;
use tandem_tick::HeartbeatConfig;

use crate::NetError;

/// One session server the client may connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Display name, e.g. `"Kanto"`.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ServerDescriptor {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`, as the connector expects it.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The local player's name, stamped on every outgoing message.
    pub player_name: String,
    /// Servers to try, in order. The client moves to the next one after
    /// each failed attempt.
    pub servers: Vec<ServerDescriptor>,
    pub reconnect_interval_secs: u64,
    pub reconnect_jitter_ms: u64,
    pub ping_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub proposal_timeout_secs: u64,
    /// Chat lines kept in history.
    pub chat_history: usize,
    /// Resend the local position every this many ticks even if unchanged.
    pub position_sync_frames: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: "player".to_string(),
            servers: vec![ServerDescriptor::new("local", "127.0.0.1", 54269)],
            reconnect_interval_secs: 10,
            reconnect_jitter_ms: 0,
            ping_interval_secs: 30,
            connect_timeout_secs: 5,
            proposal_timeout_secs: 30,
            chat_history: 100,
            position_sync_frames: 10,
        }
    }
}

impl ClientConfig {
    /// Default config with the given player name.
    pub fn for_player(name: impl Into<String>) -> Self {
        Self {
            player_name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NetError::Config(e.to_string()))?;
        config.validated()
    }

    /// Reject configs the client can't run with.
    pub fn validated(mut self) -> Result<Self, NetError> {
        self.player_name = self.player_name.trim().to_string();
        if self.player_name.is_empty() {
            return Err(NetError::Config("player_name must not be empty".into()));
        }
        if self.servers.is_empty() {
            return Err(NetError::Config("at least one server is required".into()));
        }
        self.chat_history = self.chat_history.max(1);
        self.position_sync_frames = self.position_sync_frames.max(1);
        self.connect_timeout_secs = self.connect_timeout_secs.max(1);
        Ok(self)
    }

    pub fn local_peer(&self) -> PeerId {
        PeerId::new(self.player_name.clone())
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            reconnect_jitter: Duration::from_millis(self.reconnect_jitter_ms),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            proposal_timeout: Duration::from_secs(self.proposal_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

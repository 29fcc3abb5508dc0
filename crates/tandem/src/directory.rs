//! What the client knows about other players on the map.

use std::collections::HashMap;

use tandem_protocol::{Direction, PeerId, PositionUpdate};
use tracing::{debug, trace};

/// Host-side handle for a peer's on-screen sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpriteHandle(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Appearance {
    pub character_name: Option<String>,
    pub hue: Option<u16>,
}

/// Last known state of one peer. Fields stay `None` until first reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub map_id: Option<u32>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub direction: Option<Direction>,
    pub appearance: Appearance,
    pub sprite: Option<SpriteHandle>,
}

/// A partial update: only `Some` fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerUpdate {
    pub map_id: Option<u32>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub direction: Option<Direction>,
    pub character_name: Option<String>,
    pub hue: Option<u16>,
}

impl From<&PositionUpdate> for PeerUpdate {
    fn from(pos: &PositionUpdate) -> Self {
        Self {
            map_id: Some(pos.map_id),
            x: Some(pos.x),
            y: Some(pos.y),
            direction: Some(pos.direction),
            character_name: pos.character_name.clone(),
            hue: pos.character_hue,
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, PeerSnapshot>,
    released: Vec<SpriteHandle>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `update` into the entry for `peer`, creating it if needed.
    /// Returns `true` if the peer was new.
    pub fn upsert(&mut self, peer: &PeerId, update: PeerUpdate) -> bool {
        let is_new = !self.peers.contains_key(peer);
        let entry = self.peers.entry(peer.clone()).or_default();

        if let Some(map_id) = update.map_id {
            entry.map_id = Some(map_id);
        }
        if let Some(x) = update.x {
            entry.x = Some(x);
        }
        if let Some(y) = update.y {
            entry.y = Some(y);
        }
        if let Some(direction) = update.direction {
            entry.direction = Some(direction);
        }
        if let Some(name) = update.character_name {
            entry.appearance.character_name = Some(name);
        }
        if let Some(hue) = update.hue {
            entry.appearance.hue = Some(hue);
        }

        if is_new {
            debug!(%peer, "peer appeared");
        } else {
            trace!(%peer, "peer updated");
        }
        is_new
    }

    /// Forget `peer`. Its sprite, if any, is queued for
    /// [`take_released`](Self::take_released).
    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerSnapshot> {
        let snapshot = self.peers.remove(peer)?;
        if let Some(sprite) = snapshot.sprite {
            self.released.push(sprite);
        }
        debug!(%peer, "peer removed");
        Some(snapshot)
    }

    /// Sprites the host should dispose of. Each handle is returned once.
    pub fn take_released(&mut self) -> Vec<SpriteHandle> {
        std::mem::take(&mut self.released)
    }

    /// Record the sprite the host created for `peer`. Replacing a sprite
    /// queues the old one for release.
    pub fn attach_sprite(&mut self, peer: &PeerId, sprite: SpriteHandle) -> bool {
        let Some(entry) = self.peers.get_mut(peer) else {
            return false;
        };
        if let Some(old) = entry.sprite.replace(sprite) {
            if old != sprite {
                self.released.push(old);
            }
        }
        true
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerSnapshot> {
        self.peers.get(peer)
    }

    /// Peers last seen on `map_id`, sorted by name.
    pub fn on_map(&self, map_id: u32) -> Vec<(&PeerId, &PeerSnapshot)> {
        let mut peers: Vec<_> = self
            .peers
            .iter()
            .filter(|(_, snap)| snap.map_id == Some(map_id))
            .collect();
        peers.sort_by(|a, b| a.0.cmp(b.0));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop every peer, releasing all sprites.
    pub fn clear(&mut self) {
        for (_, snapshot) in self.peers.drain() {
            if let Some(sprite) = snapshot.sprite {
                self.released.push(sprite);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn misty() -> PeerId {
        PeerId::new("misty")
    }

    #[test]
    fn test_upsert_only_overwrites_provided_fields() {
        let mut dir = PeerDirectory::new();
        assert!(dir.upsert(
            &misty(),
            PeerUpdate {
                map_id: Some(3),
                x: Some(1),
                y: Some(2),
                character_name: Some("trchar012".into()),
                ..Default::default()
            }
        ));
        assert!(!dir.upsert(
            &misty(),
            PeerUpdate {
                x: Some(5),
                ..Default::default()
            }
        ));

        let snap = dir.get(&misty()).unwrap();
        assert_eq!(snap.x, Some(5));
        assert_eq!(snap.y, Some(2));
        assert_eq!(snap.map_id, Some(3));
        assert_eq!(snap.appearance.character_name.as_deref(), Some("trchar012"));
        assert_eq!(snap.direction, None);
    }

    #[test]
    fn test_remove_queues_sprite_for_release_once() {
        let mut dir = PeerDirectory::new();
        dir.upsert(&misty(), PeerUpdate::default());
        assert!(dir.attach_sprite(&misty(), SpriteHandle(7)));

        dir.remove(&misty()).unwrap();
        assert_eq!(dir.take_released(), vec![SpriteHandle(7)]);
        assert!(dir.take_released().is_empty());
        assert!(dir.get(&misty()).is_none());
    }

    #[test]
    fn test_attach_sprite_to_unknown_peer_fails() {
        let mut dir = PeerDirectory::new();
        assert!(!dir.attach_sprite(&misty(), SpriteHandle(1)));
    }

    #[test]
    fn test_on_map_filters_and_sorts() {
        let mut dir = PeerDirectory::new();
        for (name, map) in [("gary", 1), ("brock", 1), ("misty", 2)] {
            dir.upsert(
                &PeerId::new(name),
                PeerUpdate {
                    map_id: Some(map),
                    ..Default::default()
                },
            );
        }
        let names: Vec<&str> = dir.on_map(1).iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(names, vec!["brock", "gary"]);
    }

    #[test]
    fn test_from_position_update_carries_appearance() {
        let update = PeerUpdate::from(&PositionUpdate {
            x: 4,
            y: 9,
            direction: 8,
            map_id: 12,
            character_name: None,
            character_hue: Some(120),
        });
        assert_eq!(update.map_id, Some(12));
        assert_eq!(update.direction, Some(8));
        assert_eq!(update.character_name, None);
        assert_eq!(update.hue, Some(120));
    }
}

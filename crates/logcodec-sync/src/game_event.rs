//! The closed set of game events the sync layer acts on.
//!
//! A `DecodedEvent` is dynamically typed; converting it into a `GameEvent`
//! checks the shape once so handlers work with plain Rust fields. Adding a
//! variant here forces every `match` over `GameEvent` to handle it.

use logcodec_core::{entity::EntityId, DecodedEvent, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decoded event whose fields do not match its variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Event '{event}' field '{field}': expected {expected}")]
pub struct EventShapeError {
    pub event: String,
    pub field: String,
    pub expected: &'static str,
}

/// Lifecycle phase of a game instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayPhase {
    Lobby,
    Build,
    Play,
    Paused,
    Finished,
}

impl PlayPhase {
    pub fn from_variant(name: &str) -> Option<Self> {
        match name {
            "Lobby" => Some(Self::Lobby),
            "Build" => Some(Self::Build),
            "Play" => Some(Self::Play),
            "Paused" => Some(Self::Paused),
            "Finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    NewWorldInstance {
        world_instance: [u8; 32],
        instance_authority: [u8; 32],
    },
    NewComponentRegistered {
        component: [u8; 32],
        schema: String,
    },
    NewSystemRegistration {
        world_instance: [u8; 32],
        component: [u8; 32],
        system: [u8; 32],
        system_registration: [u8; 32],
    },
    NewUnitSpawned {
        instance: u64,
        tile: EntityId,
        player: EntityId,
        unit: EntityId,
    },
    TroopMovement {
        instance: u64,
        from: EntityId,
        to: EntityId,
        unit: EntityId,
    },
    TileAttacked {
        instance: u64,
        attacker: EntityId,
        defender: EntityId,
        defending_tile: EntityId,
        damage: u64,
    },
    GameStateChanged {
        instance: u64,
        player: EntityId,
        new_state: PlayPhase,
    },
}

impl GameEvent {
    /// Convert a decoded event.
    ///
    /// `Ok(None)` for names that have no variant; those are not errors.
    pub fn from_decoded(event: &DecodedEvent) -> Result<Option<Self>, EventShapeError> {
        let f = Fields(event);
        let parsed = match event.name.as_str() {
            "NewWorldInstance" => Self::NewWorldInstance {
                world_instance: f.pubkey("world_instance")?,
                instance_authority: f.pubkey("instance_authority")?,
            },
            "NewComponentRegistered" => Self::NewComponentRegistered {
                component: f.pubkey("component")?,
                schema: f.string("schema")?,
            },
            "NewSystemRegistration" => Self::NewSystemRegistration {
                world_instance: f.pubkey("world_instance")?,
                component: f.pubkey("component")?,
                system: f.pubkey("system")?,
                system_registration: f.pubkey("system_registration")?,
            },
            "NewUnitSpawned" => Self::NewUnitSpawned {
                instance: f.u64("instance")?,
                tile: f.u64("tile")?,
                player: f.u64("player")?,
                unit: f.u64("unit")?,
            },
            "TroopMovement" => Self::TroopMovement {
                instance: f.u64("instance")?,
                from: f.u64("from")?,
                to: f.u64("to")?,
                unit: f.u64("unit")?,
            },
            "TileAttacked" => Self::TileAttacked {
                instance: f.u64("instance")?,
                attacker: f.u64("attacker")?,
                defender: f.u64("defender")?,
                defending_tile: f.u64("defending_tile")?,
                damage: f.u64("damage")?,
            },
            "GameStateChanged" => Self::GameStateChanged {
                instance: f.u64("instance")?,
                player: f.u64("player")?,
                new_state: f.phase("new_state")?,
            },
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NewWorldInstance { .. } => "NewWorldInstance",
            Self::NewComponentRegistered { .. } => "NewComponentRegistered",
            Self::NewSystemRegistration { .. } => "NewSystemRegistration",
            Self::NewUnitSpawned { .. } => "NewUnitSpawned",
            Self::TroopMovement { .. } => "TroopMovement",
            Self::TileAttacked { .. } => "TileAttacked",
            Self::GameStateChanged { .. } => "GameStateChanged",
        }
    }

    /// Game instance the event belongs to. `None` for world-level events.
    pub fn instance(&self) -> Option<u64> {
        match self {
            Self::NewWorldInstance { .. }
            | Self::NewComponentRegistered { .. }
            | Self::NewSystemRegistration { .. } => None,
            Self::NewUnitSpawned { instance, .. }
            | Self::TroopMovement { instance, .. }
            | Self::TileAttacked { instance, .. }
            | Self::GameStateChanged { instance, .. } => Some(*instance),
        }
    }

    /// Entities whose cached state the event invalidates.
    pub fn touched_entities(&self) -> Vec<EntityId> {
        match self {
            // Registrations change world metadata, not cached entities
            Self::NewWorldInstance { .. }
            | Self::NewComponentRegistered { .. }
            | Self::NewSystemRegistration { .. } => Vec::new(),
            Self::NewUnitSpawned {
                tile, unit, player, ..
            } => vec![*tile, *unit, *player],
            Self::TroopMovement { from, to, unit, .. } => vec![*from, *to, *unit],
            Self::TileAttacked {
                attacker,
                defender,
                defending_tile,
                ..
            } => vec![*attacker, *defender, *defending_tile],
            // Phase changes are carried in the event itself
            Self::GameStateChanged { .. } => Vec::new(),
        }
    }

    /// Instance whose entity directory the event changes.
    pub fn index_refresh(&self) -> Option<u64> {
        match self {
            Self::NewUnitSpawned { instance, .. } => Some(*instance),
            _ => None,
        }
    }
}

struct Fields<'a>(&'a DecodedEvent);

impl Fields<'_> {
    fn get(&self, field: &str, expected: &'static str) -> Result<&Value, EventShapeError> {
        self.0.field(field).ok_or_else(|| self.err(field, expected))
    }

    fn err(&self, field: &str, expected: &'static str) -> EventShapeError {
        EventShapeError {
            event: self.0.name.clone(),
            field: field.to_string(),
            expected,
        }
    }

    fn u64(&self, field: &str) -> Result<u64, EventShapeError> {
        self.get(field, "u64")?
            .as_u64()
            .ok_or_else(|| self.err(field, "u64"))
    }

    fn pubkey(&self, field: &str) -> Result<[u8; 32], EventShapeError> {
        self.get(field, "pubkey")?
            .as_pubkey()
            .copied()
            .ok_or_else(|| self.err(field, "pubkey"))
    }

    fn string(&self, field: &str) -> Result<String, EventShapeError> {
        self.get(field, "string")?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.err(field, "string"))
    }

    fn phase(&self, field: &str) -> Result<PlayPhase, EventShapeError> {
        self.get(field, "PlayPhase")?
            .as_variant()
            .and_then(PlayPhase::from_variant)
            .ok_or_else(|| self.err(field, "PlayPhase"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn troop_movement() -> DecodedEvent {
        DecodedEvent::new("TroopMovement")
            .with_field("instance", Value::Uint(7))
            .with_field("from", Value::Uint(100))
            .with_field("to", Value::Uint(101))
            .with_field("unit", Value::Uint(500))
    }

    #[test]
    fn converts_troop_movement() {
        let ev = GameEvent::from_decoded(&troop_movement()).unwrap().unwrap();
        assert_eq!(ev.instance(), Some(7));
        assert_eq!(ev.touched_entities(), vec![100, 101, 500]);
        assert_eq!(ev.name(), "TroopMovement");
    }

    #[test]
    fn spawn_refreshes_instance_index() {
        let decoded = DecodedEvent::new("NewUnitSpawned")
            .with_field("instance", Value::Uint(7))
            .with_field("tile", Value::Uint(100))
            .with_field("player", Value::Uint(3))
            .with_field("unit", Value::Uint(500));
        let ev = GameEvent::from_decoded(&decoded).unwrap().unwrap();
        assert_eq!(ev.touched_entities(), vec![100, 500, 3]);
        assert_eq!(ev.index_refresh(), Some(7));
        assert_eq!(GameEvent::from_decoded(&troop_movement()).unwrap().unwrap().index_refresh(), None);
    }

    #[test]
    fn converts_game_state_changed() {
        let decoded = DecodedEvent::new("GameStateChanged")
            .with_field("instance", Value::Uint(7))
            .with_field("player", Value::Uint(3))
            .with_field(
                "new_state",
                Value::Enum {
                    variant: "Paused".into(),
                    index: 3,
                    fields: vec![],
                },
            );
        let ev = GameEvent::from_decoded(&decoded).unwrap().unwrap();
        assert_eq!(
            ev,
            GameEvent::GameStateChanged {
                instance: 7,
                player: 3,
                new_state: PlayPhase::Paused
            }
        );
        assert!(ev.touched_entities().is_empty());
    }

    #[test]
    fn world_events_have_no_instance() {
        let decoded = DecodedEvent::new("NewComponentRegistered")
            .with_field("component", Value::Pubkey([9u8; 32]))
            .with_field("schema", Value::Str("https://example.com/location.json".into()));
        let ev = GameEvent::from_decoded(&decoded).unwrap().unwrap();
        assert_eq!(ev.instance(), None);
    }

    #[test]
    fn unknown_name_is_not_an_error() {
        let decoded = DecodedEvent::new("FeatureBuilt").with_field("instance", Value::Uint(1));
        assert_eq!(GameEvent::from_decoded(&decoded), Ok(None));
    }

    #[test]
    fn wrong_shape_names_the_field() {
        let decoded = DecodedEvent::new("TroopMovement")
            .with_field("instance", Value::Uint(7))
            .with_field("from", Value::Str("a".into()));
        let err = GameEvent::from_decoded(&decoded).unwrap_err();
        assert_eq!(err.field, "from");
        assert_eq!(err.expected, "u64");
    }
}

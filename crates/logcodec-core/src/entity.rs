//! Entity snapshots held in the local cache.

use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 64-bit entity identifier assigned by the remote program.
pub type EntityId = u64;

/// What kind of game object an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Map,
    Tile,
    Unit,
    Feature,
    Player,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Map => "map",
            EntityKind::Tile => "tile",
            EntityKind::Unit => "unit",
            EntityKind::Feature => "feature",
            EntityKind::Player => "player",
        };
        write!(f, "{s}")
    }
}

/// Last-known state of one entity as returned by the authoritative source.
///
/// Snapshots are immutable once fetched; the cache replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Source-side revision (slot or write counter) the snapshot was read at
    pub revision: u64,
    /// Component name → decoded component value
    pub components: IndexMap<String, Value>,
}

impl EntitySnapshot {
    pub fn new(id: EntityId, kind: EntityKind, revision: u64) -> Self {
        Self {
            id,
            kind,
            revision,
            components: IndexMap::new(),
        }
    }

    pub fn with_component(mut self, name: impl Into<String>, value: Value) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    pub fn component(&self, name: &str) -> Option<&Value> {
        self.components.get(name)
    }
}

/// Directory of the entities that make up one game instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIndex {
    pub instance: u64,
    pub map: EntityId,
    pub tiles: Vec<EntityId>,
    pub features: Vec<EntityId>,
    pub units: Vec<EntityId>,
    pub players: Vec<EntityId>,
}

impl InstanceIndex {
    pub fn new(instance: u64, map: EntityId) -> Self {
        Self {
            instance,
            map,
            ..Self::default()
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.map == id
            || [&self.tiles, &self.features, &self.units, &self.players]
                .iter()
                .any(|ids| ids.contains(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lookup_covers_every_list() {
        let mut index = InstanceIndex::new(7, 1);
        index.tiles = vec![10, 11];
        index.units = vec![500];
        assert!(index.contains(1));
        assert!(index.contains(11));
        assert!(index.contains(500));
        assert!(!index.contains(600));
    }
}

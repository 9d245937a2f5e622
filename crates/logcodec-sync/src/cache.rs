//! Process-local entity cache.
//!
//! Entries are only ever replaced wholesale. The cache also owns the active
//! instance id: the id and the epoch change together under one lock, and
//! every write carries the epoch it was scheduled under. Switching the
//! active instance bumps the epoch and clears the map, so refreshes that
//! started before the switch are dropped.

use logcodec_core::{EntityId, EntitySnapshot, InstanceIndex};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// The active instance together with the epoch it was activated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub instance: u64,
    pub epoch: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<EntityId, Arc<EntitySnapshot>>,
    index: Option<Arc<InstanceIndex>>,
    instance: u64,
    epoch: u64,
}

impl Inner {
    fn clear(&mut self) -> u64 {
        self.entries.clear();
        self.index = None;
        self.epoch += 1;
        self.epoch
    }
}

#[derive(Default)]
pub struct EntityCache {
    inner: RwLock<Inner>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_instance(instance: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                instance,
                ..Inner::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<EntitySnapshot>> {
        self.read().entries.get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.read().entries.contains_key(&id)
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    pub fn instance(&self) -> u64 {
        self.read().instance
    }

    /// Active instance and epoch, read together.
    pub fn scope(&self) -> Scope {
        let inner = self.read();
        Scope {
            instance: inner.instance,
            epoch: inner.epoch,
        }
    }

    /// Make `instance` the active one.
    ///
    /// Returns the new epoch, or `None` if `instance` was already active
    /// and nothing was dropped.
    pub fn switch_instance(&self, instance: u64) -> Option<u64> {
        let mut inner = self.write();
        if inner.instance == instance {
            return None;
        }
        inner.instance = instance;
        Some(inner.clear())
    }

    /// Replace the entry for `snapshot.id` if `epoch` is still current.
    ///
    /// Returns `false` when the write was discarded.
    pub fn replace(&self, snapshot: EntitySnapshot, epoch: u64) -> bool {
        let mut inner = self.write();
        if inner.epoch != epoch {
            return false;
        }
        inner.entries.insert(snapshot.id, Arc::new(snapshot));
        true
    }

    /// Replace the index of the active instance if `epoch` is still current.
    pub fn replace_index(&self, index: InstanceIndex, epoch: u64) -> bool {
        let mut inner = self.write();
        if inner.epoch != epoch || inner.instance != index.instance {
            return false;
        }
        inner.index = Some(Arc::new(index));
        true
    }

    /// Last fetched index of the active instance.
    pub fn index(&self) -> Option<Arc<InstanceIndex>> {
        self.read().index.clone()
    }

    /// Drop every entry and start a new epoch.
    pub fn invalidate(&self) -> u64 {
        self.write().clear()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted ids of all cached entities.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.read().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("EntityCache")
            .field("entries", &inner.entries.len())
            .field("instance", &inner.instance)
            .field("epoch", &inner.epoch)
            .finish()
    }
}

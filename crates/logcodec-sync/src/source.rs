//! The authoritative data source the reconciler refreshes from.

use async_trait::async_trait;
use logcodec_core::{EntityId, EntitySnapshot, InstanceIndex, ReconcileError};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        PoisonError, RwLock,
    },
};

/// Read access to the program's current entity state.
#[async_trait]
pub trait AuthoritativeSource: Send + Sync {
    /// Fetch the current state of one entity.
    async fn refresh_entity(&self, id: EntityId) -> Result<EntitySnapshot, ReconcileError>;

    /// The game instance currently associated with this client.
    async fn current_instance_id(&self) -> Result<u64, ReconcileError>;

    /// Fetch the entity directory of one game instance.
    async fn refresh_instance_index(&self, instance: u64) -> Result<InstanceIndex, ReconcileError>;
}

/// In-memory source. Useful as a test double and for replaying recorded state.
#[derive(Debug, Default)]
pub struct MemorySource {
    instance: AtomicU64,
    entities: RwLock<HashMap<EntityId, EntitySnapshot>>,
    indexes: RwLock<HashMap<u64, InstanceIndex>>,
}

impl MemorySource {
    pub fn new(instance: u64) -> Self {
        Self {
            instance: AtomicU64::new(instance),
            entities: RwLock::default(),
            indexes: RwLock::default(),
        }
    }

    pub fn put(&self, snapshot: EntitySnapshot) {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.id, snapshot);
    }

    pub fn remove(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn put_index(&self, index: InstanceIndex) {
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index.instance, index);
    }

    pub fn set_instance(&self, instance: u64) {
        self.instance.store(instance, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthoritativeSource for MemorySource {
    async fn refresh_entity(&self, id: EntityId) -> Result<EntitySnapshot, ReconcileError> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(ReconcileError::NotFound { id })
    }

    async fn current_instance_id(&self) -> Result<u64, ReconcileError> {
        Ok(self.instance.load(Ordering::SeqCst))
    }

    async fn refresh_instance_index(&self, instance: u64) -> Result<InstanceIndex, ReconcileError> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&instance)
            .cloned()
            .ok_or(ReconcileError::IndexNotFound { instance })
    }
}

//! Incremental entity reconciliation.
//!
//! Each scheduled event becomes one Tokio task that refreshes the entities
//! the event touched and writes the results into the cache.
//!
//! Writes to one id are serialized in scheduling order with a ticket chain:
//! at scheduling time the task takes the completion signal of the previous
//! task for each of its ids and installs its own. It refreshes an id only
//! after the previous holder has finished with it, so the last scheduled
//! refresh is also the last write. Unrelated ids never wait on each other.
//! An instance index is chained the same way under its own key.

use crate::{cache::EntityCache, source::AuthoritativeSource};
use futures::future::join_all;
use logcodec_core::EntityId;
use logcodec_observability::PipelineMetrics;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

/// Entities written by one handled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Name of the event that triggered the refresh
    pub event: String,
    pub ids: BTreeSet<EntityId>,
    /// Instance whose index was rewritten
    #[serde(default)]
    pub index: Option<u64>,
}

/// One thing a reconciliation task refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Target {
    Entity(EntityId),
    Index(u64),
}

/// Receives a `ChangeSet` after each reconciliation that wrote something.
///
/// Called from reconciliation tasks; must not block.
pub trait ChangeListener: Send + Sync + 'static {
    fn on_change(&self, changes: &ChangeSet);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeSet) + Send + Sync + 'static,
{
    fn on_change(&self, changes: &ChangeSet) {
        self(changes)
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub scheduled: u64,
    pub refreshed: u64,
    pub failed: u64,
    /// Refreshes finished after an instance switch and were thrown away
    pub stale: u64,
    /// Events refused because the reconciler was cancelled
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    refreshed: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
}

/// Tail of the ticket chain for one id.
struct Tail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

struct Inner {
    source: Arc<dyn AuthoritativeSource>,
    cache: Arc<EntityCache>,
    listener: Arc<dyn ChangeListener>,
    metrics: PipelineMetrics,
    tails: Mutex<HashMap<Target, Tail>>,
    next_ticket: AtomicU64,
    cancelled: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    counters: Counters,
}

/// Schedules refreshes and owns the per-id ordering.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

/// One target's place in the chain, held by the task that owns it.
struct Slot {
    target: Target,
    previous: Option<oneshot::Receiver<()>>,
    release: oneshot::Sender<()>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn AuthoritativeSource>,
        cache: Arc<EntityCache>,
        listener: Arc<dyn ChangeListener>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                listener,
                metrics,
                tails: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    /// Refresh `ids` on behalf of `event` in the current epoch.
    ///
    /// Only the identifier fields of the event are passed in. Returns
    /// `false` if the reconciler has been cancelled and nothing was
    /// scheduled. Must be called inside a Tokio runtime.
    pub fn schedule(&self, event: &str, ids: impl IntoIterator<Item = EntityId>) -> bool {
        let epoch = self.inner.cache.epoch();
        self.schedule_at(epoch, event, ids, None)
    }

    /// Refresh `ids`, and the index of `index` if given, on behalf of an
    /// event that was routed in `epoch`.
    ///
    /// Writes are dropped if the cache has moved past `epoch` by the time
    /// they land.
    pub fn schedule_at(
        &self,
        epoch: u64,
        event: &str,
        ids: impl IntoIterator<Item = EntityId>,
        index: Option<u64>,
    ) -> bool {
        let inner = &self.inner;
        if inner.cancelled.load(Ordering::SeqCst) {
            inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(event, "reconciler cancelled, not scheduling");
            return false;
        }

        let targets: BTreeSet<Target> = ids
            .into_iter()
            .map(Target::Entity)
            .chain(index.map(Target::Index))
            .collect();
        if targets.is_empty() {
            return true;
        }

        let ticket = inner.next_ticket.fetch_add(1, Ordering::SeqCst);
        let slots = {
            let mut tails = inner.tails.lock().unwrap_or_else(PoisonError::into_inner);
            targets
                .iter()
                .map(|&target| {
                    let (release, done) = oneshot::channel();
                    let previous = tails
                        .insert(target, Tail { ticket, done })
                        .map(|prev| prev.done);
                    Slot {
                        target,
                        previous,
                        release,
                    }
                })
                .collect::<Vec<_>>()
        };

        inner.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(event, ticket, epoch, ?targets, "scheduled reconciliation");

        let task_inner = Arc::clone(inner);
        let event = event.to_string();
        tokio::spawn(async move {
            task_inner.run(event, ticket, epoch, slots).await;
            if task_inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                task_inner.idle.notify_waiters();
            }
        });
        true
    }

    /// Stop accepting new work. In-flight refreshes still complete.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            info!(in_flight = self.in_flight(), "reconciler cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no reconciliation task is running.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> ReconcileStats {
        let c = &self.inner.counters;
        ReconcileStats {
            scheduled: c.scheduled.load(Ordering::Relaxed),
            refreshed: c.refreshed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    async fn run(&self, event: String, ticket: u64, epoch: u64, slots: Vec<Slot>) {
        let written = join_all(slots.into_iter().map(|slot| self.refresh_slot(ticket, epoch, slot))).await;
        let mut ids = BTreeSet::new();
        let mut index = None;
        for target in written.into_iter().flatten() {
            match target {
                Target::Entity(id) => {
                    ids.insert(id);
                }
                Target::Index(instance) => index = Some(instance),
            }
        }
        if ids.is_empty() && index.is_none() {
            return;
        }
        debug!(%event, ticket, ?ids, ?index, "entities updated");
        self.listener.on_change(&ChangeSet { event, ids, index });
    }

    /// Refresh one target once the previous holder released it.
    /// Returns the target if the cache was written.
    async fn refresh_slot(&self, ticket: u64, epoch: u64, slot: Slot) -> Option<Target> {
        let Slot {
            target,
            previous,
            release,
        } = slot;
        if let Some(previous) = previous {
            // Err means the previous task is gone; either way it is done with the target
            let _ = previous.await;
        }

        let written = match target {
            Target::Entity(id) => self.refresh_entity(id, epoch).await,
            Target::Index(instance) => self.refresh_index(instance, epoch).await,
        };

        self.release(target, ticket);
        drop(release);
        written.then_some(target)
    }

    async fn refresh_index(&self, instance: u64, epoch: u64) -> bool {
        match self.source.refresh_instance_index(instance).await {
            Ok(index) if index.instance != instance => {
                warn!(instance, got = index.instance, "source returned another instance's index, ignoring");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_refresh_failure();
                false
            }
            Ok(index) => {
                if self.cache.replace_index(index, epoch) {
                    self.counters.refreshed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_refresh();
                    true
                } else {
                    debug!(instance, epoch, "discarding index from a previous instance");
                    self.counters.stale.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
            Err(e) => {
                warn!(instance, error = %e, "index refresh failed, keeping last known index");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_refresh_failure();
                false
            }
        }
    }

    async fn refresh_entity(&self, id: EntityId, epoch: u64) -> bool {
        match self.source.refresh_entity(id).await {
            Ok(snapshot) if snapshot.id != id => {
                warn!(id, got = snapshot.id, "source returned a different entity, ignoring");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_refresh_failure();
                false
            }
            Ok(snapshot) => {
                if self.cache.replace(snapshot, epoch) {
                    self.counters.refreshed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_refresh();
                    true
                } else {
                    debug!(id, epoch, "discarding refresh from a previous instance");
                    self.counters.stale.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
            Err(e) => {
                warn!(id, error = %e, "entity refresh failed, keeping last known state");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_refresh_failure();
                false
            }
        }
    }

    fn release(&self, target: Target, ticket: u64) {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        if tails.get(&target).map(|t| t.ticket) == Some(ticket) {
            tails.remove(&target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use logcodec_core::{EntityKind, EntitySnapshot, InstanceIndex, ReconcileError, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collecting() -> (Arc<dyn ChangeListener>, mpsc::UnboundedReceiver<ChangeSet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Arc<dyn ChangeListener> = Arc::new(move |cs: &ChangeSet| {
            let _ = tx.send(cs.clone());
        });
        (listener, rx)
    }

    fn reconciler(source: Arc<dyn AuthoritativeSource>) -> (Reconciler, mpsc::UnboundedReceiver<ChangeSet>) {
        let (listener, rx) = collecting();
        let r = Reconciler::new(source, Arc::new(EntityCache::new()), listener, PipelineMetrics::global());
        (r, rx)
    }

    fn unit(id: EntityId, revision: u64) -> EntitySnapshot {
        EntitySnapshot::new(id, EntityKind::Unit, revision).with_component("hp", Value::Uint(revision as u128))
    }

    /// Each refresh of an id returns the next revision. Earlier calls sleep
    /// longer, so unserialized refreshes would finish out of order.
    struct Countdown {
        calls: Mutex<HashMap<EntityId, u64>>,
    }

    #[async_trait]
    impl AuthoritativeSource for Countdown {
        async fn refresh_entity(&self, id: EntityId) -> Result<EntitySnapshot, ReconcileError> {
            let revision = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(id).or_insert(0);
                *n += 1;
                *n
            };
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(revision * 10))).await;
            Ok(unit(id, revision))
        }

        async fn current_instance_id(&self) -> Result<u64, ReconcileError> {
            Ok(1)
        }

        async fn refresh_instance_index(&self, instance: u64) -> Result<InstanceIndex, ReconcileError> {
            Err(ReconcileError::IndexNotFound { instance })
        }
    }

    #[tokio::test]
    async fn refreshes_and_notifies() {
        let source = Arc::new(MemorySource::new(1));
        source.put(unit(1, 1));
        source.put(unit(2, 1));
        let (r, mut rx) = reconciler(source);

        assert!(r.schedule("TroopMovement", [1, 2, 2]));
        let changes = rx.recv().await.unwrap();
        assert_eq!(changes.event, "TroopMovement");
        assert_eq!(changes.ids, BTreeSet::from([1, 2]));
        assert_eq!(r.cache().get(2).unwrap().revision, 1);

        r.idle().await;
        assert_eq!(r.stats().refreshed, 2);
    }

    #[tokio::test]
    async fn same_id_keeps_the_later_refresh() {
        let source = Arc::new(Countdown {
            calls: Mutex::new(HashMap::new()),
        });
        let (r, mut rx) = reconciler(source);

        r.schedule("TileAttacked", [7]);
        r.schedule("TileAttacked", [7]);
        r.schedule("TroopMovement", [7, 8]);
        r.idle().await;

        let entry = r.cache().get(7).unwrap();
        assert_eq!(entry.revision, 3);
        assert_eq!(entry.component("hp"), Some(&Value::Uint(3)));

        let mut seen = Vec::new();
        while let Ok(cs) = rx.try_recv() {
            seen.push(cs);
        }
        assert_eq!(seen.len(), 3);
        assert!(r.inner.tails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_leaves_entry_stale_and_skips_notify() {
        let source = Arc::new(MemorySource::new(1));
        source.put(unit(3, 1));
        let (r, mut rx) = reconciler(source.clone());

        r.schedule("NewUnitSpawned", [3]);
        rx.recv().await.unwrap();

        source.remove(3);
        r.schedule("TileAttacked", [3]);
        r.idle().await;

        assert_eq!(r.cache().get(3).unwrap().revision, 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(r.stats().failed, 1);
    }

    #[tokio::test]
    async fn instance_switch_discards_in_flight_writes() {
        let source = Arc::new(Countdown {
            calls: Mutex::new(HashMap::new()),
        });
        let (r, mut rx) = reconciler(source);

        r.schedule("TroopMovement", [1]);
        r.cache().invalidate();
        r.idle().await;

        assert!(r.cache().is_empty());
        assert_eq!(r.stats().stale, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn switch_between_routing_and_scheduling_drops_the_write() {
        let source = Arc::new(MemorySource::new(7));
        source.put(unit(1, 1));
        source.put_index(InstanceIndex::new(7, 100));
        let (listener, mut rx) = collecting();
        let cache = Arc::new(EntityCache::for_instance(7));
        let r = Reconciler::new(source, cache, listener, PipelineMetrics::global());

        // Event routed for instance 7, then the instance changes before it is scheduled
        let routed = r.cache().scope();
        r.cache().switch_instance(8);
        assert!(r.schedule_at(routed.epoch, "TroopMovement", [1], Some(7)));
        r.idle().await;

        assert!(r.cache().is_empty());
        assert!(r.cache().index().is_none());
        assert_eq!(r.stats().stale, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn index_refresh_is_reported() {
        let source = Arc::new(MemorySource::new(7));
        source.put(unit(1, 1));
        let mut index = InstanceIndex::new(7, 100);
        index.units.push(1);
        source.put_index(index);
        let (listener, mut rx) = collecting();
        let r = Reconciler::new(source, Arc::new(EntityCache::for_instance(7)), listener, PipelineMetrics::global());

        let epoch = r.cache().epoch();
        r.schedule_at(epoch, "NewUnitSpawned", [1], Some(7));
        let changes = rx.recv().await.unwrap();
        assert_eq!(changes.ids, BTreeSet::from([1]));
        assert_eq!(changes.index, Some(7));
        assert!(r.cache().index().unwrap().contains(1));
    }

    #[tokio::test]
    async fn cancel_stops_new_work_but_finishes_in_flight() {
        let source = Arc::new(Countdown {
            calls: Mutex::new(HashMap::new()),
        });
        let (r, _rx) = reconciler(source);

        assert!(r.schedule("TroopMovement", [1]));
        r.cancel();
        assert!(!r.schedule("TroopMovement", [2]));
        r.idle().await;

        assert!(r.cache().contains(1));
        assert!(!r.cache().contains(2));
        let stats = r.stats();
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.rejected, 1);
    }
}

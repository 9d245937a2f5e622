//! `Session`: one tracked game instance, from log subscription to cache.
//!
//! ```text
//! LogSource ─▶ Subscription ─▶ LogPipeline ─▶ dispatch ─▶ Reconciler ─▶ EntityCache
//!                                   │             │              │
//!                                   ▼             ▼              ▼
//!                              (metrics)   events broadcast   ChangeSet callback
//!                                                             + changes broadcast
//! ```
//!
//! Several sessions can run side by side; they share nothing but what the
//! caller passes in.

use crate::{
    cache::EntityCache,
    config::SessionConfig,
    dispatcher::{dispatch, Route},
    error::SessionError,
    reconciler::{ChangeListener, ChangeSet, ReconcileStats, Reconciler},
    retry::RetryingSource,
    source::AuthoritativeSource,
};
use logcodec_core::{
    error::LineDecodeError, DecodedEvent, EntityId, EntitySnapshot, InstanceIndex, ReconcileError,
    StreamError,
};
use logcodec_observability::PipelineMetrics;
use logcodec_registry::EventRegistry;
use logcodec_stream::{
    BatchSink, LineOutcome, LogBatch, LogFilter, LogPipeline, LogSource, Subscription, SubscriptionState,
};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Instant,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Counter snapshot for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub batches: u64,
    /// Sequence number of the last batch received
    pub last_seq: Option<u64>,
    pub lines: u64,
    pub lines_ignored: u64,
    pub unmatched: u64,
    pub line_errors: u64,
    pub field_errors: u64,
    pub events_decoded: u64,
    pub other_instance: u64,
    pub unhandled: u64,
    pub malformed: u64,
    pub routed: u64,
    pub stream_closed: bool,
    pub reconcile: ReconcileStats,
}

/// State touched by the subscription task.
struct Shared {
    pipeline: LogPipeline,
    reconciler: Reconciler,
    events_tx: broadcast::Sender<DecodedEvent>,
    metrics: Mutex<SessionMetrics>,
    pipeline_metrics: PipelineMetrics,
}

impl BatchSink for Shared {
    fn on_batch(&self, batch: LogBatch) {
        let started = Instant::now();
        let outcomes = self.pipeline.decode_batch(&batch.logs);

        let mut m = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        m.batches += 1;
        m.last_seq = Some(batch.seq);
        m.lines += batch.logs.len() as u64;

        for outcome in outcomes {
            match outcome {
                LineOutcome::Ignored => m.lines_ignored += 1,
                LineOutcome::Unmatched(_) => {
                    m.unmatched += 1;
                    self.pipeline_metrics.record_rejected("unmatched");
                }
                LineOutcome::LineError(e) => {
                    m.line_errors += 1;
                    self.pipeline_metrics.record_rejected(match e {
                        LineDecodeError::InvalidBase64 { .. } => "invalid_base64",
                        LineDecodeError::TooShort { .. } => "too_short",
                    });
                }
                LineOutcome::FieldError(e) => {
                    m.field_errors += 1;
                    self.pipeline_metrics.record_error(&e.event);
                }
                LineOutcome::Decoded(event) => {
                    m.events_decoded += 1;
                    self.pipeline_metrics.record_decoded(&event.name);
                    // Route and schedule against the same instance switch
                    let scope = self.reconciler.cache().scope();
                    match dispatch(&event, scope.instance) {
                        Route::OtherInstance(_) => m.other_instance += 1,
                        Route::Malformed(_) => m.malformed += 1,
                        Route::Unhandled => {
                            m.unhandled += 1;
                            let _ = self.events_tx.send(event);
                        }
                        Route::Handle(game_event) => {
                            m.routed += 1;
                            let _ = self.events_tx.send(event);
                            self.reconciler.schedule_at(
                                scope.epoch,
                                game_event.name(),
                                game_event.touched_entities(),
                                game_event.index_refresh(),
                            );
                        }
                    }
                }
            }
        }
        drop(m);

        let elapsed = started.elapsed();
        self.pipeline_metrics.record_latency(elapsed.as_secs_f64() * 1_000.0);
        debug!(seq = batch.seq, slot = batch.slot, ?elapsed, "processed log batch");
    }

    fn on_closed(&self, error: Option<StreamError>) {
        match error {
            Some(e) => warn!("log stream closed: {e}"),
            None => info!("log stream closed"),
        }
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stream_closed = true;
    }
}

/// Caller-owned context for tracking one game instance.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
    authority: Arc<dyn AuthoritativeSource>,
    changes_tx: broadcast::Sender<ChangeSet>,
    subscription: Subscription,
    closed: AtomicBool,
}

impl Session {
    /// Resolve the active instance, open the log subscription, and start
    /// reconciling.
    ///
    /// `notify` is called with every non-empty `ChangeSet`. Must be called
    /// inside a Tokio runtime.
    pub async fn open<L: ChangeListener>(
        config: SessionConfig,
        registry: Arc<EventRegistry>,
        log_source: Arc<dyn LogSource>,
        authority: Arc<dyn AuthoritativeSource>,
        notify: L,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if log_source.program_id() != config.program_id {
            return Err(SessionError::ProgramMismatch {
                expected: config.program_id.clone(),
                actual: log_source.program_id().to_string(),
            });
        }

        let authority: Arc<dyn AuthoritativeSource> =
            Arc::new(RetryingSource::new(authority, config.retry.clone()));
        let instance = match config.instance_override {
            Some(id) => id,
            None => authority.current_instance_id().await?,
        };

        let (events_tx, _) = broadcast::channel(config.channel_capacity);
        let (changes_tx, _) = broadcast::channel(config.channel_capacity);

        let changes = changes_tx.clone();
        let listener: Arc<dyn ChangeListener> = Arc::new(move |cs: &ChangeSet| {
            notify.on_change(cs);
            let _ = changes.send(cs.clone());
        });

        let pipeline_metrics = PipelineMetrics::global();
        let reconciler = Reconciler::new(
            Arc::clone(&authority),
            Arc::new(EntityCache::for_instance(instance)),
            listener,
            pipeline_metrics.clone(),
        );
        let pipeline = LogPipeline::with_filter(registry, LogFilter::new(config.log_prefix.clone()));

        let shared = Arc::new(Shared {
            pipeline,
            reconciler,
            events_tx,
            metrics: Mutex::new(SessionMetrics::default()),
            pipeline_metrics,
        });

        let sink: Arc<dyn BatchSink> = shared.clone();
        let subscription = Subscription::open(log_source, config.commitment, sink);
        info!(
            program = %config.program_id,
            instance,
            commitment = %config.commitment,
            "session opened"
        );

        Ok(Self {
            config,
            shared,
            authority,
            changes_tx,
            subscription,
            closed: AtomicBool::new(false),
        })
    }

    /// Decoded events of the active instance, in arrival order.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DecodedEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Change sets, in completion order.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes_tx.subscribe()
    }

    pub fn active_instance(&self) -> u64 {
        self.cache().instance()
    }

    /// Switch to another game instance. The cache is emptied and refreshes
    /// still running for the old instance are discarded.
    pub fn set_active_instance(&self, instance: u64) {
        if let Some(epoch) = self.cache().switch_instance(instance) {
            info!(instance, epoch, "active instance changed");
        }
    }

    /// Ask the authoritative source for the current instance and switch to it.
    pub async fn refresh_active_instance(&self) -> Result<u64, ReconcileError> {
        let instance = self.authority.current_instance_id().await?;
        self.set_active_instance(instance);
        Ok(instance)
    }

    pub fn entity(&self, id: EntityId) -> Option<Arc<EntitySnapshot>> {
        self.shared.reconciler.cache().get(id)
    }

    /// Entity directory of the active instance, once a spawn has refreshed it.
    pub fn instance_index(&self) -> Option<Arc<InstanceIndex>> {
        self.cache().index()
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        self.shared.reconciler.cache()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stream_state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    pub fn watch_stream_state(&self) -> watch::Receiver<SubscriptionState> {
        self.subscription.watch_state()
    }

    pub fn metrics(&self) -> SessionMetrics {
        let mut snapshot = self
            .shared
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.reconcile = self.shared.reconciler.stats();
        snapshot
    }

    /// Wait until every scheduled reconciliation has finished.
    pub async fn idle(&self) {
        self.shared.reconciler.idle().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancel the subscription and stop scheduling reconciliation.
    ///
    /// No batch is processed after this returns. Refreshes already running
    /// may still complete and notify.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscription.cancel().await;
        self.shared.reconciler.cancel();
        info!(in_flight = self.shared.reconciler.in_flight(), "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.reconciler.cancel();
    }
}

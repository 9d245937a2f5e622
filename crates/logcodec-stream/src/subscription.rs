//! Long-lived log subscription with explicit cancellation.
//!
//! One Tokio task drives the source stream and hands each batch to a
//! `BatchSink`. The state is published on a `watch` channel. There is no
//! reconnect: when the source ends, `on_closed` fires once and the
//! subscription is finished.

use crate::listener::{Commitment, LogBatch, LogSource};
use futures::StreamExt;
use logcodec_core::error::StreamError;
use std::sync::{Arc, Mutex};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Active,
    /// Ended by `cancel()`
    Cancelled,
    /// The source stream ended on its own
    Closed,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionState::Cancelled | SubscriptionState::Closed)
    }
}

/// Receives the batches of a subscription, in sequence order.
///
/// Callbacks run on the subscription task and must not block.
pub trait BatchSink: Send + Sync + 'static {
    fn on_batch(&self, batch: LogBatch);

    /// The source stream ended. `error` is the last transport error seen,
    /// if any. Not called after `cancel()`.
    fn on_closed(&self, error: Option<StreamError>);
}

pub struct Subscription {
    state_rx: watch::Receiver<SubscriptionState>,
    cancel_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Spawn the subscription task. Must be called inside a Tokio runtime.
    pub fn open(source: Arc<dyn LogSource>, commitment: Commitment, sink: Arc<dyn BatchSink>) -> Self {
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Connecting);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run(source, commitment, sink, state_tx, cancel_rx));

        Self {
            state_rx,
            cancel_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Stop the subscription and wait for its task to finish.
    ///
    /// Once this returns, the sink receives no further callbacks.
    pub async fn cancel(&self) {
        self.cancel_tx.send_replace(true);
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("subscription task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

// ─── Subscription task ────────────────────────────────────────────────────────

async fn run(
    source: Arc<dyn LogSource>,
    commitment: Commitment,
    sink: Arc<dyn BatchSink>,
    state_tx: watch::Sender<SubscriptionState>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    info!(program = source.program_id(), %commitment, "opening log subscription");

    let subscribed = tokio::select! {
        biased;
        _ = wait_cancelled(&mut cancel_rx) => {
            state_tx.send_replace(SubscriptionState::Cancelled);
            return;
        }
        res = source.subscribe(commitment) => res,
    };

    let mut stream = match subscribed {
        Ok(stream) => stream,
        Err(e) => {
            warn!("log subscription failed: {e}");
            state_tx.send_replace(SubscriptionState::Closed);
            sink.on_closed(Some(e));
            return;
        }
    };
    state_tx.send_replace(SubscriptionState::Active);

    let mut seq = 0u64;
    let mut last_error = None;
    loop {
        tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancel_rx) => {
                info!(batches = seq, "log subscription cancelled");
                state_tx.send_replace(SubscriptionState::Cancelled);
                return;
            }
            item = stream.next() => match item {
                Some(Ok(raw)) => {
                    debug!(seq, slot = raw.slot, lines = raw.logs.len(), "log batch");
                    sink.on_batch(LogBatch::from_raw(seq, raw));
                    seq += 1;
                }
                Some(Err(StreamError::Closed)) | None => break,
                Some(Err(e)) => {
                    warn!("log stream error: {e}");
                    last_error = Some(e);
                }
            }
        }
    }

    info!(batches = seq, "log subscription closed");
    state_tx.send_replace(SubscriptionState::Closed);
    sink.on_closed(last_error);
}

/// Resolves once cancellation is requested or the `Subscription` is gone.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

//! Exponential backoff around an authoritative source.

use crate::source::AuthoritativeSource;
use async_trait::async_trait;
use logcodec_core::{EntityId, EntitySnapshot, InstanceIndex, ReconcileError};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff delay.
    #[serde(default = "default_initial_backoff", rename = "initial_backoff_ms", with = "millis")]
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    #[serde(default = "default_max_backoff", rename = "max_backoff_ms", with = "millis")]
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> Duration { Duration::from_millis(100) }
fn default_max_backoff() -> Duration { Duration::from_secs(10) }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Stateless retry policy. Computes the next delay from the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }
}

/// Retries transient failures of the wrapped source.
///
/// Non-transient errors (`NotFound`) are returned immediately. When the
/// retries run out the last error is wrapped in `RetriesExhausted`.
#[derive(Clone)]
pub struct RetryingSource {
    inner: Arc<dyn AuthoritativeSource>,
    policy: RetryPolicy,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn AuthoritativeSource>, config: RetryConfig) -> Self {
        Self {
            inner,
            policy: RetryPolicy::new(config),
        }
    }
}

#[async_trait]
impl AuthoritativeSource for RetryingSource {
    async fn refresh_entity(&self, id: EntityId) -> Result<EntitySnapshot, ReconcileError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.refresh_entity(id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    match self.policy.next_delay(attempt) {
                        Some(delay) => {
                            debug!(id, attempt, ?delay, error = %e, "retrying entity refresh");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            return Err(ReconcileError::RetriesExhausted {
                                id,
                                attempts: attempt,
                                reason: e.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    async fn current_instance_id(&self) -> Result<u64, ReconcileError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.current_instance_id().await {
                Ok(id) => return Ok(id),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    match self.policy.next_delay(attempt) {
                        Some(delay) => {
                            debug!(attempt, ?delay, error = %e, "retrying instance lookup");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    async fn refresh_instance_index(&self, instance: u64) -> Result<InstanceIndex, ReconcileError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.refresh_instance_index(instance).await {
                Ok(index) => return Ok(index),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    match self.policy.next_delay(attempt) {
                        Some(delay) => {
                            debug!(instance, attempt, ?delay, error = %e, "retrying index refresh");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }
}

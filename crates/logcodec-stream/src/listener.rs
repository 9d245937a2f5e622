//! `LogSource` trait, the abstraction over the log subscription transport.
//!
//! A source produces one `RawLogBatch` per transaction that mentioned the
//! program. The `Subscription` stamps them with sequence numbers.

use async_trait::async_trait;
use futures::Stream;
use logcodec_core::error::StreamError;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A stream of raw log batches from one source.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<RawLogBatch, StreamError>> + Send>>;

/// Confirmation level the source should wait for before delivering logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log lines of one transaction, as delivered by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogBatch {
    /// Transaction signature (base58)
    pub signature: String,
    pub slot: u64,
    pub logs: Vec<String>,
}

/// A `RawLogBatch` with its position in the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBatch {
    /// Strictly increasing within one subscription, starting at 0
    pub seq: u64,
    pub signature: String,
    pub slot: u64,
    pub logs: Vec<String>,
}

impl LogBatch {
    pub fn from_raw(seq: u64, raw: RawLogBatch) -> Self {
        Self {
            seq,
            signature: raw.signature,
            slot: raw.slot,
            logs: raw.logs,
        }
    }
}

/// Abstracts over log transports.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Program whose logs this source delivers (base58).
    fn program_id(&self) -> &str;

    /// Connect and start streaming batches at the given commitment.
    ///
    /// The stream ends after yielding `Err(StreamError::Closed)` or when the
    /// transport goes away. Sources do not reconnect on their own.
    async fn subscribe(&self, commitment: Commitment) -> Result<LogStream, StreamError>;

    /// Returns `true` if the transport is currently connected.
    fn is_connected(&self) -> bool;
}

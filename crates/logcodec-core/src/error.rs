//! Error types for the LogCodec decode and reconcile pipeline.

use crate::entity::EntityId;
use thiserror::Error;

/// Errors raised while building a registry from schema definitions.
/// All of them are fatal: the pipeline does not start without a valid schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Discriminator collision between '{first}' and '{second}'")]
    DuplicateDiscriminator { first: String, second: String },

    #[error("Event '{name}' is defined more than once")]
    DuplicateEvent { name: String },

    #[error("Unknown type '{ty}' in {context}")]
    UnknownType { ty: String, context: String },

    #[error("Type '{name}' refers to itself")]
    RecursiveType { name: String },

    #[error("Invalid type '{ty}': {reason}")]
    InvalidType { ty: String, reason: String },

    #[error("Parse error in schema document: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-line failures. The line is dropped and the stream continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LineDecodeError {
    #[error("Invalid base64 payload: {reason}")]
    InvalidBase64 { reason: String },

    #[error("Payload of {len} bytes is shorter than the 8-byte discriminator")]
    TooShort { len: usize },
}

/// A malformed event. The event is dropped and the stream continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to decode field '{field}' of event '{event}': {reason}")]
pub struct FieldDecodeError {
    pub event: String,
    /// Dotted path to the failing field, e.g. `state.units[2]`
    pub field: String,
    pub reason: String,
}

/// Errors from the entity refresh step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Refresh of entity {id} failed: {reason}")]
    Refresh { id: EntityId, reason: String },

    #[error("Entity {id} not found at the source")]
    NotFound { id: EntityId },

    #[error("Refresh of entity {id} gave up after {attempts} attempts: {reason}")]
    RetriesExhausted {
        id: EntityId,
        attempts: u32,
        reason: String,
    },

    #[error("Instance lookup failed: {0}")]
    Instance(String),

    #[error("Index of instance {instance} not found at the source")]
    IndexNotFound { instance: u64 },
}

impl ReconcileError {
    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Refresh { .. } | Self::Instance(_))
    }
}

/// Errors from the log subscription transport.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Connection failed: {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Stream closed")]
    Closed,

    #[error("Subscription cancelled")]
    Cancelled,

    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

//! Discriminators and decoded event types.

use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Byte length of an event discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// The 8-byte tag prefixed to every encoded event.
///
/// Computed as the first 8 bytes of `SHA-256("event:<EventName>")`, so it is
/// stable across runs and processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Discriminator(pub [u8; DISCRIMINATOR_LEN]);

impl Discriminator {
    /// Compute the discriminator for an event name.
    pub fn for_event(name: &str) -> Self {
        let preimage = format!("event:{name}");
        let hash = Sha256::digest(preimage.as_bytes());
        let mut tag = [0u8; DISCRIMINATOR_LEN];
        tag.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
        Self(tag)
    }

    /// Read the leading tag of a payload. `None` if it is shorter than 8 bytes.
    pub fn from_prefix(payload: &[u8]) -> Option<Self> {
        let head = payload.get(..DISCRIMINATOR_LEN)?;
        let mut tag = [0u8; DISCRIMINATOR_LEN];
        tag.copy_from_slice(head);
        Some(Self(tag))
    }

    pub fn as_bytes(&self) -> &[u8; DISCRIMINATOR_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for Discriminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A fully decoded event, as produced by the field decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Matched event name, e.g. "TroopMovement"
    pub name: String,
    /// Decoded field values in declaration order
    pub fields: IndexMap<String, Value>,
}

impl DecodedEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field insertion, keeps insertion order.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Convenience accessor for unsigned id-like fields.
    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(Value::as_u64)
    }
}

//! # logcodec-core
//!
//! Core types, errors, and the schema-driven field decoder shared across all
//! LogCodec crates. The registry, the log stream pipeline, and the entity
//! reconciler are all built on the primitives defined here.

pub mod decoder;
pub mod encoder;
pub mod entity;
pub mod error;
pub mod event;
pub mod schema;
pub mod types;

pub use decoder::decode_event;
pub use encoder::{encode_event, encode_payload, EncodeError};
pub use entity::{EntityId, EntityKind, EntitySnapshot, InstanceIndex};
pub use error::{FieldDecodeError, LineDecodeError, ReconcileError, SchemaError, StreamError};
pub use event::{DecodedEvent, Discriminator, DISCRIMINATOR_LEN};
pub use schema::{EventSchema, FieldSpec, VariantSpec};
pub use types::{FieldType, Value};

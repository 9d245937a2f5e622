//! # logcodec-registry
//!
//! Schema Registry for LogCodec.
//!
//! Compiles event schema definitions into discriminator ↔ name lookup
//! tables. Schemas can be built in code or loaded once at startup from:
//! 1. **Schema documents**: YAML with a `types:` and an `events:` section
//! 2. **Anchor IDL**: the JSON interface description emitted by Anchor
//!
//! A built registry is immutable; share it behind an `Arc`.

pub mod idl;
pub mod registry;
mod resolve;
pub mod schema_doc;

pub use idl::IdlDocument;
pub use registry::EventRegistry;
pub use schema_doc::SchemaDocument;

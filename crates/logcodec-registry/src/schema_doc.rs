//! YAML schema documents.
//!
//! A document has an optional `types:` section of named structs and enums
//! and an `events:` section mapping each event name to its ordered fields:
//!
//! ```yaml
//! types:
//!   PlayPhase:
//!     enum: [Lobby, Build, Play, Paused, Finished]
//!   Location:
//!     struct: { x: u8, y: u8 }
//! events:
//!   GameStateChanged:
//!     instance: u64
//!     player: u64
//!     new_state: PlayPhase
//! ```
//!
//! Field type strings: `u8`..`u128`, `i8`..`i128`, `bool`, `string`,
//! `pubkey`, `bytesN`, `[u8; N]`, `vec<T>` or `T[]`, `option<T>`, or the
//! name of an entry in `types:`. A file may hold several documents separated
//! by `---`; type names are scoped to their own document.

use crate::resolve::{RawType, RawTypeDef, TypeTable};
use indexmap::IndexMap;
use logcodec_core::{error::SchemaError, EventSchema};
use serde::Deserialize;

// ─── Raw serde types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DocRaw {
    #[serde(default)]
    types: IndexMap<String, TypeDefRaw>,
    // IndexMap keeps YAML insertion order, which is the field order.
    #[serde(default)]
    events: IndexMap<String, Option<IndexMap<String, String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDefRaw {
    #[serde(default, rename = "struct")]
    fields: Option<IndexMap<String, String>>,
    #[serde(default, rename = "enum")]
    variants: Option<Vec<VariantRaw>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VariantRaw {
    Unit(String),
    WithFields(IndexMap<String, IndexMap<String, String>>),
}

// ─── Parser ───────────────────────────────────────────────────────────────────

pub struct SchemaDocument;

impl SchemaDocument {
    /// Parse every document in a YAML string into event schemas, in file order.
    pub fn parse(yaml: &str) -> Result<Vec<EventSchema>, SchemaError> {
        use serde::de::Deserialize as _;

        let mut schemas = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(doc)
                .map_err(|e| SchemaError::Parse(e.to_string()))?;
            // Skip null/empty documents (e.g. trailing `---`)
            if value.is_null() {
                continue;
            }
            let raw: DocRaw =
                serde_yaml::from_value(value).map_err(|e| SchemaError::Parse(e.to_string()))?;
            schemas.extend(Self::compile(raw)?);
        }
        Ok(schemas)
    }

    fn compile(raw: DocRaw) -> Result<Vec<EventSchema>, SchemaError> {
        let mut table = TypeTable::default();
        for (name, def) in raw.types {
            let def = match (def.fields, def.variants) {
                (Some(fields), None) => RawTypeDef::Struct(parse_fields(&fields)?),
                (None, Some(variants)) => {
                    let mut out = Vec::with_capacity(variants.len());
                    for v in variants {
                        out.push(parse_variant(v)?);
                    }
                    RawTypeDef::Enum(out)
                }
                _ => {
                    return Err(SchemaError::Parse(format!(
                        "type '{name}' must have exactly one of 'struct' or 'enum'"
                    )))
                }
            };
            table.insert(name, def)?;
        }

        let mut schemas = Vec::with_capacity(raw.events.len());
        for (name, fields) in raw.events {
            let fields = parse_fields(&fields.unwrap_or_default())?;
            let fields = table.resolve_fields(&fields, &name)?;
            schemas.push(EventSchema::new(name, fields));
        }
        Ok(schemas)
    }
}

fn parse_fields(fields: &IndexMap<String, String>) -> Result<Vec<(String, RawType)>, SchemaError> {
    fields
        .iter()
        .map(|(name, ty)| Ok((name.clone(), parse_type(ty)?)))
        .collect()
}

fn parse_variant(raw: VariantRaw) -> Result<(String, Vec<(String, RawType)>), SchemaError> {
    match raw {
        VariantRaw::Unit(name) => Ok((name, Vec::new())),
        VariantRaw::WithFields(map) => {
            let mut iter = map.into_iter();
            match (iter.next(), iter.next()) {
                (Some((name, fields)), None) => Ok((name, parse_fields(&fields)?)),
                _ => Err(SchemaError::Parse(
                    "enum variant with fields must be a single-key mapping".into(),
                )),
            }
        }
    }
}

/// Parse a type string into a `RawType`.
fn parse_type(s: &str) -> Result<RawType, SchemaError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SchemaError::Parse("empty type string".into()));
    }
    if let Some(inner) = s.strip_suffix("[]") {
        return Ok(RawType::Vec(Box::new(parse_type(inner)?)));
    }
    if let Some(inner) = generic_arg(s, "vec") {
        return Ok(RawType::Vec(Box::new(parse_type(inner)?)));
    }
    if let Some(inner) = generic_arg(s, "option") {
        return Ok(RawType::Option(Box::new(parse_type(inner)?)));
    }
    if let Some(body) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let (elem, len) = body
            .rsplit_once(';')
            .ok_or_else(|| SchemaError::Parse(format!("malformed array type '{s}'")))?;
        let len = len
            .trim()
            .parse::<usize>()
            .map_err(|e| SchemaError::Parse(format!("array length in '{s}': {e}")))?;
        return Ok(RawType::Array(Box::new(parse_type(elem)?), len));
    }
    Ok(RawType::Named(s.to_string()))
}

/// `vec<T>` / `Vec<T>` → `T`
fn generic_arg<'a>(s: &'a str, ctor: &str) -> Option<&'a str> {
    let open = s.find('<')?;
    if !s[..open].eq_ignore_ascii_case(ctor) {
        return None;
    }
    s[open + 1..].strip_suffix('>')
}

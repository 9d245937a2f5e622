//! Anchor IDL loader.
//!
//! Anchor programs publish a JSON IDL describing their instructions,
//! accounts, types, and events. Only `events` and `types` are read here.
//!
//! IDL field names are camelCase (Anchor renames them on export); they are
//! converted back to snake_case so decoded events use the same field names
//! as the program source. Event names are kept verbatim because the
//! discriminator is computed from them.

use crate::resolve::{RawType, RawTypeDef, TypeTable};
use logcodec_core::{error::SchemaError, EventSchema};
use serde::Deserialize;

// ─── Raw IDL serde types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IdlRaw {
    #[serde(default)]
    events: Vec<IdlEvent>,
    #[serde(default)]
    types: Vec<IdlTypeDef>,
}

#[derive(Debug, Deserialize)]
struct IdlEvent {
    name: String,
    #[serde(default)]
    fields: Vec<IdlField>,
}

#[derive(Debug, Deserialize)]
struct IdlField {
    name: String,
    #[serde(rename = "type")]
    ty: IdlType,
}

#[derive(Debug, Deserialize)]
struct IdlTypeDef {
    name: String,
    #[serde(rename = "type")]
    ty: IdlTypeDefBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum IdlTypeDefBody {
    Struct {
        #[serde(default)]
        fields: Vec<IdlField>,
    },
    Enum {
        variants: Vec<IdlVariant>,
    },
}

#[derive(Debug, Deserialize)]
struct IdlVariant {
    name: String,
    #[serde(default)]
    fields: Option<IdlVariantFields>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdlVariantFields {
    Named(Vec<IdlField>),
    Tuple(Vec<IdlType>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdlType {
    Primitive(String),
    Vec { vec: Box<IdlType> },
    Option { option: Box<IdlType> },
    Array { array: (Box<IdlType>, usize) },
    Defined { defined: String },
}

impl IdlType {
    fn into_raw(self) -> RawType {
        match self {
            IdlType::Primitive(name) | IdlType::Defined { defined: name } => RawType::Named(name),
            IdlType::Vec { vec } => RawType::Vec(Box::new(vec.into_raw())),
            IdlType::Option { option } => RawType::Option(Box::new(option.into_raw())),
            IdlType::Array { array: (elem, len) } => RawType::Array(Box::new(elem.into_raw()), len),
        }
    }
}

// ─── Parser ───────────────────────────────────────────────────────────────────

pub struct IdlDocument;

impl IdlDocument {
    /// Parse the events of an Anchor IDL JSON document.
    pub fn parse(json: &str) -> Result<Vec<EventSchema>, SchemaError> {
        let raw: IdlRaw =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse(format!("invalid IDL: {e}")))?;

        let mut table = TypeTable::default();
        for def in raw.types {
            let body = match def.ty {
                IdlTypeDefBody::Struct { fields } => RawTypeDef::Struct(convert_fields(fields)),
                IdlTypeDefBody::Enum { variants } => RawTypeDef::Enum(
                    variants
                        .into_iter()
                        .map(|v| {
                            let fields = match v.fields {
                                None => Vec::new(),
                                Some(IdlVariantFields::Named(fields)) => convert_fields(fields),
                                Some(IdlVariantFields::Tuple(types)) => types
                                    .into_iter()
                                    .enumerate()
                                    .map(|(i, t)| (i.to_string(), t.into_raw()))
                                    .collect(),
                            };
                            (v.name, fields)
                        })
                        .collect(),
                ),
            };
            table.insert(def.name, body)?;
        }

        raw.events
            .into_iter()
            .map(|ev| {
                let fields = table.resolve_fields(&convert_fields(ev.fields), &ev.name)?;
                Ok(EventSchema::new(ev.name, fields))
            })
            .collect()
    }
}

fn convert_fields(fields: Vec<IdlField>) -> Vec<(String, RawType)> {
    fields
        .into_iter()
        .map(|f| (to_snake_case(&f.name), f.ty.into_raw()))
        .collect()
}

/// `defendingTile` → `defending_tile`. Already snake_case names pass through.
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use logcodec_core::FieldType;

    const IDL: &str = r#"{
        "version": "0.1.0",
        "name": "game",
        "instructions": [],
        "types": [
            {
                "name": "PlayPhase",
                "type": {
                    "kind": "enum",
                    "variants": [
                        { "name": "Lobby" }, { "name": "Build" }, { "name": "Play" },
                        { "name": "Paused" }, { "name": "Finished" }
                    ]
                }
            },
            {
                "name": "Reward",
                "type": {
                    "kind": "enum",
                    "variants": [
                        { "name": "Nothing" },
                        { "name": "Gold", "fields": ["u64"] },
                        { "name": "Item", "fields": [{ "name": "itemId", "type": "u64" }] }
                    ]
                }
            }
        ],
        "events": [
            {
                "name": "NewComponentRegistered",
                "fields": [
                    { "name": "component", "type": "publicKey", "index": false },
                    { "name": "schema", "type": "string", "index": false }
                ]
            },
            {
                "name": "TileAttacked",
                "fields": [
                    { "name": "instance", "type": "u64", "index": false },
                    { "name": "attacker", "type": "u64", "index": false },
                    { "name": "defender", "type": "u64", "index": false },
                    { "name": "defendingTile", "type": "u64", "index": false },
                    { "name": "damage", "type": "u64", "index": false }
                ]
            },
            {
                "name": "GameStateChanged",
                "fields": [
                    { "name": "instance", "type": "u64", "index": false },
                    { "name": "player", "type": "u64", "index": false },
                    { "name": "newState", "type": { "defined": "PlayPhase" }, "index": false }
                ]
            },
            {
                "name": "Looted",
                "fields": [
                    { "name": "rewards", "type": { "vec": { "defined": "Reward" } }, "index": false },
                    { "name": "seed", "type": { "array": ["u8", 16] }, "index": false },
                    { "name": "by", "type": { "option": "publicKey" }, "index": false }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_events() {
        let schemas = IdlDocument::parse(IDL).unwrap();
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["NewComponentRegistered", "TileAttacked", "GameStateChanged", "Looted"]);
        assert_eq!(schemas[0].fields[0].ty, FieldType::Pubkey);
        assert_eq!(schemas[0].fields[1].ty, FieldType::Str);
    }

    #[test]
    fn field_names_become_snake_case() {
        let schemas = IdlDocument::parse(IDL).unwrap();
        assert!(schemas[1].field("defending_tile").is_some());
        assert!(schemas[2].field("new_state").is_some());
    }

    #[test]
    fn resolves_defined_and_composite_types() {
        let schemas = IdlDocument::parse(IDL).unwrap();
        let looted = &schemas[3];
        match &looted.field("rewards").unwrap().ty {
            FieldType::Vec(inner) => match inner.as_ref() {
                FieldType::Enum(variants) => {
                    assert_eq!(variants[1].fields[0].name, "0");
                    assert_eq!(variants[2].fields[0].name, "item_id");
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(looted.field("seed").unwrap().ty, FieldType::Bytes(16));
        assert_eq!(
            looted.field("by").unwrap().ty,
            FieldType::Option(Box::new(FieldType::Pubkey))
        );
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("defendingTile"), "defending_tile");
        assert_eq!(to_snake_case("instance"), "instance");
        assert_eq!(to_snake_case("world_instance"), "world_instance");
    }

    #[test]
    fn malformed_idl_is_parse_error() {
        assert!(matches!(IdlDocument::parse("{\"events\": 3}"), Err(SchemaError::Parse(_))));
    }
}

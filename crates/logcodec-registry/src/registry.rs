//! The compiled discriminator ↔ schema table.

use crate::{idl::IdlDocument, schema_doc::SchemaDocument};
use logcodec_core::{error::SchemaError, Discriminator, EventSchema, FieldSpec, FieldType};
use std::{collections::HashMap, path::Path};
use tracing::debug;

/// Immutable lookup table from discriminator to event schema.
///
/// Built once at startup and shared behind an `Arc`; there is no interior
/// mutability, so lookups never block.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    /// Schemas in definition order
    schemas: Vec<EventSchema>,
    tags: Vec<Discriminator>,
    by_tag: HashMap<Discriminator, usize>,
    by_name: HashMap<String, usize>,
}

impl EventRegistry {
    /// Build a registry, deriving each tag with [`Discriminator::for_event`].
    pub fn build(schemas: impl IntoIterator<Item = EventSchema>) -> Result<Self, SchemaError> {
        Self::build_with(schemas, Discriminator::for_event)
    }

    /// Build a registry with a custom tag function.
    ///
    /// Fails if two names are identical or if two names map to the same tag.
    pub fn build_with<F>(
        schemas: impl IntoIterator<Item = EventSchema>,
        tag_fn: F,
    ) -> Result<Self, SchemaError>
    where
        F: Fn(&str) -> Discriminator,
    {
        let mut reg = Self::default();
        for schema in schemas {
            if reg.by_name.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateEvent { name: schema.name });
            }
            validate_fields(&schema.fields, &schema.name)?;

            let tag = tag_fn(&schema.name);
            if let Some(&existing) = reg.by_tag.get(&tag) {
                return Err(SchemaError::DuplicateDiscriminator {
                    first: reg.schemas[existing].name.clone(),
                    second: schema.name,
                });
            }

            debug!(event = %schema.name, tag = %tag, "registered event schema");
            let idx = reg.schemas.len();
            reg.by_tag.insert(tag, idx);
            reg.by_name.insert(schema.name.clone(), idx);
            reg.tags.push(tag);
            reg.schemas.push(schema);
        }
        Ok(reg)
    }

    /// Load every event in a YAML schema document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        Self::build(SchemaDocument::parse(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load every event in an Anchor IDL JSON document.
    pub fn from_idl_str(json: &str) -> Result<Self, SchemaError> {
        Self::build(IdlDocument::parse(json)?)
    }

    pub fn from_idl_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_idl_str(&content)
    }

    /// Tag assigned to a registered event. `None` for unknown names.
    pub fn tag_of(&self, name: &str) -> Option<Discriminator> {
        self.by_name.get(name).map(|&i| self.tags[i])
    }

    /// The canonical discriminator for any event name, registered or not.
    pub fn discriminator_of(name: &str) -> Discriminator {
        Discriminator::for_event(name)
    }

    /// Event name for a tag.
    pub fn lookup(&self, tag: &Discriminator) -> Option<&str> {
        self.by_tag.get(tag).map(|&i| self.schemas[i].name.as_str())
    }

    /// Schema for a tag.
    pub fn schema_for(&self, tag: &Discriminator) -> Option<&EventSchema> {
        self.by_tag.get(tag).map(|&i| &self.schemas[i])
    }

    /// Schema by event name.
    pub fn schema(&self, name: &str) -> Option<&EventSchema> {
        self.by_name.get(name).map(|&i| &self.schemas[i])
    }

    /// Registered names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn validate_fields(fields: &[FieldSpec], context: &str) -> Result<(), SchemaError> {
    for field in fields {
        validate_type(&field.ty, &format!("{context}.{}", field.name))?;
    }
    Ok(())
}

fn validate_type(ty: &FieldType, context: &str) -> Result<(), SchemaError> {
    match ty {
        FieldType::Uint(bits) | FieldType::Int(bits) if !FieldType::is_valid_width(*bits) => {
            Err(SchemaError::InvalidType {
                ty: ty.to_string(),
                reason: format!("unsupported integer width in {context}"),
            })
        }
        FieldType::Vec(inner) if inner.min_encoded_len() == 0 => Err(SchemaError::InvalidType {
            ty: ty.to_string(),
            reason: format!("zero-sized vector element in {context}"),
        }),
        FieldType::Vec(inner) | FieldType::Option(inner) => validate_type(inner, context),
        FieldType::Struct(fields) => validate_fields(fields, context),
        FieldType::Enum(variants) => {
            if variants.len() > 256 {
                return Err(SchemaError::InvalidType {
                    ty: ty.to_string(),
                    reason: format!("more than 256 variants in {context}"),
                });
            }
            for v in variants {
                validate_fields(&v.fields, &format!("{context}::{}", v.name))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> EventSchema {
        EventSchema::new("Ping", vec![FieldSpec::new("value", FieldType::Uint(64))])
    }

    fn game_events() -> Vec<EventSchema> {
        let u64f = |n: &str| FieldSpec::new(n, FieldType::Uint(64));
        vec![
            EventSchema::new("TroopMovement", vec![u64f("instance"), u64f("from"), u64f("to"), u64f("unit")]),
            EventSchema::new("TileAttacked", vec![u64f("instance"), u64f("attacker"), u64f("defender")]),
            ping(),
        ]
    }

    #[test]
    fn build_and_lookup() {
        let reg = EventRegistry::build(game_events()).unwrap();
        assert_eq!(reg.len(), 3);

        let tag = Discriminator::for_event("Ping");
        assert_eq!(reg.lookup(&tag), Some("Ping"));
        assert_eq!(reg.tag_of("Ping"), Some(tag));
        assert_eq!(reg.schema_for(&tag).unwrap().fields[0].name, "value");
        assert!(reg.lookup(&Discriminator([0u8; 8])).is_none());
        assert!(reg.schema("Pong").is_none());
    }

    #[test]
    fn names_keep_definition_order() {
        let reg = EventRegistry::build(game_events()).unwrap();
        let names: Vec<_> = reg.names().collect();
        assert_eq!(names, ["TroopMovement", "TileAttacked", "Ping"]);
    }

    #[test]
    fn discriminator_is_stable() {
        // sha256("event:Ping")[..8]
        let a = EventRegistry::discriminator_of("Ping");
        let b = EventRegistry::discriminator_of("Ping");
        assert_eq!(a, b);
        assert_ne!(a, EventRegistry::discriminator_of("Pong"));
        assert_eq!(a, Discriminator::for_event("Ping"));
    }

    #[test]
    fn colliding_tags_fail() {
        let constant = |_: &str| Discriminator([7u8; 8]);
        let err = EventRegistry::build_with(game_events(), constant).unwrap_err();
        match err {
            SchemaError::DuplicateDiscriminator { first, second } => {
                assert_eq!(first, "TroopMovement");
                assert_eq!(second, "TileAttacked");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_name_fails() {
        let err = EventRegistry::build(vec![ping(), ping()]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateEvent { name } if name == "Ping"));
    }

    #[test]
    fn invalid_width_rejected() {
        let bad = EventSchema::new(
            "Odd",
            vec![FieldSpec::new("list", FieldType::Vec(Box::new(FieldType::Uint(24))))],
        );
        let err = EventRegistry::build(vec![bad]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidType { .. }));
    }

    #[test]
    fn zero_sized_vector_element_rejected() {
        let err = EventRegistry::from_yaml_str("events:\n  Bad:\n    items: vec<bytes0>\n").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidType { reason, .. } if reason.contains("zero-sized")));

        let empty = EventSchema::new(
            "Hollow",
            vec![FieldSpec::new("list", FieldType::Vec(Box::new(FieldType::Struct(vec![]))))],
        );
        assert!(EventRegistry::build(vec![empty]).is_err());
    }

    #[test]
    fn from_yaml() {
        let reg = EventRegistry::from_yaml_str(
            "events:\n  Ping:\n    value: u64\n  TileAttacked:\n    instance: u64\n    damage: u64\n",
        )
        .unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(
            reg.schema("TileAttacked").unwrap().field("damage").unwrap().ty,
            FieldType::Uint(64)
        );
    }

    #[test]
    fn from_missing_file_is_io_error() {
        let err = EventRegistry::from_yaml_file(Path::new("/nonexistent/schema.yaml")).unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)));
    }

    #[test]
    fn empty_registry() {
        let reg = EventRegistry::build(Vec::new()).unwrap();
        assert!(reg.is_empty());
        assert!(reg.lookup(&Discriminator::for_event("Ping")).is_none());
    }
}

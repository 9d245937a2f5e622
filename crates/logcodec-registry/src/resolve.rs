//! Type resolution shared by the YAML and IDL loaders.
//!
//! Both document formats describe types as references to primitives or to
//! named definitions. The loaders translate their syntax into `RawType`, and
//! `TypeTable` turns that into a fully inlined `FieldType`.

use indexmap::IndexMap;
use logcodec_core::{error::SchemaError, FieldSpec, FieldType, VariantSpec};

/// A type reference before named definitions are inlined.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawType {
    /// A primitive (`u64`, `string`, ...) or the name of a definition
    Named(String),
    Vec(Box<RawType>),
    Option(Box<RawType>),
    Array(Box<RawType>, usize),
}

#[derive(Debug, Clone)]
pub(crate) enum RawTypeDef {
    Struct(Vec<(String, RawType)>),
    Enum(Vec<(String, Vec<(String, RawType)>)>),
}

/// Named definitions of one document.
#[derive(Debug, Default)]
pub(crate) struct TypeTable {
    defs: IndexMap<String, RawTypeDef>,
}

impl TypeTable {
    pub(crate) fn insert(&mut self, name: String, def: RawTypeDef) -> Result<(), SchemaError> {
        if self.defs.contains_key(&name) {
            return Err(SchemaError::Parse(format!("type '{name}' is defined more than once")));
        }
        self.defs.insert(name, def);
        Ok(())
    }

    /// Resolve the ordered fields of an event or struct.
    pub(crate) fn resolve_fields(
        &self,
        fields: &[(String, RawType)],
        context: &str,
    ) -> Result<Vec<FieldSpec>, SchemaError> {
        let mut stack = Vec::new();
        self.fields_inner(fields, context, &mut stack)
    }

    fn fields_inner(
        &self,
        fields: &[(String, RawType)],
        context: &str,
        stack: &mut Vec<String>,
    ) -> Result<Vec<FieldSpec>, SchemaError> {
        fields
            .iter()
            .map(|(name, raw)| {
                let ctx = format!("{context}.{name}");
                Ok(FieldSpec::new(name.clone(), self.resolve_inner(raw, &ctx, stack)?))
            })
            .collect()
    }

    fn resolve_inner(
        &self,
        raw: &RawType,
        context: &str,
        stack: &mut Vec<String>,
    ) -> Result<FieldType, SchemaError> {
        match raw {
            RawType::Vec(inner) => Ok(FieldType::Vec(Box::new(self.resolve_inner(inner, context, stack)?))),
            RawType::Option(inner) => {
                Ok(FieldType::Option(Box::new(self.resolve_inner(inner, context, stack)?)))
            }
            RawType::Array(inner, len) => match self.resolve_inner(inner, context, stack)? {
                FieldType::Uint(8) => Ok(FieldType::Bytes(*len)),
                other => Err(SchemaError::InvalidType {
                    ty: format!("[{other}; {len}]"),
                    reason: "fixed-size arrays are only supported for u8".into(),
                }),
            },
            RawType::Named(name) => {
                if let Some(prim) = primitive(name)? {
                    return Ok(prim);
                }
                let def = self.defs.get(name).ok_or_else(|| SchemaError::UnknownType {
                    ty: name.clone(),
                    context: context.to_string(),
                })?;
                if stack.iter().any(|n| n == name) {
                    return Err(SchemaError::RecursiveType { name: name.clone() });
                }
                stack.push(name.clone());
                let resolved = match def {
                    RawTypeDef::Struct(fields) => {
                        FieldType::Struct(self.fields_inner(fields, name, stack)?)
                    }
                    RawTypeDef::Enum(variants) => {
                        if variants.len() > 256 {
                            return Err(SchemaError::InvalidType {
                                ty: name.clone(),
                                reason: "enums are limited to 256 variants".into(),
                            });
                        }
                        let mut out = Vec::with_capacity(variants.len());
                        for (vname, vfields) in variants {
                            let ctx = format!("{name}::{vname}");
                            out.push(VariantSpec::with_fields(
                                vname.clone(),
                                self.fields_inner(vfields, &ctx, stack)?,
                            ));
                        }
                        FieldType::Enum(out)
                    }
                };
                stack.pop();
                Ok(resolved)
            }
        }
    }
}

/// Map a primitive type name to its `FieldType`. `Ok(None)` means "not a primitive".
fn primitive(name: &str) -> Result<Option<FieldType>, SchemaError> {
    let ty = match name {
        "bool" => FieldType::Bool,
        "string" | "String" => FieldType::Str,
        "pubkey" | "publicKey" | "Pubkey" => FieldType::Pubkey,
        "u8" | "u16" | "u32" | "u64" | "u128" => FieldType::Uint(parse_bits(name)?),
        "i8" | "i16" | "i32" | "i64" | "i128" => FieldType::Int(parse_bits(name)?),
        _ if name.starts_with("bytes") && name[5..].parse::<usize>().is_ok() => {
            FieldType::Bytes(name[5..].parse().unwrap_or_default())
        }
        _ => return Ok(None),
    };
    Ok(Some(ty))
}

fn parse_bits(name: &str) -> Result<u16, SchemaError> {
    name[1..].parse::<u16>().map_err(|e| SchemaError::InvalidType {
        ty: name.to_string(),
        reason: e.to_string(),
    })
}

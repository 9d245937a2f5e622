//! Field types and decoded values.
//!
//! `FieldType` is the closed set of layouts an event field can have on the
//! wire. `Value` is the typed result of decoding one field; every `FieldType`
//! variant has exactly one `Value` counterpart.

use crate::schema::{FieldSpec, VariantSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire layout of a single event field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    // --- Integer types ---
    /// Unsigned little-endian integer (u8 .. u128). Width in bits.
    Uint(u16),
    /// Signed little-endian integer (i8 .. i128). Width in bits.
    Int(u16),
    /// One byte, `0` or `1`
    Bool,

    // --- Byte types ---
    /// u32 length prefix followed by UTF-8 bytes
    Str,
    /// Fixed-size byte array. Length in bytes.
    Bytes(usize),
    /// 32-byte public key, rendered base58
    Pubkey,

    // --- Composite types ---
    /// u32 length prefix followed by that many elements
    Vec(Box<FieldType>),
    /// One presence byte, then the value when present
    Option(Box<FieldType>),
    /// Fields laid out back to back in declaration order
    Struct(Vec<FieldSpec>),
    /// One selector byte, then the selected variant's fields
    Enum(Vec<VariantSpec>),
}

impl FieldType {
    /// Byte width of an integer type, `None` for everything else.
    pub fn int_width(&self) -> Option<usize> {
        match self {
            FieldType::Uint(bits) | FieldType::Int(bits) => Some(*bits as usize / 8),
            _ => None,
        }
    }

    /// Whether `bits` is one of the supported integer widths.
    pub fn is_valid_width(bits: u16) -> bool {
        matches!(bits, 8 | 16 | 32 | 64 | 128)
    }

    /// Fewest bytes any value of this type encodes to.
    pub fn min_encoded_len(&self) -> usize {
        match self {
            FieldType::Uint(bits) | FieldType::Int(bits) => *bits as usize / 8,
            FieldType::Bool | FieldType::Option(_) => 1,
            FieldType::Str | FieldType::Vec(_) => 4,
            FieldType::Bytes(n) => *n,
            FieldType::Pubkey => 32,
            FieldType::Struct(fields) => fields
                .iter()
                .fold(0usize, |acc, f| acc.saturating_add(f.ty.min_encoded_len())),
            FieldType::Enum(variants) => variants
                .iter()
                .map(|v| {
                    v.fields
                        .iter()
                        .fold(0usize, |acc, f| acc.saturating_add(f.ty.min_encoded_len()))
                })
                .min()
                .unwrap_or(0)
                .saturating_add(1),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Uint(bits) => write!(f, "u{bits}"),
            FieldType::Int(bits) => write!(f, "i{bits}"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Str => write!(f, "string"),
            FieldType::Bytes(n) => write!(f, "bytes{n}"),
            FieldType::Pubkey => write!(f, "pubkey"),
            FieldType::Vec(elem) => write!(f, "vec<{elem}>"),
            FieldType::Option(inner) => write!(f, "option<{inner}>"),
            FieldType::Struct(fields) => write!(f, "struct({} fields)", fields.len()),
            FieldType::Enum(variants) => write!(f, "enum({} variants)", variants.len()),
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Uint(u128),
    Int(i128),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Pubkey([u8; 32]),
    Option(Option<Box<Value>>),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Enum {
        variant: String,
        index: u8,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Coerce to a u64 if this is an unsigned integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Coerce to a u128 if this is an unsigned integer.
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_pubkey(&self) -> Option<&[u8; 32]> {
        match self {
            Value::Pubkey(k) => Some(k),
            _ => None,
        }
    }

    /// Returns the variant name if this is an enum value.
    pub fn as_variant(&self) -> Option<&str> {
        match self {
            Value::Enum { variant, .. } => Some(variant.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Pubkey(k) => write!(f, "{}", bs58::encode(k).into_string()),
            Value::Option(None) => write!(f, "none"),
            Value::Option(Some(v)) => write!(f, "some({v})"),
            Value::Array(items) => {
                let parts: Vec<_> = items.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Struct(fields) => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Enum { variant, fields, .. } if fields.is_empty() => write!(f, "{variant}"),
            Value::Enum { variant, fields, .. } => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{variant} {{{}}}", parts.join(", "))
            }
        }
    }
}

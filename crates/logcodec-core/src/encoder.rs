//! Event encoder, the inverse of the field decoder.
//!
//! The pipeline itself only ever decodes. The encoder exists so tests, mock
//! log sources, and fixtures can produce wire payloads from a schema.
//!
//! # Usage
//! ```
//! use logcodec_core::{encoder, DecodedEvent, EventSchema, FieldSpec, FieldType, Value};
//!
//! let schema = EventSchema::new("Ping", vec![FieldSpec::new("value", FieldType::Uint(64))]);
//! let event = DecodedEvent::new("Ping").with_field("value", Value::Uint(42));
//! let payload = encoder::encode_payload(&schema, &event).unwrap();
//! assert_eq!(payload.len(), 16);
//! ```

use crate::event::{DecodedEvent, Discriminator};
use crate::schema::{EventSchema, FieldSpec};
use crate::types::{FieldType, Value};
use thiserror::Error;

/// A value that does not fit the schema it is being encoded against.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot encode field '{field}': {reason}")]
pub struct EncodeError {
    pub field: String,
    pub reason: String,
}

impl EncodeError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Encode a full wire payload: `discriminator ++ body`.
pub fn encode_payload(schema: &EventSchema, event: &DecodedEvent) -> Result<Vec<u8>, EncodeError> {
    let mut out = Discriminator::for_event(&schema.name).as_bytes().to_vec();
    out.extend(encode_event(schema, event)?);
    Ok(out)
}

/// Encode only the event body (no discriminator).
pub fn encode_event(schema: &EventSchema, event: &DecodedEvent) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for field in &schema.fields {
        let value = event
            .field(&field.name)
            .ok_or_else(|| EncodeError::new(&field.name, "missing value"))?;
        encode_value(&mut out, &field.ty, value, &field.name)?;
    }
    Ok(out)
}

fn encode_value(out: &mut Vec<u8>, ty: &FieldType, value: &Value, path: &str) -> Result<(), EncodeError> {
    match (ty, value) {
        (FieldType::Uint(bits), Value::Uint(v)) => {
            let width = checked_width(*bits, path)?;
            if width < 16 && (*v >> (width * 8)) != 0 {
                return Err(EncodeError::new(path, format!("{v} does not fit in u{bits}")));
            }
            out.extend_from_slice(&v.to_le_bytes()[..width]);
        }

        (FieldType::Int(bits), Value::Int(v)) => {
            let width = checked_width(*bits, path)?;
            let shift = 128 - (width as u32 * 8);
            if (v << shift) >> shift != *v {
                return Err(EncodeError::new(path, format!("{v} does not fit in i{bits}")));
            }
            out.extend_from_slice(&v.to_le_bytes()[..width]);
        }

        (FieldType::Bool, Value::Bool(b)) => out.push(u8::from(*b)),

        (FieldType::Str, Value::Str(s)) => {
            write_len(out, s.len(), path)?;
            out.extend_from_slice(s.as_bytes());
        }

        (FieldType::Bytes(n), Value::Bytes(b)) => {
            if b.len() != *n {
                return Err(EncodeError::new(path, format!("expected {n} bytes, got {}", b.len())));
            }
            out.extend_from_slice(b);
        }

        (FieldType::Pubkey, Value::Pubkey(k)) => out.extend_from_slice(k),

        (FieldType::Vec(elem), Value::Array(items)) => {
            write_len(out, items.len(), path)?;
            for (i, item) in items.iter().enumerate() {
                encode_value(out, elem, item, &format!("{path}[{i}]"))?;
            }
        }

        (FieldType::Option(_), Value::Option(None)) => out.push(0),
        (FieldType::Option(inner), Value::Option(Some(v))) => {
            out.push(1);
            encode_value(out, inner, v, path)?;
        }

        (FieldType::Struct(specs), Value::Struct(values)) => {
            encode_fields(out, specs, values, path)?;
        }

        (FieldType::Enum(variants), Value::Enum { variant, fields, .. }) => {
            let (selector, spec) = variants
                .iter()
                .enumerate()
                .find(|(_, v)| &v.name == variant)
                .ok_or_else(|| EncodeError::new(path, format!("unknown variant '{variant}'")))?;
            out.push(selector as u8);
            encode_fields(out, &spec.fields, fields, &format!("{path}::{variant}"))?;
        }

        (ty, value) => {
            return Err(EncodeError::new(path, format!("value {value} does not match type {ty}")));
        }
    }
    Ok(())
}

fn encode_fields(
    out: &mut Vec<u8>,
    specs: &[FieldSpec],
    values: &[(String, Value)],
    path: &str,
) -> Result<(), EncodeError> {
    for spec in specs {
        let child = format!("{path}.{}", spec.name);
        let value = values
            .iter()
            .find(|(name, _)| name == &spec.name)
            .map(|(_, v)| v)
            .ok_or_else(|| EncodeError::new(&child, "missing value"))?;
        encode_value(out, &spec.ty, value, &child)?;
    }
    Ok(())
}

fn checked_width(bits: u16, path: &str) -> Result<usize, EncodeError> {
    if FieldType::is_valid_width(bits) {
        Ok(bits as usize / 8)
    } else {
        Err(EncodeError::new(path, format!("unsupported integer width {bits}")))
    }
}

fn write_len(out: &mut Vec<u8>, len: usize, path: &str) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::new(path, "length exceeds u32"))?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

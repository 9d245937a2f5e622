//! Schema-driven field decoder.
//!
//! A small interpreter over the closed `FieldType` set. Fields are read
//! strictly in declaration order with a cursor that only moves forward.
//! Layout follows Borsh: little-endian fixed-width integers, u32 length
//! prefixes for strings and vectors, a one-byte selector for enums and a
//! one-byte presence tag for options.

use crate::error::FieldDecodeError;
use crate::event::DecodedEvent;
use crate::schema::{EventSchema, FieldSpec};
use crate::types::{FieldType, Value};
use tracing::debug;

/// Decode an event body (the bytes following the discriminator).
pub fn decode_event(schema: &EventSchema, data: &[u8]) -> Result<DecodedEvent, FieldDecodeError> {
    let mut cursor = Cursor::new(data);
    let mut event = DecodedEvent::new(schema.name.clone());

    for field in &schema.fields {
        let value = decode_value(&mut cursor, &field.ty, &field.name).map_err(|f| {
            FieldDecodeError {
                event: schema.name.clone(),
                field: f.path,
                reason: f.reason,
            }
        })?;
        event.fields.insert(field.name.clone(), value);
    }

    if cursor.remaining() > 0 {
        debug!(
            event = %schema.name,
            trailing = cursor.remaining(),
            "ignoring trailing bytes after last field"
        );
    }

    Ok(event)
}

/// Where decoding stopped and why.
#[derive(Debug)]
struct Failure {
    path: String,
    reason: String,
}

impl Failure {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, path: &str) -> Result<&'a [u8], Failure> {
        if self.remaining() < n {
            return Err(Failure::new(
                path,
                format!(
                    "buffer exhausted: need {n} bytes at offset {}, {} remaining",
                    self.pos,
                    self.remaining()
                ),
            ));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self, path: &str) -> Result<u8, Failure> {
        Ok(self.take(1, path)?[0])
    }

    fn len_prefix(&mut self, path: &str) -> Result<usize, Failure> {
        let raw = self.take(4, path)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(len as usize)
    }
}

fn decode_value(cursor: &mut Cursor<'_>, ty: &FieldType, path: &str) -> Result<Value, Failure> {
    match ty {
        FieldType::Uint(bits) => {
            let raw = read_int(cursor, *bits, path)?;
            Ok(Value::Uint(u128::from_le_bytes(raw.padded(0x00))))
        }

        FieldType::Int(bits) => {
            let raw = read_int(cursor, *bits, path)?;
            let fill = if raw.is_negative() { 0xff } else { 0x00 };
            Ok(Value::Int(i128::from_le_bytes(raw.padded(fill))))
        }

        FieldType::Bool => match cursor.byte(path)? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(Failure::new(path, format!("invalid bool byte {other}"))),
        },

        FieldType::Str => {
            let len = cursor.len_prefix(path)?;
            let bytes = cursor.take(len, path)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| Failure::new(path, format!("invalid UTF-8: {e}")))?;
            Ok(Value::Str(s.to_string()))
        }

        FieldType::Bytes(n) => Ok(Value::Bytes(cursor.take(*n, path)?.to_vec())),

        FieldType::Pubkey => {
            let mut key = [0u8; 32];
            key.copy_from_slice(cursor.take(32, path)?);
            Ok(Value::Pubkey(key))
        }

        FieldType::Vec(elem) => {
            let len = cursor.len_prefix(path)?;
            // The prefix is untrusted; it must fit in what is left of the buffer.
            let min = elem.min_encoded_len();
            if min == 0 && len > 0 {
                return Err(Failure::new(path, format!("{len} elements of zero-sized type {elem}")));
            }
            if min > 0 && len > cursor.remaining() / min {
                return Err(Failure::new(
                    path,
                    format!(
                        "length prefix {len} needs at least {} bytes, {} remaining",
                        len.saturating_mul(min),
                        cursor.remaining()
                    ),
                ));
            }
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                items.push(decode_value(cursor, elem, &format!("{path}[{i}]"))?);
            }
            Ok(Value::Array(items))
        }

        FieldType::Option(inner) => match cursor.byte(path)? {
            0 => Ok(Value::Option(None)),
            1 => Ok(Value::Option(Some(Box::new(decode_value(cursor, inner, path)?)))),
            other => Err(Failure::new(path, format!("invalid option tag {other}"))),
        },

        FieldType::Struct(fields) => Ok(Value::Struct(decode_fields(cursor, fields, path)?)),

        FieldType::Enum(variants) => {
            let selector = cursor.byte(path)?;
            let variant = variants.get(selector as usize).ok_or_else(|| {
                Failure::new(
                    path,
                    format!(
                        "enum selector {selector} out of range ({} variants)",
                        variants.len()
                    ),
                )
            })?;
            let fields = decode_fields(cursor, &variant.fields, &format!("{path}::{}", variant.name))?;
            Ok(Value::Enum {
                variant: variant.name.clone(),
                index: selector,
                fields,
            })
        }
    }
}

fn decode_fields(
    cursor: &mut Cursor<'_>,
    fields: &[FieldSpec],
    path: &str,
) -> Result<Vec<(String, Value)>, Failure> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let child = format!("{path}.{}", field.name);
        out.push((field.name.clone(), decode_value(cursor, &field.ty, &child)?));
    }
    Ok(out)
}

/// Little-endian integer bytes of a supported width.
struct IntBytes<'a>(&'a [u8]);

impl IntBytes<'_> {
    fn is_negative(&self) -> bool {
        self.0.last().map(|b| b & 0x80 != 0).unwrap_or(false)
    }

    fn padded(&self, fill: u8) -> [u8; 16] {
        let mut out = [fill; 16];
        out[..self.0.len()].copy_from_slice(self.0);
        out
    }
}

fn read_int<'a>(cursor: &mut Cursor<'a>, bits: u16, path: &str) -> Result<IntBytes<'a>, Failure> {
    if !FieldType::is_valid_width(bits) {
        return Err(Failure::new(path, format!("unsupported integer width {bits}")));
    }
    Ok(IntBytes(cursor.take(bits as usize / 8, path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VariantSpec;
    use borsh::BorshSerialize;

    #[derive(BorshSerialize)]
    enum PlayPhase {
        #[allow(dead_code)]
        Lobby,
        Build,
        Play,
        #[allow(dead_code)]
        Paused,
        #[allow(dead_code)]
        Finished,
    }

    #[derive(BorshSerialize)]
    struct GameStateChanged {
        instance: u64,
        player: u64,
        new_state: PlayPhase,
    }

    #[derive(BorshSerialize)]
    struct Roster {
        title: String,
        delta: i16,
        units: Vec<u64>,
        feature: Option<u64>,
        active: bool,
        owner: [u8; 32],
    }

    fn play_phase() -> FieldType {
        FieldType::Enum(
            ["Lobby", "Build", "Play", "Paused", "Finished"]
                .into_iter()
                .map(VariantSpec::unit)
                .collect(),
        )
    }

    fn game_state_schema() -> EventSchema {
        EventSchema::new(
            "GameStateChanged",
            vec![
                FieldSpec::new("instance", FieldType::Uint(64)),
                FieldSpec::new("player", FieldType::Uint(64)),
                FieldSpec::new("new_state", play_phase()),
            ],
        )
    }

    fn roster_schema() -> EventSchema {
        EventSchema::new(
            "Roster",
            vec![
                FieldSpec::new("title", FieldType::Str),
                FieldSpec::new("delta", FieldType::Int(16)),
                FieldSpec::new("units", FieldType::Vec(Box::new(FieldType::Uint(64)))),
                FieldSpec::new("feature", FieldType::Option(Box::new(FieldType::Uint(64)))),
                FieldSpec::new("active", FieldType::Bool),
                FieldSpec::new("owner", FieldType::Pubkey),
            ],
        )
    }

    #[test]
    fn decodes_ping() {
        let schema = EventSchema::new("Ping", vec![FieldSpec::new("value", FieldType::Uint(64))]);
        let ev = decode_event(&schema, &42u64.to_le_bytes()).unwrap();
        assert_eq!(ev.name, "Ping");
        assert_eq!(ev.field("value"), Some(&Value::Uint(42)));
    }

    #[test]
    fn decodes_borsh_enum_payload() {
        let payload = borsh::to_vec(&GameStateChanged {
            instance: 7,
            player: 900,
            new_state: PlayPhase::Build,
        })
        .unwrap();
        let ev = decode_event(&game_state_schema(), &payload).unwrap();
        assert_eq!(ev.u64_field("instance"), Some(7));
        assert_eq!(ev.u64_field("player"), Some(900));
        assert_eq!(ev.field("new_state").unwrap().as_variant(), Some("Build"));
    }

    #[test]
    fn decodes_mixed_borsh_payload() {
        let payload = borsh::to_vec(&Roster {
            title: "vanguard".into(),
            delta: -300,
            units: vec![11, 12, 13],
            feature: Some(5),
            active: true,
            owner: [9u8; 32],
        })
        .unwrap();
        let ev = decode_event(&roster_schema(), &payload).unwrap();
        assert_eq!(ev.field("title").unwrap().as_str(), Some("vanguard"));
        assert_eq!(ev.field("delta"), Some(&Value::Int(-300)));
        assert_eq!(
            ev.field("units"),
            Some(&Value::Array(vec![Value::Uint(11), Value::Uint(12), Value::Uint(13)]))
        );
        assert_eq!(
            ev.field("feature"),
            Some(&Value::Option(Some(Box::new(Value::Uint(5)))))
        );
        assert_eq!(ev.field("active"), Some(&Value::Bool(true)));
        assert_eq!(ev.field("owner"), Some(&Value::Pubkey([9u8; 32])));
    }

    #[test]
    fn decode_is_deterministic() {
        let payload = borsh::to_vec(&GameStateChanged {
            instance: 1,
            player: 2,
            new_state: PlayPhase::Play,
        })
        .unwrap();
        let a = decode_event(&game_state_schema(), &payload).unwrap();
        let b = decode_event(&game_state_schema(), &payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn truncated_buffer_names_field() {
        let mut payload = 7u64.to_le_bytes().to_vec();
        payload.extend_from_slice(&[1, 2, 3]);
        let err = decode_event(&game_state_schema(), &payload).unwrap_err();
        assert_eq!(err.event, "GameStateChanged");
        assert_eq!(err.field, "player");
        assert!(err.reason.contains("buffer exhausted"));
    }

    #[test]
    fn enum_selector_out_of_range() {
        let mut payload = 7u64.to_le_bytes().to_vec();
        payload.extend_from_slice(&8u64.to_le_bytes());
        payload.push(5);
        let err = decode_event(&game_state_schema(), &payload).unwrap_err();
        assert_eq!(err.field, "new_state");
        assert!(err.reason.contains("out of range"));
    }

    #[test]
    fn nested_failure_reports_path() {
        let schema = EventSchema::new(
            "Nested",
            vec![FieldSpec::new(
                "units",
                FieldType::Vec(Box::new(FieldType::Struct(vec![
                    FieldSpec::new("id", FieldType::Uint(64)),
                    FieldSpec::new("hp", FieldType::Uint(16)),
                ]))),
            )],
        );
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u64.to_le_bytes());
        payload.extend_from_slice(&10u16.to_le_bytes());
        payload.extend_from_slice(&2u64.to_le_bytes());
        let err = decode_event(&schema, &payload).unwrap_err();
        assert_eq!(err.field, "units[1].hp");
    }

    #[test]
    fn oversized_length_prefix_fails_cleanly() {
        let schema = EventSchema::new(
            "Huge",
            vec![FieldSpec::new("ids", FieldType::Vec(Box::new(FieldType::Uint(64))))],
        );
        let payload = u32::MAX.to_le_bytes();
        let err = decode_event(&schema, &payload).unwrap_err();
        assert_eq!(err.field, "ids");
        assert!(err.reason.contains("length prefix"));

        // Two elements announced, one present
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&9u64.to_le_bytes());
        assert_eq!(decode_event(&schema, &payload).unwrap_err().field, "ids");
    }

    #[test]
    fn zero_sized_elements_do_not_loop() {
        let schema = EventSchema::new(
            "Empty",
            vec![FieldSpec::new("items", FieldType::Vec(Box::new(FieldType::Bytes(0))))],
        );
        let err = decode_event(&schema, &20_000_000u32.to_le_bytes()).unwrap_err();
        assert_eq!(err.field, "items");
        assert!(err.reason.contains("zero-sized"));

        let event = decode_event(&schema, &0u32.to_le_bytes()).unwrap();
        assert_eq!(event.field("items"), Some(&Value::Array(vec![])));
    }

    #[test]
    fn invalid_bool_and_utf8_rejected() {
        let schema = EventSchema::new("Flag", vec![FieldSpec::new("on", FieldType::Bool)]);
        assert!(decode_event(&schema, &[2]).is_err());

        let schema = EventSchema::new("Name", vec![FieldSpec::new("name", FieldType::Str)]);
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0xff, 0xfe]);
        let err = decode_event(&schema, &payload).unwrap_err();
        assert!(err.reason.contains("UTF-8"));
    }

    #[test]
    fn signed_widths_sign_extend() {
        let schema = EventSchema::new(
            "Signed",
            vec![
                FieldSpec::new("a", FieldType::Int(8)),
                FieldSpec::new("b", FieldType::Int(64)),
                FieldSpec::new("c", FieldType::Int(128)),
            ],
        );
        let mut payload = vec![0x80u8];
        payload.extend_from_slice(&(-2i64).to_le_bytes());
        payload.extend_from_slice(&i128::MIN.to_le_bytes());
        let ev = decode_event(&schema, &payload).unwrap();
        assert_eq!(ev.field("a"), Some(&Value::Int(-128)));
        assert_eq!(ev.field("b"), Some(&Value::Int(-2)));
        assert_eq!(ev.field("c"), Some(&Value::Int(i128::MIN)));
    }

    #[test]
    fn trailing_bytes_tolerated() {
        let schema = EventSchema::new("Ping", vec![FieldSpec::new("value", FieldType::Uint(8))]);
        let ev = decode_event(&schema, &[3, 0xaa, 0xbb]).unwrap();
        assert_eq!(ev.field("value"), Some(&Value::Uint(3)));
    }
}

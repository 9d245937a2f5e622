//! Selects emitted-data lines from a raw program log and decodes their payload.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use logcodec_core::{error::LineDecodeError, DISCRIMINATOR_LEN};

/// Prefix the runtime puts in front of data emitted with `emit!`.
pub const DEFAULT_LOG_PREFIX: &str = "Program data: ";

#[derive(Debug, Clone)]
pub struct LogFilter {
    prefix: String,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_PREFIX)
    }
}

impl LogFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The base64 text after the prefix, or `None` for ordinary log text.
    pub fn payload_text<'a>(&self, line: &'a str) -> Option<&'a str> {
        line.strip_prefix(self.prefix.as_str())
    }

    /// Decode the payload of a prefixed line.
    ///
    /// `None` means the line is not emitted data and must be ignored without
    /// an error. A payload that decodes to fewer bytes than a discriminator
    /// is rejected here so later stages can always split off the tag.
    pub fn decode(&self, line: &str) -> Option<Result<Vec<u8>, LineDecodeError>> {
        let text = self.payload_text(line)?;
        Some(decode_payload(text))
    }
}

fn decode_payload(text: &str) -> Result<Vec<u8>, LineDecodeError> {
    let bytes = STANDARD
        .decode(text.trim_end())
        .map_err(|e| LineDecodeError::InvalidBase64 {
            reason: e.to_string(),
        })?;
    if bytes.len() < DISCRIMINATOR_LEN {
        return Err(LineDecodeError::TooShort { len: bytes.len() });
    }
    Ok(bytes)
}

//! Discriminator matching and field decoding for filtered log lines.

use crate::filter::LogFilter;
use logcodec_core::{
    decode_event,
    error::{FieldDecodeError, LineDecodeError},
    DecodedEvent, Discriminator, DISCRIMINATOR_LEN,
};
use logcodec_registry::EventRegistry;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{trace, warn};

/// Batches at least this long are decoded on the rayon pool.
const PARALLEL_THRESHOLD: usize = 64;

/// What became of one log line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Not emitted data
    Ignored,
    /// Emitted data whose tag is not in the registry
    Unmatched(Discriminator),
    Decoded(DecodedEvent),
    LineError(LineDecodeError),
    FieldError(FieldDecodeError),
}

impl LineOutcome {
    pub fn into_event(self) -> Option<DecodedEvent> {
        match self {
            LineOutcome::Decoded(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LineOutcome::LineError(_) | LineOutcome::FieldError(_))
    }
}

/// Stateless line decoder: filter, match, decode.
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct LogPipeline {
    registry: Arc<EventRegistry>,
    filter: LogFilter,
}

impl LogPipeline {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self::with_filter(registry, LogFilter::default())
    }

    pub fn with_filter(registry: Arc<EventRegistry>, filter: LogFilter) -> Self {
        Self { registry, filter }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Decode a single log line.
    pub fn decode_line(&self, line: &str) -> LineOutcome {
        let payload = match self.filter.decode(line) {
            None => return LineOutcome::Ignored,
            Some(Err(e)) => {
                warn!(error = %e, "dropping program data line");
                return LineOutcome::LineError(e);
            }
            Some(Ok(bytes)) => bytes,
        };
        self.decode_payload(&payload)
    }

    /// Decode an already base64-decoded payload (discriminator ++ body).
    pub fn decode_payload(&self, payload: &[u8]) -> LineOutcome {
        let Some(tag) = Discriminator::from_prefix(payload) else {
            return LineOutcome::LineError(LineDecodeError::TooShort { len: payload.len() });
        };
        let Some(schema) = self.registry.schema_for(&tag) else {
            trace!(tag = %tag, "no schema for discriminator");
            return LineOutcome::Unmatched(tag);
        };
        match decode_event(schema, &payload[DISCRIMINATOR_LEN..]) {
            Ok(event) => LineOutcome::Decoded(event),
            Err(e) => {
                warn!(error = %e, "dropping malformed event");
                LineOutcome::FieldError(e)
            }
        }
    }

    /// Decode an event body (no discriminator) by event name.
    ///
    /// `None` if the name is not registered.
    pub fn decode_named(&self, name: &str, body: &[u8]) -> Option<Result<DecodedEvent, FieldDecodeError>> {
        let schema = self.registry.schema(name)?;
        Some(decode_event(schema, body))
    }

    /// Decode a batch of lines. Outcomes are returned in input order.
    pub fn decode_batch<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Vec<LineOutcome> {
        if lines.len() >= PARALLEL_THRESHOLD {
            lines.par_iter().map(|l| self.decode_line(l.as_ref())).collect()
        } else {
            lines.iter().map(|l| self.decode_line(l.as_ref())).collect()
        }
    }

    /// Decoded events of a batch, in input order. Errors are logged and dropped.
    pub fn decode_events<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Vec<DecodedEvent> {
        self.decode_batch(lines)
            .into_iter()
            .filter_map(LineOutcome::into_event)
            .collect()
    }
}

//! LogCodec metrics definitions.
//!
//! All metrics use OpenTelemetry conventions. Install a meter provider in the
//! host application to export them; otherwise recording is a no-op.

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Metrics handle for the decode and reconcile pipeline.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub events_decoded: Counter<u64>,
    pub lines_rejected: Counter<u64>,
    pub decode_errors: Counter<u64>,
    pub refreshes: Counter<u64>,
    pub refresh_failures: Counter<u64>,
    pub decode_latency_ms: Histogram<f64>,
}

impl PipelineMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events_decoded: meter
                .u64_counter("logcodec.events_decoded")
                .with_description("Events decoded from program data lines")
                .init(),
            lines_rejected: meter
                .u64_counter("logcodec.lines_rejected")
                .with_description("Program data lines dropped before field decoding")
                .init(),
            decode_errors: meter
                .u64_counter("logcodec.decode_errors")
                .with_description("Events whose fields failed to decode")
                .init(),
            refreshes: meter
                .u64_counter("logcodec.refreshes")
                .with_description("Entity refreshes written to the cache")
                .init(),
            refresh_failures: meter
                .u64_counter("logcodec.refresh_failures")
                .with_description("Entity refreshes that gave up, leaving the entry stale")
                .init(),
            decode_latency_ms: meter
                .f64_histogram("logcodec.decode_latency_ms")
                .with_description("Time to decode one log batch in milliseconds")
                .init(),
        }
    }

    /// Instruments on the global meter provider.
    pub fn global() -> Self {
        Self::new(&global::meter("logcodec"))
    }

    pub fn record_decoded(&self, event: &str) {
        self.events_decoded
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }

    /// `reason` is a short static label such as `"invalid_base64"`.
    pub fn record_rejected(&self, reason: &'static str) {
        self.lines_rejected.add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_error(&self, event: &str) {
        self.decode_errors
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }

    pub fn record_refresh(&self) {
        self.refreshes.add(1, &[]);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.add(1, &[]);
    }

    pub fn record_latency(&self, ms: f64) {
        self.decode_latency_ms.record(ms, &[]);
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_provider() {
        let metrics = PipelineMetrics::global();
        metrics.record_decoded("Ping");
        metrics.record_rejected("invalid_base64");
        metrics.record_error("Ping");
        metrics.record_refresh();
        metrics.record_refresh_failure();
        metrics.record_latency(0.25);
    }
}

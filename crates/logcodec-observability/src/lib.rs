//! # logcodec-observability
//!
//! OpenTelemetry-based observability for LogCodec.
//!
//! ## Built-in metrics
//! - `logcodec.events_decoded`: counter, tagged with event name
//! - `logcodec.lines_rejected`: counter, tagged with reason
//! - `logcodec.decode_errors`: counter, tagged with event name
//! - `logcodec.refreshes`: counter of completed entity refreshes
//! - `logcodec.refresh_failures`: counter of refreshes that gave up
//! - `logcodec.decode_latency_ms`: histogram, per log batch
//!
//! Without a meter provider installed the instruments are no-ops.
//!
//! ## Structured logging
//! Text or JSON logs through `tracing-subscriber`, with the level
//! configurable per component.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::PipelineMetrics;
pub use tracing_setup::{init_tracing, LogConfig};

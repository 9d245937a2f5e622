//! # logcodec-stream
//!
//! Turns a program's log output into decoded events.
//!
//! ## Architecture
//! ```text
//! LogSource (WebSocket logsSubscribe, or any other transport)
//!       │
//!       ▼
//! Subscription (one Tokio task, sequence-numbered LogBatch)
//!       │
//!       ▼
//! LogFilter ("Program data: " prefix, base64)
//!       │
//!       ▼
//! LogPipeline (discriminator → schema → decode_event)
//!       │
//!       ▼
//! LineOutcome per line, in arrival order
//! ```

pub mod filter;
pub mod listener;
pub mod pipeline;
pub mod subscription;
pub mod ws_listener;

pub use filter::{LogFilter, DEFAULT_LOG_PREFIX};
pub use listener::{Commitment, LogBatch, LogSource, LogStream, RawLogBatch};
pub use pipeline::{LineOutcome, LogPipeline};
pub use subscription::{BatchSink, Subscription, SubscriptionState};
pub use ws_listener::WsLogSource;

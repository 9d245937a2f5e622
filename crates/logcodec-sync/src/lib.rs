//! # logcodec-sync
//!
//! Keeps a local entity cache in step with a game program's event log.
//!
//! Decoded events are filtered by the active game instance and routed by
//! an exhaustive match over [`GameEvent`]. Each handled event names the
//! entities it touched; the [`Reconciler`] refreshes exactly those from the
//! authoritative source and replaces their cache entries wholesale.
//!
//! [`Session`] wires a log subscription, the decode pipeline, the dispatcher,
//! and the reconciler into one caller-owned context with an explicit
//! open/close lifecycle.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod game_event;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod source;

pub use cache::{EntityCache, Scope};
pub use config::SessionConfig;
pub use dispatcher::{dispatch, Route};
pub use error::{ConfigError, SessionError};
pub use game_event::{EventShapeError, GameEvent, PlayPhase};
pub use reconciler::{ChangeListener, ChangeSet, ReconcileStats, Reconciler};
pub use retry::{RetryConfig, RetryPolicy, RetryingSource};
pub use session::{Session, SessionMetrics};
pub use source::{AuthoritativeSource, MemorySource};

//! Event Module - progress events for execution steps
//!
//! Key types:
//! - `ProgressEvent`: envelope with id + execution id + node + timestamp + kind
//! - `EventKind`: one variant per engine step (group, merge, checkpoint, validate, ...)
//! - `EventLog`: thread-safe, append-only log for one execution
//! - `EventEmitter`: sink trait, `NoopEmitter` and `ChannelEmitter` (streaming)

mod emitter;
mod log;

pub use emitter::{ChannelEmitter, EventEmitter, NoopEmitter};
pub use log::{EventKind, EventLog, ProgressEvent};

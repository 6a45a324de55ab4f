//! EventLog - per-execution progress events
//!
//! - ProgressEvent: envelope with id + execution id + node + timestamp + kind
//! - EventKind: one variant per engine step
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::process::ValidationStatus;

/// Single progress event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    /// Monotonic sequence ID within one execution
    pub id: u64,
    pub execution_id: String,
    /// Engine step that produced the event
    pub node: String,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// All progress event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // EXECUTION LEVEL
    // ═══════════════════════════════════════════
    ExecutionStarted {
        task_set_id: String,
        task_set_version: String,
        groups: Vec<i32>,
        task_count: usize,
    },
    ExecutionCompleted {
        status: String,
        processing_time_ms: u64,
    },
    ExecutionFailed {
        error: String,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    GroupStarted {
        group: i32,
        task_ids: Vec<String>,
    },
    GroupCompleted {
        group: i32,
        succeeded: usize,
        failed: usize,
    },
    MergeCompleted {
        group: i32,
        field_count: usize,
    },
    CheckpointSaved {
        group: Option<i32>,
    },
    ValidationCompleted {
        status: ValidationStatus,
        quality_score: u8,
        errors: usize,
        warnings: usize,
    },
    RetryScheduled {
        retry_count: u32,
        max_retries: u32,
    },

    // ═══════════════════════════════════════════
    // HUMAN REVIEW
    // ═══════════════════════════════════════════
    HumanReviewRequested {
        errors: Vec<String>,
    },
    Resumed {
        feedback: Option<Value>,
    },
}

impl EventKind {
    /// Engine step name for this event
    pub fn node(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "initialize",
            Self::GroupStarted { .. } | Self::GroupCompleted { .. } => "execute_group",
            Self::MergeCompleted { .. } => "merge",
            Self::CheckpointSaved { .. } => "checkpoint",
            Self::ValidationCompleted { .. } => "validate",
            Self::RetryScheduled { .. } => "route",
            Self::HumanReviewRequested { .. } => "human_review",
            Self::Resumed { .. } => "resume",
            Self::ExecutionCompleted { .. } | Self::ExecutionFailed { .. } => "finalize",
        }
    }

    /// Terminal or paused: nothing follows on this stream
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. }
                | Self::ExecutionFailed { .. }
                | Self::HumanReviewRequested { .. }
        )
    }
}

/// Thread-safe, append-only event log for one execution
#[derive(Clone)]
pub struct EventLog {
    execution_id: Arc<str>,
    events: Arc<RwLock<Vec<ProgressEvent>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new(execution_id: &str) -> Self {
        Self {
            execution_id: Arc::from(execution_id),
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event and return a copy of it
    pub fn record(&self, kind: EventKind) -> ProgressEvent {
        let event = ProgressEvent {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            execution_id: self.execution_id.to_string(),
            node: kind.node().to_string(),
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event.clone());
        event
    }

    /// Append an event, returning its ID
    pub fn emit(&self, kind: EventKind) -> u64 {
        self.record(kind).id
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    pub fn with_events<T>(&self, f: impl FnOnce(&[ProgressEvent]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events produced by one step
    pub fn filter_node(&self, node: &str) -> Vec<ProgressEvent> {
        self.with_events(|events| events.iter().filter(|e| e.node == node).cloned().collect())
    }

    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("execution_id", &self.execution_id)
            .field("len", &self.len())
            .finish()
    }
}

//! ExecutionState - the unit of persistence
//!
//! Field semantics:
//! - `results`: append-only. `append_results` is the only writer.
//! - `merged_data`: replaced after every group by folding the new results in.
//!   It always equals `recompute_merged` over the full `results` list.
//! - `completed_groups`: grows within one pass, cleared when an engine retry starts.
//! - `progress`: in-memory only, never checkpointed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::result::TaskResult;
use crate::ast::{MergeStrategy, TaskSetDefinition};
use crate::event::ProgressEvent;
use crate::process::{self, ValidationResult};
use crate::provider::TokenUsage;
use crate::store::StatePatch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: String,
    pub document: String,
    pub task_set_id: String,
    #[serde(default)]
    pub task_set_version: String,
    pub vendor_override: Option<String>,
    pub model_override: Option<String>,

    /// Enabled group numbers, ascending, snapshotted at initialization
    #[serde(default)]
    pub groups: Vec<i32>,
    pub current_group: Option<i32>,
    #[serde(default)]
    pub completed_groups: BTreeSet<i32>,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub merged_data: Map<String, Value>,
    pub validation: Option<ValidationResult>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub human_review_enabled: bool,
    /// Set by resume; routing completes instead of pausing again
    #[serde(default)]
    pub review_acknowledged: bool,
    /// Reviewer input recorded on resume
    #[serde(default)]
    pub human_feedback: Option<Value>,

    pub status: ExecutionStatus,
    /// Fatal engine error, when status is Failed for a reason other than task failures
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub progress: Vec<ProgressEvent>,
}

impl ExecutionState {
    pub fn new(
        execution_id: impl Into<String>,
        document: impl Into<String>,
        task_set_id: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            document: document.into(),
            task_set_id: task_set_id.into(),
            task_set_version: String::new(),
            vendor_override: None,
            model_override: None,
            groups: Vec::new(),
            current_group: None,
            completed_groups: BTreeSet::new(),
            results: Vec::new(),
            merged_data: Map::new(),
            validation: None,
            retry_count: 0,
            max_retries: 0,
            human_review_enabled: false,
            review_acknowledged: false,
            human_feedback: None,
            status: ExecutionStatus::Pending,
            error: None,
            token_usage: TokenUsage::default(),
            started_at: Utc::now(),
            completed_at: None,
            progress: Vec::new(),
        }
    }

    /// Snapshot the group layout of a task set and move to Running
    pub fn initialize(&mut self, task_set: &TaskSetDefinition) {
        self.task_set_version = task_set.version.clone();
        self.groups = task_set.group_plan().into_keys().collect();
        self.current_group = self.groups.first().copied();
        self.completed_groups.clear();
        self.status = ExecutionStatus::Running;
    }

    /// Lowest enabled group not yet completed in this pass
    pub fn next_group(&self) -> Option<i32> {
        self.groups
            .iter()
            .copied()
            .find(|g| !self.completed_groups.contains(g))
    }

    /// Append one group's results and fold them into `merged_data`
    pub fn append_results(&mut self, group: i32, results: Vec<TaskResult>, strategy: MergeStrategy) {
        self.merged_data = process::merge(&self.merged_data, &results, strategy);
        for result in &results {
            self.token_usage += result.token_usage;
        }
        self.results.extend(results);
        self.completed_groups.insert(group);
    }

    /// Rebuild merged data from every result (pure)
    pub fn recompute_merged(&self, strategy: MergeStrategy) -> Map<String, Value> {
        process::recompute(&self.results, strategy)
    }

    /// Reset per-pass progress before an engine-level retry
    pub fn begin_retry(&mut self) {
        self.retry_count += 1;
        self.completed_groups.clear();
        self.validation = None;
        self.current_group = self.groups.first().copied();
    }

    pub fn record_progress_event(&mut self, event: ProgressEvent) {
        self.progress.push(event);
    }

    /// Apply a partial update written through the checkpoint store
    pub fn apply_patch(&mut self, patch: &StatePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ack) = patch.review_acknowledged {
            self.review_acknowledged = ack;
        }
        if let Some(feedback) = &patch.human_feedback {
            self.human_feedback = Some(feedback.clone());
        }
    }

    /// True when at least one result exists and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| !r.success)
    }

    pub fn any_failed(&self) -> bool {
        self.results.iter().any(|r| !r.success)
    }

    /// Move to a terminal status and stamp the completion time
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        self.completed_at = Some(Utc::now());
    }

    /// Wall time from start to completion (or now, while not finished)
    pub fn processing_time_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

//! Request/response types exposed upward (CLI, HTTP layer)

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::result::TaskResult;
use super::state::{ExecutionState, ExecutionStatus};
use crate::process::ValidationResult;
use crate::provider::TokenUsage;

/// Input to `ExecutionEngine::execute` / `stream_execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub document: String,
    pub task_set_id: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Caller-chosen id; a UUID is generated when absent
    #[serde(default)]
    pub execution_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(document: impl Into<String>, task_set_id: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            task_set_id: task_set_id.into(),
            vendor: None,
            model: None,
            execution_id: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }
}

/// Caller-facing status. `Partial` exists only here: the engine itself
/// finishes as `Completed` when some tasks failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Partial,
    Failed,
    Paused,
}

impl ResponseStatus {
    /// Derive the reported status from a stored state
    pub fn from_state(state: &ExecutionState) -> Self {
        match state.status {
            ExecutionStatus::Paused => Self::Paused,
            ExecutionStatus::Failed => Self::Failed,
            _ if state.all_failed() => Self::Failed,
            _ if state.any_failed() => Self::Partial,
            _ => Self::Completed,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_id: String,
    pub task_set_id: String,
    pub task_set_version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: u64,
    pub token_usage: TokenUsage,
    pub token_usage_by_task: BTreeMap<String, TokenUsage>,
    pub models_used: Vec<String>,
    pub vendors_used: Vec<String>,
    pub retry_count: u32,
}

impl ExecutionMetadata {
    fn from_state(state: &ExecutionState) -> Self {
        let mut by_task: BTreeMap<String, TokenUsage> = BTreeMap::new();
        let mut models = BTreeSet::new();
        let mut vendors = BTreeSet::new();
        for result in &state.results {
            *by_task.entry(result.task_id.clone()).or_default() += result.token_usage;
            models.extend(result.model_used.iter().cloned());
            vendors.extend(result.vendor_used.iter().cloned());
        }

        Self {
            execution_id: state.execution_id.clone(),
            task_set_id: state.task_set_id.clone(),
            task_set_version: state.task_set_version.clone(),
            started_at: state.started_at,
            completed_at: state.completed_at,
            processing_time_ms: state.processing_time_ms(),
            token_usage: state.token_usage,
            token_usage_by_task: by_task,
            models_used: models.into_iter().collect(),
            vendors_used: vendors.into_iter().collect(),
            retry_count: state.retry_count,
        }
    }
}

/// What `execute` and `resume` return: a terminal or paused snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub status: ResponseStatus,
    pub task_set_id: String,
    pub data: Map<String, Value>,
    pub validation: Option<ValidationResult>,
    pub metadata: ExecutionMetadata,
    pub task_results: Vec<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResponse {
    pub fn from_state(state: &ExecutionState) -> Self {
        let status = ResponseStatus::from_state(state);
        let error = match status {
            ResponseStatus::Paused => Some(pause_reason(state)),
            ResponseStatus::Failed => Some(
                state
                    .error
                    .clone()
                    .unwrap_or_else(|| "All tasks failed".to_string()),
            ),
            _ => state.error.clone(),
        };

        Self {
            execution_id: state.execution_id.clone(),
            status,
            task_set_id: state.task_set_id.clone(),
            data: state.merged_data.clone(),
            validation: state.validation.clone(),
            metadata: ExecutionMetadata::from_state(state),
            task_results: state.results.clone(),
            error,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == ResponseStatus::Paused
    }
}

/// Validation errors that sent the execution to human review
fn pause_reason(state: &ExecutionState) -> String {
    let errors = state
        .validation
        .as_ref()
        .map(|v| v.errors.join("; "))
        .unwrap_or_default();
    if errors.is_empty() {
        "Awaiting human review".to_string()
    } else {
        format!("Awaiting human review: {}", errors)
    }
}

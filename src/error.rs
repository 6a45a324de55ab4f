// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Engine error types with error codes
//!
//! Error code ranges:
//! - SKR-000-009: Task-set / configuration errors (fatal, no retry)
//! - SKR-010-019: Checkpoint persistence errors (fatal to the current step)
//! - SKR-020-029: Resume rejections (raised before any state mutation)
//! - SKR-030-039: Engine errors
//!
//! Task-level failures (timeouts, vendor errors, malformed output) are not here:
//! they are captured as data in `TaskResult::error` by the task runner.

use thiserror::Error;

use crate::runtime::ExecutionStatus;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum EngineError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[SKR-001] Task set '{id}' not found")]
    TaskSetNotFound { id: String },

    #[error("[SKR-002] No active tasks to execute in task set '{task_set_id}'")]
    NoActiveTasks { task_set_id: String },

    #[error("[SKR-003] Invalid params for validation rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("[SKR-004] Invalid output shape: {reason}")]
    InvalidShape { reason: String },

    #[error("[SKR-005] Failed to load task set at '{path}': {reason}")]
    TaskSetLoad { path: String, reason: String },

    #[error("[SKR-006] Configuration error: {reason}")]
    ConfigError { reason: String },

    // ═══════════════════════════════════════════
    // PERSISTENCE ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[SKR-010] Checkpoint store unavailable: {reason}")]
    CheckpointUnavailable { reason: String },

    #[error("[SKR-011] Checkpoint for execution '{execution_id}' is corrupt: {reason}")]
    CheckpointCorrupt {
        execution_id: String,
        reason: String,
    },

    #[error("[SKR-012] Invalid execution id '{execution_id}'")]
    InvalidExecutionId { execution_id: String },

    // ═══════════════════════════════════════════
    // RESUME ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[SKR-020] Execution '{execution_id}' not found")]
    ExecutionNotFound { execution_id: String },

    #[error("[SKR-021] Execution '{execution_id}' is {status}, only paused executions can be resumed")]
    NotPaused {
        execution_id: String,
        status: ExecutionStatus,
    },

    #[error("[SKR-022] Execution '{execution_id}' is already being processed")]
    ExecutionBusy { execution_id: String },

    // ═══════════════════════════════════════════
    // ENGINE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[SKR-030] Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EngineError {
    /// Stable error code (e.g. "SKR-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskSetNotFound { .. } => "SKR-001",
            Self::NoActiveTasks { .. } => "SKR-002",
            Self::InvalidRule { .. } => "SKR-003",
            Self::InvalidShape { .. } => "SKR-004",
            Self::TaskSetLoad { .. } => "SKR-005",
            Self::ConfigError { .. } => "SKR-006",
            Self::CheckpointUnavailable { .. } => "SKR-010",
            Self::CheckpointCorrupt { .. } => "SKR-011",
            Self::InvalidExecutionId { .. } => "SKR-012",
            Self::ExecutionNotFound { .. } => "SKR-020",
            Self::NotPaused { .. } => "SKR-021",
            Self::ExecutionBusy { .. } => "SKR-022",
            Self::Execution(_) => "SKR-030",
            Self::Io(_) => "SKR-090",
            Self::Json(_) => "SKR-091",
            Self::Yaml(_) => "SKR-092",
            Self::Toml(_) => "SKR-093",
        }
    }

    /// Configuration problems terminate the execution without retry
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TaskSetNotFound { .. }
                | Self::NoActiveTasks { .. }
                | Self::InvalidRule { .. }
                | Self::InvalidShape { .. }
                | Self::TaskSetLoad { .. }
                | Self::ConfigError { .. }
        )
    }

    /// The checkpoint store could not durably record state
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::CheckpointUnavailable { .. }
                | Self::CheckpointCorrupt { .. }
                | Self::InvalidExecutionId { .. }
        )
    }

    /// A resume request was refused before touching stored state
    pub fn is_resume_rejection(&self) -> bool {
        matches!(
            self,
            Self::ExecutionNotFound { .. } | Self::NotPaused { .. } | Self::ExecutionBusy { .. }
        )
    }
}

impl FixSuggestion for EngineError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::TaskSetNotFound { .. } => {
                Some("Check the task set id and that its directory contains schema.json")
            }
            Self::NoActiveTasks { .. } => Some("Set at least one skill to status: active"),
            Self::InvalidRule { .. } => {
                Some("Check post_processing.validation_rules params for this rule type")
            }
            Self::InvalidShape { .. } => Some("output_schema must be a valid JSON Schema"),
            Self::TaskSetLoad { .. } => Some("Check schema.json syntax and prompt_file paths"),
            Self::ConfigError { .. } => Some("Check ~/.config/skillrun/config.toml"),
            Self::CheckpointUnavailable { .. } => {
                Some("Check that the checkpoint directory exists and is writable")
            }
            Self::CheckpointCorrupt { .. } => {
                Some("Remove the checkpoint file and re-run the execution")
            }
            Self::InvalidExecutionId { .. } => {
                Some("Execution ids contain only letters, digits, '-' and '_'")
            }
            Self::ExecutionNotFound { .. } => {
                Some("The execution may have been purged after its retention window")
            }
            Self::NotPaused { .. } => Some("Only executions paused for human review can resume"),
            Self::ExecutionBusy { .. } => Some("Wait for the in-flight resume to finish"),
            Self::Execution(_) | Self::Io(_) | Self::Json(_) | Self::Yaml(_) | Self::Toml(_) => {
                None
            }
        }
    }
}

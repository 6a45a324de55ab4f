//! AST Module - task-set domain model
//!
//! Contains the immutable definitions an execution runs against:
//! - `task`: TaskDefinition, TaskSetDefinition, MergeStrategy
//! - `rule`: ValidationRule, RuleKind, Severity, OutputShape
//!
//! These types represent the "what". They are produced by the `loader` module
//! and borrowed read-only (as `Arc` snapshots) by the `runtime` module.

mod rule;
mod task;

pub use rule::{OutputShape, RuleKind, Severity, ValidationRule};
pub use task::{
    GroupPlan, MergeStrategy, TaskDefinition, TaskSetDefinition, DEFAULT_GROUP,
    DEFAULT_TASK_RETRIES, DEFAULT_TASK_TIMEOUT,
};

//! Loader Module - where task-set definitions come from
//!
//! - `format`: the on-disk directory format (schema.json / taskset.yaml)
//! - `registry`: `TaskSetRegistry`, an explicitly constructed cache
//!
//! The engine only sees the `TaskSetSource` trait.

mod format;
mod registry;

use std::sync::Arc;

use crate::ast::TaskSetDefinition;
use crate::error::Result;

pub use format::{
    load_task_set_dir, read_task_set_file, PostProcessing, SkillEntry, SkillStatus, TaskSetFile,
    JSON_FILE, YAML_FILE,
};
pub use registry::TaskSetRegistry;

/// Read-only lookup of task-set definitions by id
pub trait TaskSetSource: Send + Sync {
    /// Snapshot of the current definition, or `TaskSetNotFound`
    fn get_task_set(&self, id: &str) -> Result<Arc<TaskSetDefinition>>;
}

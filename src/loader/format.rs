//! Task-set directory format
//!
//! ```text
//! invoices/
//! ├── schema.json          (or taskset.yaml)
//! ├── prompts/header.md
//! └── output.schema.json   (optional, referenced by output_schema_file)
//! ```
//!
//! ```yaml
//! schema_id: invoices
//! version: "1.2"
//! name: Invoices
//! skills:
//!   - id: header
//!     name: Header fields
//!     prompt_file: prompts/header.md
//!     parallel_group: 1
//!     timeout_seconds: 45
//!     retry_count: 2
//!     status: active
//! post_processing:
//!   merge_strategy: merge_deep
//!   validation_rules:
//!     - id: totals
//!       name: Totals add up
//!       type: sum_check
//!       params: { expected: total, operands: [net, tax] }
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ast::{
    MergeStrategy, OutputShape, TaskDefinition, TaskSetDefinition, ValidationRule,
    DEFAULT_GROUP, DEFAULT_TASK_RETRIES, DEFAULT_TASK_TIMEOUT,
};
use crate::error::{EngineError, Result};

pub const JSON_FILE: &str = "schema.json";
pub const YAML_FILE: &str = "taskset.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSetFile {
    pub schema_id: String,
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub skills: Vec<SkillEntry>,
    #[serde(default)]
    pub post_processing: PostProcessing,
    /// Inline JSON Schema for the merged output
    #[serde(default)]
    pub output_schema: Option<Value>,
    /// JSON Schema file relative to the task-set directory
    #[serde(default)]
    pub output_schema_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompt_file: Option<String>,
    /// Inline prompt, used when `prompt_file` is absent
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_group")]
    pub parallel_group: i32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub status: SkillStatus,
    #[serde(default)]
    pub output_fields: Vec<String>,
}

fn default_group() -> i32 {
    DEFAULT_GROUP
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TASK_TIMEOUT.as_secs()
}

fn default_retry_count() -> u32 {
    DEFAULT_TASK_RETRIES
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    #[default]
    Active,
    Disabled,
    Draft,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessing {
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

/// Parse the descriptor inside `dir` (schema.json first, then taskset.yaml)
pub fn read_task_set_file(dir: &Path) -> Result<TaskSetFile> {
    let json = dir.join(JSON_FILE);
    let yaml = dir.join(YAML_FILE);

    if json.is_file() {
        let raw = std::fs::read_to_string(&json)?;
        serde_json::from_str(&raw).map_err(|e| load_error(&json, e))
    } else if yaml.is_file() {
        let raw = std::fs::read_to_string(&yaml)?;
        serde_yaml::from_str(&raw).map_err(|e| load_error(&yaml, e))
    } else {
        Err(load_error(dir, format!("no {} or {}", JSON_FILE, YAML_FILE)))
    }
}

/// Load one task-set directory, reading prompt and schema files it references
pub fn load_task_set_dir(dir: &Path) -> Result<TaskSetDefinition> {
    let file = read_task_set_file(dir)?;

    let mut task_set = TaskSetDefinition::new(&file.schema_id, &file.version)
        .with_merge_strategy(file.post_processing.merge_strategy);
    task_set.name = if file.name.is_empty() {
        file.schema_id.clone()
    } else {
        file.name.clone()
    };
    task_set.description = file.description.clone();

    let mut seen = HashSet::new();
    for skill in &file.skills {
        if !seen.insert(skill.id.as_str()) {
            return Err(load_error(dir, format!("duplicate skill id '{}'", skill.id)));
        }
        let instructions = match (&skill.prompt_file, &skill.prompt) {
            (Some(rel), _) => read_relative(dir, rel)?,
            (None, Some(inline)) => inline.clone(),
            (None, None) => {
                return Err(load_error(
                    dir,
                    format!("skill '{}' has neither prompt_file nor prompt", skill.id),
                ))
            }
        };
        task_set = task_set.with_task(skill.to_task(instructions));
    }

    for rule in file.post_processing.validation_rules {
        task_set = task_set.with_rule(rule);
    }

    let schema = match (file.output_schema, &file.output_schema_file) {
        (Some(inline), _) => Some(inline),
        (None, Some(rel)) => {
            let raw = read_relative(dir, rel)?;
            let path = dir.join(rel);
            Some(serde_json::from_str(&raw).map_err(|e| load_error(&path, e))?)
        }
        (None, None) => None,
    };
    if let Some(schema) = schema {
        let name = task_set.name.clone();
        task_set = task_set.with_output_shape(OutputShape::named(name, schema));
    }

    debug!(
        task_set = %task_set.id,
        version = %task_set.version,
        tasks = task_set.tasks.len(),
        "Loaded task set"
    );
    Ok(task_set)
}

impl SkillEntry {
    fn to_task(&self, instructions: String) -> TaskDefinition {
        let mut task = TaskDefinition::new(&self.id, instructions)
            .with_group(self.parallel_group)
            .with_timeout(Duration::from_secs(self.timeout_seconds))
            .with_max_retries(self.retry_count)
            .with_temperature(self.temperature);
        if !self.name.is_empty() {
            task = task.with_name(&self.name);
        }
        if let Some(vendor) = &self.vendor {
            task = task.with_vendor(vendor);
        }
        if let Some(model) = &self.model {
            task = task.with_model(model);
        }
        if self.status != SkillStatus::Active {
            task = task.disabled();
        }
        task.output_fields = self.output_fields.clone();
        task
    }
}

/// Read a file that must stay inside `dir`
fn read_relative(dir: &Path, rel: &str) -> Result<String> {
    let rel_path = PathBuf::from(rel);
    let escapes = rel_path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(load_error(
            dir,
            format!("'{}' points outside the task set directory", rel),
        ));
    }

    let path = dir.join(rel_path);
    std::fs::read_to_string(&path)
        .map_err(|e| load_error(&path, format!("cannot read file: {}", e)))
}

fn load_error(path: &Path, reason: impl ToString) -> EngineError {
    EngineError::TaskSetLoad {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_json_descriptor_with_prompt_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "prompts/header.md", "Extract the header.");
        write(
            tmp.path(),
            JSON_FILE,
            &json!({
                "schema_id": "invoices",
                "version": "1.2",
                "name": "Invoices",
                "skills": [
                    {"id": "header", "name": "Header", "prompt_file": "prompts/header.md",
                     "parallel_group": 2, "vendor": "openai", "output_fields": ["number"]},
                    {"id": "draft", "prompt": "inline", "status": "draft"}
                ],
                "post_processing": {
                    "merge_strategy": "first_wins",
                    "validation_rules": [
                        {"id": "r1", "name": "Need number", "type": "required",
                         "params": {"fields": ["number"]}, "severity": "warning"}
                    ]
                },
                "output_schema": {"type": "object"}
            })
            .to_string(),
        );

        let set = load_task_set_dir(tmp.path()).unwrap();
        assert_eq!(set.id, "invoices");
        assert_eq!(set.merge_strategy, MergeStrategy::FirstWins);

        let header = set.task("header").unwrap();
        assert_eq!(header.instructions, "Extract the header.");
        assert_eq!(header.group, 2);
        assert_eq!(header.timeout, Duration::from_secs(45));
        assert_eq!(header.max_retries, 2);
        assert_eq!(header.preferred_vendor.as_deref(), Some("openai"));
        assert_eq!(header.output_fields, vec!["number"]);
        assert!(!set.task("draft").unwrap().enabled);

        assert_eq!(set.validation_rules[0].kind, RuleKind::RequiredFields);
        assert_eq!(set.output_shape.as_ref().unwrap().name.as_deref(), Some("Invoices"));
    }

    #[test]
    fn loads_yaml_descriptor() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            YAML_FILE,
            "schema_id: notes\nversion: '1'\nskills:\n  - id: s\n    prompt: Summarize\n",
        );
        let set = load_task_set_dir(tmp.path()).unwrap();
        assert_eq!(set.name, "notes");
        assert_eq!(set.merge_strategy, MergeStrategy::DeepMerge);
        assert_eq!(set.task("s").unwrap().group, 1);
    }

    #[test]
    fn prompt_file_cannot_escape_directory() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            JSON_FILE,
            r#"{"schema_id":"x","version":"1","skills":[{"id":"s","prompt_file":"../secret.md"}]}"#,
        );
        let err = load_task_set_dir(tmp.path()).unwrap_err();
        assert_eq!(err.code(), "SKR-005");
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn missing_prompt_file_is_load_error() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            JSON_FILE,
            r#"{"schema_id":"x","version":"1","skills":[{"id":"s","prompt_file":"nope.md"}]}"#,
        );
        let err = load_task_set_dir(tmp.path()).unwrap_err();
        assert_eq!(err.code(), "SKR-005");
    }

    #[test]
    fn malformed_descriptor_is_load_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), JSON_FILE, "{ not json");
        assert_eq!(load_task_set_dir(tmp.path()).unwrap_err().code(), "SKR-005");

        let empty = TempDir::new().unwrap();
        assert_eq!(load_task_set_dir(empty.path()).unwrap_err().code(), "SKR-005");
    }

    #[test]
    fn duplicate_skill_ids_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            YAML_FILE,
            "schema_id: x\nversion: '1'\nskills:\n  - id: header\n    prompt: First\n  - id: header\n    prompt: Second\n    parallel_group: 2\n",
        );
        let err = load_task_set_dir(tmp.path()).unwrap_err();
        assert_eq!(err.code(), "SKR-005");
        assert!(err.to_string().contains("duplicate skill id 'header'"));
    }
}

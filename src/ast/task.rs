//! Task and task-set definitions
//!
//! A `TaskSetDefinition` is loaded once per version and replaced wholesale on
//! reload. Executions hold an `Arc` snapshot, so a concurrent reload never
//! changes the definitions under a running execution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::rule::{OutputShape, ValidationRule};

/// Default per-attempt timeout for a task
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(45);

/// Default per-task retry budget (attempts = retries + 1)
pub const DEFAULT_TASK_RETRIES: u32 = 2;

/// Default execution group
pub const DEFAULT_GROUP: i32 = 1;

/// Strategy for combining task outputs into one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// First result to introduce a key wins
    FirstWins,
    /// Later results overwrite earlier ones
    LastWins,
    /// Nested objects merge key-by-key, everything else is overwritten
    #[default]
    #[serde(rename = "merge_deep", alias = "deep_merge")]
    DeepMerge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::FirstWins => write!(f, "first_wins"),
            MergeStrategy::LastWins => write!(f, "last_wins"),
            MergeStrategy::DeepMerge => write!(f, "merge_deep"),
        }
    }
}

/// One LLM-backed extraction step
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    /// Unique within its task set
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Prompt text sent as instructions
    pub instructions: String,
    /// Execution order; equal groups run concurrently
    pub group: i32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub temperature: f32,
    pub preferred_vendor: Option<String>,
    pub preferred_model: Option<String>,
    /// Disabled tasks are excluded from every run
    pub enabled: bool,
    /// Fields this task is expected to extract (informational)
    pub output_fields: Vec<String>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, instructions: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            instructions: instructions.into(),
            group: DEFAULT_GROUP,
            timeout: DEFAULT_TASK_TIMEOUT,
            max_retries: DEFAULT_TASK_RETRIES,
            temperature: 0.0,
            preferred_vendor: None,
            preferred_model: None,
            enabled: true,
            output_fields: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.preferred_vendor = Some(vendor.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Vendor override or the caller's default
    pub fn effective_vendor<'a>(&'a self, default: &'a str) -> &'a str {
        self.preferred_vendor
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }
}

/// Enabled tasks partitioned by ascending group number
pub type GroupPlan = BTreeMap<i32, Vec<Arc<TaskDefinition>>>;

/// A named, versioned collection of tasks plus merge/validation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSetDefinition {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<TaskDefinition>,
    pub merge_strategy: MergeStrategy,
    pub validation_rules: Vec<ValidationRule>,
    pub output_shape: Option<OutputShape>,
}

impl TaskSetDefinition {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: version.into(),
            description: None,
            tasks: Vec::new(),
            merge_strategy: MergeStrategy::default(),
            validation_rules: Vec::new(),
            output_shape: None,
        }
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    pub fn with_output_shape(mut self, shape: OutputShape) -> Self {
        self.output_shape = Some(shape);
        self
    }

    /// Tasks that take part in a run
    pub fn enabled_tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter().filter(|t| t.enabled)
    }

    /// Partition enabled tasks into ascending groups.
    ///
    /// Within a group, tasks keep their declaration order, which is the order
    /// their results are merged in.
    pub fn group_plan(&self) -> GroupPlan {
        let mut plan = GroupPlan::new();
        for task in self.enabled_tasks() {
            plan.entry(task.group)
                .or_default()
                .push(Arc::new(task.clone()));
        }
        plan
    }

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_plan_sorts_groups_and_keeps_declaration_order() {
        let set = TaskSetDefinition::new("docs", "1.0")
            .with_task(TaskDefinition::new("a", "A").with_group(2))
            .with_task(TaskDefinition::new("b", "B").with_group(1))
            .with_task(TaskDefinition::new("c", "C").with_group(2))
            .with_task(TaskDefinition::new("d", "D").with_group(1));

        let plan = set.group_plan();
        let groups: Vec<i32> = plan.keys().copied().collect();
        assert_eq!(groups, vec![1, 2]);

        let ids = |g: i32| -> Vec<String> { plan[&g].iter().map(|t| t.id.clone()).collect() };
        assert_eq!(ids(1), vec!["b", "d"]);
        assert_eq!(ids(2), vec!["a", "c"]);
    }

    #[test]
    fn disabled_tasks_are_excluded_from_plan() {
        let set = TaskSetDefinition::new("docs", "1.0")
            .with_task(TaskDefinition::new("a", "A"))
            .with_task(TaskDefinition::new("b", "B").disabled().with_group(3));

        let plan = set.group_plan();
        assert_eq!(plan.len(), 1);
        assert_eq!(set.enabled_tasks().count(), 1);
    }

    #[test]
    fn effective_vendor_prefers_task_override() {
        let plain = TaskDefinition::new("a", "A");
        assert_eq!(plain.effective_vendor("gemini"), "gemini");

        let pinned = TaskDefinition::new("b", "B").with_vendor("openai");
        assert_eq!(pinned.effective_vendor("gemini"), "openai");

        let empty = TaskDefinition::new("c", "C").with_vendor("");
        assert_eq!(empty.effective_vendor("gemini"), "gemini");
    }

    #[test]
    fn merge_strategy_serde_names() {
        let s: MergeStrategy = serde_json::from_str("\"first_wins\"").unwrap();
        assert_eq!(s, MergeStrategy::FirstWins);
        let s: MergeStrategy = serde_json::from_str("\"deep_merge\"").unwrap();
        assert_eq!(s, MergeStrategy::DeepMerge);
        assert_eq!(
            serde_json::to_string(&MergeStrategy::DeepMerge).unwrap(),
            "\"merge_deep\""
        );
    }
}

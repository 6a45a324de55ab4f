//! TaskResult - outcome of one task's attempt sequence

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::TokenUsage;

/// Produced once per task per run; never edited after the runner returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// Group the task ran in
    #[serde(default)]
    pub group: i32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Present iff `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub vendor_used: Option<String>,
    /// Index of the successful attempt, or attempts made when all failed
    pub retries_used: u32,
}

impl TaskResult {
    pub fn succeeded(task_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            task_id: task_id.into(),
            group: 0,
            success: true,
            data: Some(data),
            error: None,
            token_usage: TokenUsage::default(),
            elapsed_ms: 0,
            model_used: None,
            vendor_used: None,
            retries_used: 0,
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            ..Self::succeeded(task_id, Map::new())
        }
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_target(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor_used = Some(vendor.into());
        self.model_used = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_used = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_result_has_error_and_no_data() {
        let r = TaskResult::failed("a", "timeout");
        assert!(!r.success);
        assert!(r.data.is_none());
        assert_eq!(r.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn serialized_failure_omits_data() {
        let r = TaskResult::failed("a", "boom").with_target("openai", "gpt-4o");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("data").is_none());
        assert_eq!(v["vendor_used"], json!("openai"));
        assert_eq!(v["token_usage"], json!({"input": 0, "output": 0, "total": 0}));
    }
}

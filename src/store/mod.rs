//! Store Module - durable checkpoints keyed by execution id
//!
//! - `CheckpointStore`: save / load / conditional update / purge
//! - `MemoryCheckpointStore`: DashMap of serialized states (tests, single process)
//! - `FileCheckpointStore`: one JSON file per execution, atomic writes
//!
//! States are stored serialized in both backends, so a loaded state never
//! shares memory with the engine's working copy.

mod file;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::runtime::{ExecutionState, ExecutionStatus};

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

/// Partial update applied without a full load/save round trip by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    pub status: Option<ExecutionStatus>,
    pub review_acknowledged: Option<bool>,
    pub human_feedback: Option<Value>,
}

impl StatePatch {
    /// Patch written by resume: back to Running, review acknowledged
    pub fn acknowledge_review(feedback: Option<Value>) -> Self {
        Self {
            status: Some(ExecutionStatus::Running),
            review_acknowledged: Some(true),
            human_feedback: feedback,
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the full state, replacing any previous checkpoint
    async fn save(&self, execution_id: &str, state: &ExecutionState) -> Result<()>;

    /// Load a state; `Ok(None)` when no checkpoint exists
    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>>;

    /// Apply a patch only while the stored status is `expected`.
    ///
    /// This is the serialization point between engines sharing a store:
    /// `ExecutionNotFound` if absent, `NotPaused` (carrying the stored
    /// status) if another writer got there first.
    async fn update(
        &self,
        execution_id: &str,
        patch: &StatePatch,
        expected: ExecutionStatus,
    ) -> Result<()>;

    /// Delete terminal states completed longer ago than `retention`; returns the count
    async fn purge_expired(&self, retention: Duration) -> Result<usize>;
}

/// Reject ids that are empty, too long, or could escape a directory
pub fn validate_execution_id(execution_id: &str) -> Result<()> {
    let valid = !execution_id.is_empty()
        && execution_id.len() <= 128
        && execution_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidExecutionId {
            execution_id: execution_id.to_string(),
        })
    }
}

/// Terminal and completed before the retention cutoff
pub(crate) fn is_expired(state: &ExecutionState, retention: Duration) -> bool {
    let Ok(retention) = chrono::Duration::from_std(retention) else {
        return false;
    };
    let cutoff = Utc::now() - retention;
    state.status.is_terminal() && state.completed_at.is_some_and(|at| at < cutoff)
}

/// Patch `state` in place if its status is still `expected`
pub(crate) fn transition(
    execution_id: &str,
    state: &mut ExecutionState,
    patch: &StatePatch,
    expected: ExecutionStatus,
) -> Result<()> {
    if state.status != expected {
        return Err(EngineError::NotPaused {
            execution_id: execution_id.to_string(),
            status: state.status,
        });
    }
    state.apply_patch(patch);
    Ok(())
}

pub(crate) fn encode(execution_id: &str, state: &ExecutionState) -> Result<String> {
    serde_json::to_string_pretty(state).map_err(|e| EngineError::CheckpointUnavailable {
        reason: format!("cannot serialize '{}': {}", execution_id, e),
    })
}

pub(crate) fn decode(execution_id: &str, raw: &str) -> Result<ExecutionState> {
    serde_json::from_str(raw).map_err(|e| EngineError::CheckpointCorrupt {
        execution_id: execution_id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_validation() {
        assert!(validate_execution_id("3f2a-11_b").is_ok());
        for bad in ["", "../evil", "a/b", "a\\b", "a.json", &"x".repeat(129)] {
            let err = validate_execution_id(bad).unwrap_err();
            assert_eq!(err.code(), "SKR-012");
        }
    }

    #[test]
    fn expiry_requires_terminal_status() {
        let mut state = ExecutionState::new("e1", "doc", "docs");
        state.completed_at = Some(Utc::now() - chrono::Duration::days(10));
        state.status = ExecutionStatus::Paused;
        assert!(!is_expired(&state, Duration::from_secs(86_400)));

        state.status = ExecutionStatus::Completed;
        assert!(is_expired(&state, Duration::from_secs(86_400)));
        assert!(!is_expired(&state, Duration::from_secs(86_400 * 30)));
    }

    #[test]
    fn transition_requires_expected_status() {
        let mut state = ExecutionState::new("e1", "doc", "docs");
        state.status = ExecutionStatus::Completed;
        let patch = StatePatch::acknowledge_review(None);

        let err = transition("e1", &mut state, &patch, ExecutionStatus::Paused).unwrap_err();
        assert_eq!(err.code(), "SKR-021");
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert!(!state.review_acknowledged);

        state.status = ExecutionStatus::Paused;
        transition("e1", &mut state, &patch, ExecutionStatus::Paused).unwrap();
        assert_eq!(state.status, ExecutionStatus::Running);
    }
}

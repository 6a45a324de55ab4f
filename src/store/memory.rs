//! In-memory checkpoint store

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{decode, encode, is_expired, transition, CheckpointStore, StatePatch};
use crate::error::{EngineError, Result};
use crate::runtime::{ExecutionState, ExecutionStatus};

/// Serialized states in a DashMap; lost on process exit
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    states: DashMap<String, String>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.states.contains_key(execution_id)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, execution_id: &str, state: &ExecutionState) -> Result<()> {
        let raw = encode(execution_id, state)?;
        self.states.insert(execution_id.to_string(), raw);
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        match self.states.get(execution_id) {
            Some(raw) => decode(execution_id, raw.value()).map(Some),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        execution_id: &str,
        patch: &StatePatch,
        expected: ExecutionStatus,
    ) -> Result<()> {
        // get_mut holds the shard lock for the whole check-and-write
        let mut entry = self
            .states
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        let mut state = decode(execution_id, entry.value())?;
        transition(execution_id, &mut state, patch, expected)?;
        *entry.value_mut() = encode(execution_id, &state)?;
        Ok(())
    }

    async fn purge_expired(&self, retention: Duration) -> Result<usize> {
        let before = self.states.len();
        self.states.retain(|id, raw| match decode(id, raw) {
            Ok(state) => !is_expired(&state, retention),
            Err(_) => true,
        });
        Ok(before.saturating_sub(self.states.len()))
    }
}

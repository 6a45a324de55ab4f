//! Per-execution mutual exclusion
//!
//! At most one engine invocation may process an execution id at a time. A
//! second caller is rejected immediately rather than queued.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default)]
pub struct ExecutionLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ExecutionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `execution_id`, or fail with `ExecutionBusy`
    pub fn try_acquire(&self, execution_id: &str) -> Result<ExecutionGuard> {
        let mutex = Arc::clone(
            self.locks
                .entry(execution_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = mutex
            .try_lock_owned()
            .map_err(|_| EngineError::ExecutionBusy {
                execution_id: execution_id.to_string(),
            })?;
        Ok(ExecutionGuard {
            locks: Arc::clone(&self.locks),
            execution_id: execution_id.to_string(),
            guard: Some(guard),
        })
    }

    /// Ids with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one invocation; releases and prunes on drop
#[derive(Debug)]
pub struct ExecutionGuard {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    execution_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map still references the mutex: nobody holds or awaits it
        self.locks
            .remove_if(&self.execution_id, |_, m| Arc::strong_count(m) == 1);
    }
}

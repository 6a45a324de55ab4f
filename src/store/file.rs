//! File-backed checkpoint store
//!
//! Layout: `<dir>/<execution_id>.json`. Writes go to a temp file in the same
//! directory and are renamed over the target, so a reader never sees a
//! half-written checkpoint. Conditional updates hold `<execution_id>.lock`
//! (created exclusively) across their read-modify-write, so processes
//! sharing the directory cannot both win the same transition.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    decode, encode, is_expired, transition, validate_execution_id, CheckpointStore, StatePatch,
};
use crate::error::{EngineError, Result};
use crate::runtime::{ExecutionState, ExecutionStatus};

const EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

/// Held `<id>.lock` marker, removed on drop
struct UpdateLock {
    path: PathBuf,
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Cannot remove checkpoint lock");
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| EngineError::CheckpointUnavailable {
            reason: format!("cannot create '{}': {}", dir.display(), e),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, execution_id: &str) -> Result<PathBuf> {
        validate_execution_id(execution_id)?;
        Ok(self.dir.join(format!("{}.{}", execution_id, EXTENSION)))
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        let unavailable = |e: std::io::Error| EngineError::CheckpointUnavailable {
            reason: format!("cannot write '{}': {}", path.display(), e),
        };
        tokio::fs::write(&tmp, contents).await.map_err(unavailable)?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable(e));
        }
        Ok(())
    }

    async fn lock(&self, execution_id: &str) -> Result<UpdateLock> {
        validate_execution_id(execution_id)?;
        let path = self
            .dir
            .join(format!("{}.{}", execution_id, LOCK_EXTENSION));
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match opened {
            Ok(_) => Ok(UpdateLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(EngineError::ExecutionBusy {
                    execution_id: execution_id.to_string(),
                })
            }
            Err(e) => Err(EngineError::CheckpointUnavailable {
                reason: format!("cannot lock '{}': {}", path.display(), e),
            }),
        }
    }

    async fn read(&self, execution_id: &str) -> Result<Option<String>> {
        let path = self.path_for(execution_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::CheckpointUnavailable {
                reason: format!("cannot read '{}': {}", path.display(), e),
            }),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, execution_id: &str, state: &ExecutionState) -> Result<()> {
        let path = self.path_for(execution_id)?;
        let raw = encode(execution_id, state)?;
        self.write_atomic(&path, &raw).await?;
        debug!(execution_id, path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        match self.read(execution_id).await? {
            Some(raw) => decode(execution_id, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        execution_id: &str,
        patch: &StatePatch,
        expected: ExecutionStatus,
    ) -> Result<()> {
        let _lock = self.lock(execution_id).await?;
        let mut state =
            self.load(execution_id)
                .await?
                .ok_or_else(|| EngineError::ExecutionNotFound {
                    execution_id: execution_id.to_string(),
                })?;
        transition(execution_id, &mut state, patch, expected)?;
        self.save(execution_id, &state).await
    }

    async fn purge_expired(&self, retention: Duration) -> Result<usize> {
        let mut entries =
            tokio::fs::read_dir(&self.dir)
                .await
                .map_err(|e| EngineError::CheckpointUnavailable {
                    reason: format!("cannot list '{}': {}", self.dir.display(), e),
                })?;

        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                    continue;
                }
            };
            match decode(id, &raw) {
                Ok(state) if is_expired(&state, retention) => {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => purged += 1,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Cannot remove expired checkpoint")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        Ok(purged)
    }
}

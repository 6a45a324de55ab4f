//! TaskSetRegistry - the injected task-set cache
//!
//! Built by the composition root and handed to the engine as a
//! `TaskSetSource`. Lookups return `Arc` snapshots: a reload swaps the map but
//! never touches a definition an execution already holds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};
use walkdir::WalkDir;

use super::format::{load_task_set_dir, JSON_FILE, YAML_FILE};
use super::TaskSetSource;
use crate::ast::TaskSetDefinition;
use crate::error::{EngineError, Result};

#[derive(Debug, Default)]
pub struct TaskSetRegistry {
    sets: RwLock<HashMap<String, Arc<TaskSetDefinition>>>,
    root: RwLock<Option<PathBuf>>,
}

impl TaskSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from a skills root
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let registry = Self::new();
        registry.reload_from_dir(root)?;
        Ok(registry)
    }

    /// Load every task-set directory under `root` and swap the whole map.
    ///
    /// A directory that fails to load is logged and left out; the other sets
    /// still load. Returns the number of sets now registered.
    pub fn reload_from_dir(&self, root: impl AsRef<Path>) -> Result<usize> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(EngineError::TaskSetLoad {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let mut loaded = HashMap::new();
        for dir in task_set_dirs(root) {
            match load_task_set_dir(&dir) {
                Ok(set) => {
                    loaded.insert(set.id.clone(), Arc::new(set));
                }
                Err(e) => error!(dir = %dir.display(), error = %e, "Failed to load task set"),
            }
        }

        let count = loaded.len();
        *self.sets.write() = loaded;
        *self.root.write() = Some(root.to_path_buf());
        info!(root = %root.display(), task_sets = count, "Task set registry loaded");
        Ok(count)
    }

    /// Reload from the last root passed to `reload_from_dir`
    pub fn reload(&self) -> Result<usize> {
        let root = self.root.read().clone();
        match root {
            Some(root) => self.reload_from_dir(root),
            None => Err(EngineError::ConfigError {
                reason: "task set registry has no source directory".to_string(),
            }),
        }
    }

    /// Add or replace one definition
    pub fn insert(&self, task_set: TaskSetDefinition) -> Arc<TaskSetDefinition> {
        let task_set = Arc::new(task_set);
        self.sets
            .write()
            .insert(task_set.id.clone(), Arc::clone(&task_set));
        task_set
    }

    pub fn get(&self, id: &str) -> Option<Arc<TaskSetDefinition>> {
        self.sets.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<TaskSetDefinition>> {
        self.sets.write().remove(id)
    }

    /// All registered sets, sorted by id
    pub fn list(&self) -> Vec<Arc<TaskSetDefinition>> {
        let mut sets: Vec<_> = self.sets.read().values().cloned().collect();
        sets.sort_by(|a, b| a.id.cmp(&b.id));
        sets
    }

    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskSetSource for TaskSetRegistry {
    fn get_task_set(&self, id: &str) -> Result<Arc<TaskSetDefinition>> {
        self.get(id).ok_or_else(|| EngineError::TaskSetNotFound { id: id.to_string() })
    }
}

/// Directories one level below `root` that hold a task-set descriptor
fn task_set_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name();
            name == JSON_FILE || name == YAML_FILE
        })
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TaskDefinition;
    use tempfile::TempDir;

    fn write_set(root: &Path, id: &str, version: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(JSON_FILE),
            format!(
                r#"{{"schema_id":"{}","version":"{}","skills":[{{"id":"s","prompt":"p"}}]}}"#,
                id, version
            ),
        )
        .unwrap();
    }

    #[test]
    fn loads_every_directory_and_skips_broken_ones() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "alpha", "1");
        write_set(root.path(), "beta", "1");
        std::fs::create_dir_all(root.path().join("broken")).unwrap();
        std::fs::write(root.path().join("broken").join(JSON_FILE), "{").unwrap();
        std::fs::create_dir_all(root.path().join("not_a_set")).unwrap();

        let registry = TaskSetRegistry::from_dir(root.path()).unwrap();
        let ids: Vec<String> = registry.list().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn reload_swaps_snapshot_without_touching_held_arcs() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "alpha", "1");
        let registry = TaskSetRegistry::from_dir(root.path()).unwrap();
        let held = registry.get_task_set("alpha").unwrap();

        write_set(root.path(), "alpha", "2");
        registry.reload().unwrap();

        assert_eq!(held.version, "1");
        assert_eq!(registry.get_task_set("alpha").unwrap().version, "2");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = TaskSetRegistry::new();
        registry.insert(TaskSetDefinition::new("x", "1").with_task(TaskDefinition::new("a", "A")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_task_set("y").unwrap_err().code(), "SKR-001");
        assert!(registry.remove("x").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = TaskSetRegistry::new()
            .reload_from_dir("/definitely/not/here")
            .unwrap_err();
        assert_eq!(err.code(), "SKR-005");
    }
}

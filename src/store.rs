use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info};
use tokio::fs;

use crate::models::Task;

const TASKS_FILE_NAME: &str = "tasks.json";

/// JSON-file task store. The whole collection lives under one well-known
/// path and is rewritten atomically enough for a single-user tool.
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default store location under the platform data dir.
    pub fn default_path() -> Result<PathBuf, String> {
        let mut base = dirs::data_dir().ok_or_else(|| "failed to resolve data dir".to_string())?;
        base.push("taskping");
        base.push(TASKS_FILE_NAME);
        Ok(base)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the full collection; a missing file is an empty list, and a
    /// record that fails to decode drops the whole load as an error rather
    /// than silently losing tasks.
    pub async fn load(&self) -> Result<Vec<Task>, String> {
        if !self.path.exists() {
            debug!("no task file at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|err| format!("failed to read tasks: {err}"))?;

        serde_json::from_str(&content).map_err(|err| format!("invalid task file: {err}"))
    }

    pub async fn save(&self, tasks: &[Task]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| format!("failed to create data directory: {err}"))?;
        }

        let serialized = serde_json::to_string_pretty(tasks)
            .map_err(|err| format!("failed to serialize tasks: {err}"))?;

        fs::write(&self.path, serialized)
            .await
            .map_err(|err| format!("failed to write tasks: {err}"))
    }

    pub async fn add(&self, task: Task) -> Result<Task, String> {
        let mut tasks = self.load().await?;
        tasks.push(task.clone());
        self.save(&tasks).await?;
        info!("added task {} '{}'", task.id, task.title);
        Ok(task)
    }

    /// Applies an edit to one task and persists the collection.
    pub async fn update<F>(&self, id: &str, apply: F) -> Result<Task, String>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.load().await?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| format!("no task with id {id}"))?;
        apply(task);
        let updated = task.clone();
        self.save(&tasks).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<Task, String> {
        let mut tasks = self.load().await?;
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| format!("no task with id {id}"))?;
        let removed = tasks.remove(index);
        self.save(&tasks).await?;
        info!("deleted task {} '{}'", removed.id, removed.title);
        Ok(removed)
    }

    pub async fn set_completed(&self, id: &str, completed: bool) -> Result<Task, String> {
        self.update(id, |task| task.completed = completed).await
    }

    /// Store file mtime in epoch ms, used by the change watcher.
    pub async fn modified_ms(&self) -> Option<i64> {
        let meta = fs::metadata(&self.path).await.ok()?;
        let modified = meta.modified().ok()?;
        let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(elapsed.as_millis() as i64)
    }
}

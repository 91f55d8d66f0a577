//! Write-through task storage. The pipeline never reads from within a job;
//! reads exist only for tests and for reporting after a run completes.

use crate::error::StorageError;
use crate::model::{FailedComment, Task};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait TaskStorage: Send + Sync {
    async fn save_task(&self, pr_number: u64, task: Task) -> Result<(), StorageError>;
    async fn save_failed_comment(&self, pr_number: u64, failure: FailedComment) -> Result<(), StorageError>;
    async fn load_tasks(&self, pr_number: u64) -> Result<Vec<Task>, StorageError>;
    async fn load_failed_comments(&self, pr_number: u64) -> Result<Vec<FailedComment>, StorageError>;
}

/// One task collection and one sibling `failed_comments` log per PR, both
/// JSON files under `root_dir`, written atomically (temp file + rename)
/// with a best-effort `.backup` sibling kept from the prior write.
pub struct JsonFileTaskStorage {
    root_dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileTaskStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn tasks_path(&self, pr_number: u64) -> PathBuf {
        self.root_dir.join(format!("pr-{pr_number}-tasks.json"))
    }

    fn failed_path(&self, pr_number: u64) -> PathBuf {
        self.root_dir.join(format!("pr-{pr_number}-failed_comments.json"))
    }
}

fn load_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let text = std::fs::read_to_string(path).map_err(|e| StorageError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| StorageError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    if path.exists() {
        let mut backup = path.as_os_str().to_os_string();
        backup.push(".backup");
        let _ = std::fs::copy(path, PathBuf::from(backup));
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    std::fs::write(&tmp, json).map_err(|e| StorageError::Write {
        path: path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Rename {
        path: path.display().to_string(),
        source: e,
    })
}

#[async_trait]
impl TaskStorage for JsonFileTaskStorage {
    async fn save_task(&self, pr_number: u64, task: Task) -> Result<(), StorageError> {
        let path = self.tasks_path(pr_number);
        let _guard = self.lock.lock().expect("task storage mutex poisoned");
        let mut tasks: Vec<Task> = load_json(&path)?;
        tasks.push(task);
        save_json(&path, &tasks)
    }

    async fn save_failed_comment(&self, pr_number: u64, failure: FailedComment) -> Result<(), StorageError> {
        let path = self.failed_path(pr_number);
        let _guard = self.lock.lock().expect("task storage mutex poisoned");
        let mut failures: Vec<FailedComment> = load_json(&path)?;
        failures.push(failure);
        save_json(&path, &failures)
    }

    async fn load_tasks(&self, pr_number: u64) -> Result<Vec<Task>, StorageError> {
        load_json(&self.tasks_path(pr_number))
    }

    async fn load_failed_comments(&self, pr_number: u64) -> Result<Vec<FailedComment>, StorageError> {
        load_json(&self.failed_path(pr_number))
    }
}

/// In-memory implementation for tests, keyed by PR number.
#[derive(Default)]
pub struct InMemoryTaskStorage {
    tasks: Mutex<HashMap<u64, Vec<Task>>>,
    failed: Mutex<HashMap<u64, Vec<FailedComment>>>,
}

impl InMemoryTaskStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStorage for InMemoryTaskStorage {
    async fn save_task(&self, pr_number: u64, task: Task) -> Result<(), StorageError> {
        self.tasks
            .lock()
            .expect("in-memory storage mutex poisoned")
            .entry(pr_number)
            .or_default()
            .push(task);
        Ok(())
    }

    async fn save_failed_comment(&self, pr_number: u64, failure: FailedComment) -> Result<(), StorageError> {
        self.failed
            .lock()
            .expect("in-memory storage mutex poisoned")
            .entry(pr_number)
            .or_default()
            .push(failure);
        Ok(())
    }

    async fn load_tasks(&self, pr_number: u64) -> Result<Vec<Task>, StorageError> {
        Ok(self
            .tasks
            .lock()
            .expect("in-memory storage mutex poisoned")
            .get(&pr_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_failed_comments(&self, pr_number: u64) -> Result<Vec<FailedComment>, StorageError> {
        Ok(self
            .failed
            .lock()
            .expect("in-memory storage mutex poisoned")
            .get(&pr_number)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, TaskStatus};
    use chrono::Utc;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            description: "do a thing".into(),
            priority: Priority::Medium,
            origin_text: None,
            source_review_id: 1,
            source_comment_id: 1,
            file: None,
            line: None,
            task_index: 0,
            status: TaskStatus::Todo,
            pr_number: 42,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn json_storage_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileTaskStorage::new(dir.path());
        storage.save_task(42, sample_task("a")).await.unwrap();
        storage.save_task(42, sample_task("b")).await.unwrap();

        let tasks = storage.load_tasks(42).await.unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn json_storage_keeps_a_backup_on_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileTaskStorage::new(dir.path());
        storage.save_task(1, sample_task("a")).await.unwrap();
        storage.save_task(1, sample_task("b")).await.unwrap();

        let backup = dir.path().join("pr-1-tasks.json.backup");
        assert!(backup.exists());
    }

    #[tokio::test]
    async fn in_memory_storage_isolates_by_pr_number() {
        let storage = InMemoryTaskStorage::new();
        storage.save_task(1, sample_task("a")).await.unwrap();
        storage.save_task(2, sample_task("b")).await.unwrap();

        assert_eq!(storage.load_tasks(1).await.unwrap().len(), 1);
        assert_eq!(storage.load_tasks(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileTaskStorage::new(dir.path());
        assert!(storage.load_tasks(99).await.unwrap().is_empty());
    }
}

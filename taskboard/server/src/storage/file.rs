use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{MemoryStore, Storage, StorageError};
use crate::task::{NewTask, Task, TaskChanges};
use crate::user::{NewUser, User};

#[derive(Debug, thiserror::Error)]
enum TasksFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Memory store whose tasks are mirrored to a JSON file.
///
/// The whole task list is rewritten after every successful mutation. A failed
/// write is logged and otherwise ignored: the mutation still succeeds and the
/// file catches up on the next successful write. Concurrent writers race and
/// the last one wins. Users live in memory only.
#[derive(Debug)]
pub struct FileStore {
    memory: MemoryStore,
    path: PathBuf,
}

impl FileStore {
    /// Opens the store, loading tasks from `path`.
    ///
    /// A missing, unreadable or malformed file never fails start-up; the store
    /// starts empty instead.
    #[tracing::instrument]
    pub async fn open(path: PathBuf) -> Self {
        let tasks = match read_tasks(&path).await {
            Ok(tasks) => {
                tracing::info!("Loaded {} tasks from {}", tasks.len(), path.display());
                tasks
            }
            Err(TasksFileError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("No tasks file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(
                    "Could not load tasks from {}, starting empty: {}",
                    path.display(),
                    err
                );
                Vec::new()
            }
        };

        Self {
            memory: MemoryStore::with_tasks(tasks),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn save(&self) {
        let tasks = self.memory.tasks_in_insertion_order().await;
        if let Err(err) = write_tasks(&self.path, &tasks).await {
            tracing::error!("Failed to save tasks to file: {}", err);
        }
    }
}

async fn read_tasks(path: &Path) -> Result<Vec<Task>, TasksFileError> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

async fn write_tasks(path: &Path, tasks: &[Task]) -> Result<(), TasksFileError> {
    let json = serde_json::to_string_pretty(tasks)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[async_trait]
impl Storage for FileStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StorageError> {
        self.memory.get_user(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.memory.get_user_by_username(username).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StorageError> {
        self.memory.create_user(new_user).await
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>, StorageError> {
        self.memory.get_all_tasks().await
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        self.memory.get_task(id).await
    }

    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError> {
        let task = self.memory.create_task(new_task).await?;
        self.save().await;
        Ok(task)
    }

    async fn update_task(
        &self,
        id: &str,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StorageError> {
        let updated = self.memory.update_task(id, changes).await?;
        if updated.is_some() {
            self.save().await;
        }
        Ok(updated)
    }

    async fn delete_task(&self, id: &str) -> Result<bool, StorageError> {
        let deleted = self.memory.delete_task(id).await?;
        if deleted {
            self.save().await;
        }
        Ok(deleted)
    }
}

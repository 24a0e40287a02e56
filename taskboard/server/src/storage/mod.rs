//! Persistence for tasks and users.
//!
//! Every backend implements [`Storage`]. Exactly one backend is chosen at
//! start-up by [`StorageBackend::from_config`] and opened with [`connect`];
//! the resulting [`StorageHandle`] is handed to the web layer.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, FallbackStorage};
use crate::task::{NewTask, Task, TaskChanges};
use crate::user::{NewUser, User};

mod clock;
mod file;
mod memory;
mod relational;

pub use clock::Clock;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use relational::RelationalStore;

/// File the file store uses when no path is configured, relative to the working directory.
pub const DEFAULT_TASKS_FILE: &str = "tasks.json";

/// Error type for storage operations.
///
/// Missing records are not errors; lookups return `None` and deletes return `false`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Represents an attempt to register a username that already exists.
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),
    /// Represents a stored row that cannot be mapped back to a domain value.
    #[error("Malformed data: {0}")]
    MalformedData(String),
}

/// Operations every storage backend provides.
///
/// Each call is an independent unit of work; there are no cross-call transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StorageError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, StorageError>;

    /// Returns all tasks, newest `created_at` first.
    async fn get_all_tasks(&self) -> Result<Vec<Task>, StorageError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError>;

    /// Creates a task with a fresh id, defaulting status to pending and priority to medium.
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError>;

    /// Merges `changes` into the task and refreshes `updated_at`. Returns `None` for unknown ids.
    async fn update_task(
        &self,
        id: &str,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StorageError>;

    /// Returns whether a task was actually removed.
    async fn delete_task(&self, id: &str) -> Result<bool, StorageError>;
}

/// Shared handle to the store selected at start-up.
pub type StorageHandle = Arc<dyn Storage>;

/// The backend a process runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    File(PathBuf),
    Relational(String),
}

impl StorageBackend {
    /// Chooses the backend: a database URL wins, then the configured fallback.
    pub fn from_config(config: &Config) -> Self {
        if let Some(url) = config.database_url() {
            return StorageBackend::Relational(url.to_string());
        }
        match config.storage {
            FallbackStorage::Memory => StorageBackend::Memory,
            FallbackStorage::File => StorageBackend::File(
                config
                    .tasks_file
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TASKS_FILE)),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File(_) => "file",
            StorageBackend::Relational(_) => "relational",
        }
    }
}

/// Opens the selected backend. Called once during process start-up.
#[tracing::instrument(skip_all, fields(backend = backend.name()))]
pub async fn connect(backend: StorageBackend) -> Result<StorageHandle, StorageError> {
    let store: StorageHandle = match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File(path) => Arc::new(FileStore::open(path).await),
        StorageBackend::Relational(url) => Arc::new(RelationalStore::connect(url).await?),
    };
    tracing::info!("Storage backend ready");
    Ok(store)
}

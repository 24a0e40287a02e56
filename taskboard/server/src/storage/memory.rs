use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Clock, Storage, StorageError};
use crate::task::{NewTask, Task, TaskChanges};
use crate::user::{NewUser, User};

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<String, User>,
    /// Kept in insertion order.
    tasks: Vec<Task>,
}

impl Collections {
    fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }
}

/// Process-local store. Everything is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    clock: Clock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `tasks`. A repeated id replaces the earlier entry in place.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let clock = Clock::new();
        let mut collections = Collections::default();
        for task in tasks {
            clock.observe(task.created_at);
            clock.observe(task.updated_at);
            match collections.find_task_mut(&task.id) {
                Some(existing) => *existing = task,
                None => collections.tasks.push(task),
            }
        }
        Self {
            collections: RwLock::new(collections),
            clock,
        }
    }

    /// Returns every task in insertion order.
    pub async fn tasks_in_insertion_order(&self) -> Vec<Task> {
        self.collections.read().await.tasks.clone()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StorageError> {
        Ok(self.collections.read().await.users.get(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StorageError> {
        let mut collections = self.collections.write().await;
        if collections
            .users
            .values()
            .any(|user| user.username == new_user.username)
        {
            return Err(StorageError::UsernameTaken(new_user.username));
        }
        let user = User::from_new(Uuid::new_v4().to_string(), new_user);
        collections.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_all_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let collections = self.collections.read().await;
        // Reversed first so the stable sort puts later insertions ahead on equal timestamps.
        let mut tasks: Vec<Task> = collections.tasks.iter().rev().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections.tasks.iter().find(|task| task.id == id).cloned())
    }

    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError> {
        let mut collections = self.collections.write().await;
        let task = Task::from_new(Uuid::new_v4().to_string(), new_task, self.clock.now());
        collections.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(
        &self,
        id: &str,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(task) = collections.find_task_mut(id) else {
            return Ok(None);
        };
        task.apply(changes, self.clock.now());
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        let before = collections.tasks.len();
        collections.tasks.retain(|task| task.id != id);
        Ok(collections.tasks.len() != before)
    }
}

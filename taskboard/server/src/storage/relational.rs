use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use super::{Storage, StorageError};
use crate::entities::{task, user};
use crate::task::{NewTask, Task, TaskChanges, TaskPriority, TaskStatus};
use crate::user::{NewUser, User};
use migration::MigratorTrait;

/// Store backed by the `users` and `tasks` tables.
///
/// `created_at` and `updated_at` both come from the database clock.
pub struct RelationalStore {
    db: DatabaseConnection,
}

impl TryFrom<task::Model> for Task {
    type Error = StorageError;

    fn try_from(model: task::Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse::<TaskStatus>()
            .map_err(|err| StorageError::MalformedData(format!("task {}: {}", model.id, err)))?;
        let priority = model
            .priority
            .parse::<TaskPriority>()
            .map_err(|err| StorageError::MalformedData(format!("task {}: {}", model.id, err)))?;
        Ok(Task {
            id: model.id,
            title: model.title,
            status,
            priority,
            due_date: model.due_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User {
            id: model.id,
            username: model.username,
            password: model.password,
        }
    }
}

impl RelationalStore {
    /// Wraps an already migrated connection.
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects to the database and applies pending migrations.
    pub async fn connect(options: impl Into<ConnectOptions>) -> Result<Self, StorageError> {
        let db = Database::connect(options).await?;
        migration::Migrator::up(&db, None).await?;
        tracing::info!("Database migrations applied successfully");
        Ok(Self::new(db))
    }

    async fn find_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        task::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?
            .map(Task::try_from)
            .transpose()
    }
}

#[async_trait]
impl Storage for RelationalStore {
    #[tracing::instrument(skip(self))]
    async fn get_user(&self, id: &str) -> Result<Option<User>, StorageError> {
        let model = user::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await?;
        Ok(model.map(User::from))
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        Ok(model.map(User::from))
    }

    /// Relies on the unique index on `username`, so concurrent registrations cannot both succeed.
    #[tracing::instrument(skip(self, new_user), fields(username = %new_user.username))]
    async fn create_user(&self, new_user: NewUser) -> Result<User, StorageError> {
        let username = new_user.username.clone();
        let active_model = user::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            username: ActiveValue::Set(new_user.username),
            password: ActiveValue::Set(new_user.password),
        };
        match active_model.insert(&self.db).await {
            Ok(created_model) => Ok(User::from(created_model)),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(StorageError::UsernameTaken(username))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_tasks(&self) -> Result<Vec<Task>, StorageError> {
        task::Entity::find()
            .order_by_desc(task::Column::CreatedAt)
            // Rows stamped in the same instant still list in a fixed order.
            .order_by_desc(task::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Task::try_from)
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        self.find_task(id).await
    }

    /// Leaves both timestamps to the column defaults, so they match the clock `update_task` uses.
    #[tracing::instrument(skip(self))]
    async fn create_task(&self, new_task: NewTask) -> Result<Task, StorageError> {
        let status = new_task.status.unwrap_or_default();
        let priority = new_task.priority.unwrap_or_default();
        let active_model = task::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            title: ActiveValue::Set(new_task.title.trim().to_string()),
            status: ActiveValue::Set(status.as_str().to_string()),
            priority: ActiveValue::Set(priority.as_str().to_string()),
            due_date: ActiveValue::Set(new_task.due_date),
            ..Default::default()
        };
        let created_model = active_model.insert(&self.db).await?;
        Task::try_from(created_model)
    }

    /// Writes the supplied fields in a single statement with `updated_at` set by the database.
    #[tracing::instrument(skip(self))]
    async fn update_task(
        &self,
        id: &str,
        changes: TaskChanges,
    ) -> Result<Option<Task>, StorageError> {
        let mut update = task::Entity::update_many()
            .col_expr(task::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(task::Column::Id.eq(id));
        if let Some(title) = changes.title {
            update = update.col_expr(task::Column::Title, Expr::value(title.trim().to_string()));
        }
        if let Some(status) = changes.status {
            update = update.col_expr(task::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(priority) = changes.priority {
            update = update.col_expr(task::Column::Priority, Expr::value(priority.as_str()));
        }
        if let Some(due_date) = changes.due_date {
            update = update.col_expr(task::Column::DueDate, Expr::value(due_date));
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_task(id).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_task(&self, id: &str) -> Result<bool, StorageError> {
        let result = task::Entity::delete_by_id(id.to_owned())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

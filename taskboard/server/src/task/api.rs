use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use axum_extra::extract::WithRejection;

use crate::storage::StorageHandle;
use crate::task::{NewTask, Task, TaskChanges};
use crate::web::{ApiError, MessageResponse};

/// State shared by the task handlers.
#[derive(Clone)]
pub struct TaskState {
    pub storage: StorageHandle,
}

/// Handler for GET /api/tasks - Returns every task, newest first.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks",
    responses(
        (status = 200, description = "All tasks, newest first", body = [Task]),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<TaskState>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state
        .storage
        .get_all_tasks()
        .await
        .map_err(|err| ApiError::storage("Failed to retrieve tasks", err))?;
    Ok(Json(tasks))
}

/// Handler for GET /api/tasks/{id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "The task", body = Task),
        (status = 404, description = "Unknown task", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<TaskState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .storage
        .get_task(&id)
        .await
        .map_err(|err| ApiError::storage("Failed to retrieve task", err))?;
    task.map(Json).ok_or(ApiError::TaskNotFound(id))
}

/// Handler for POST /api/tasks - Creates a task and answers 201 with it.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = NewTask,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Missing, blank or malformed input", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<TaskState>,
    WithRejection(Json(new_task), _): WithRejection<Json<NewTask>, ApiError>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    new_task.validate()?;
    let task = state
        .storage
        .create_task(new_task)
        .await
        .map_err(|err| ApiError::storage("Failed to create task", err))?;
    tracing::info!("Created task {}", task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

/// Handler for PATCH /api/tasks/{id} - Merges the supplied fields into the task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task identifier")),
    request_body = TaskChanges,
    responses(
        (status = 200, description = "Updated task", body = Task),
        (status = 400, description = "Blank title or malformed body", body = MessageResponse),
        (status = 404, description = "Unknown task", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<TaskState>,
    Path(id): Path<String>,
    WithRejection(Json(changes), _): WithRejection<Json<TaskChanges>, ApiError>,
) -> Result<Json<Task>, ApiError> {
    changes.validate()?;
    let updated = state
        .storage
        .update_task(&id, changes)
        .await
        .map_err(|err| ApiError::storage("Failed to update task", err))?;
    updated.map(Json).ok_or(ApiError::TaskNotFound(id))
}

/// Handler for DELETE /api/tasks/{id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "Task deleted", body = MessageResponse),
        (status = 404, description = "Unknown task", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<TaskState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .storage
        .delete_task(&id)
        .await
        .map_err(|err| ApiError::storage("Failed to delete task", err))?;
    if !deleted {
        return Err(ApiError::TaskNotFound(id));
    }
    tracing::info!("Deleted task {}", id);
    Ok(Json(MessageResponse::new("Task deleted")))
}

/// Creates and returns the tasks API router. Paths are relative to `/api`.
pub fn create_api_router(storage: StorageHandle) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route(
            "/tasks/{id}",
            get(get_task_handler)
                .patch(update_task_handler)
                .delete(delete_task_handler),
        )
        .with_state(TaskState { storage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockStorage, StorageError};
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use sea_orm::DbErr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn database_down() -> StorageError {
        StorageError::Database(DbErr::Custom("connection refused".to_string()))
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn can_answer_500_when_create_fails() {
        let mut storage = MockStorage::new();
        storage
            .expect_create_task()
            .times(1)
            .returning(|_| Err(database_down()));
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(json_request("POST", "/tasks", r#"{"title": "Buy milk"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Failed to create task"})
        );
    }

    #[tokio::test]
    async fn can_answer_500_when_listing_fails() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_all_tasks()
            .returning(|| Err(database_down()));
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(Request::builder().uri("/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Failed to retrieve tasks"})
        );
    }

    #[tokio::test]
    async fn can_reject_blank_title_without_touching_storage() {
        let mut storage = MockStorage::new();
        storage.expect_create_task().never();
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(json_request("POST", "/tasks", r#"{"title": "   "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Task title must not be empty"})
        );
    }

    #[tokio::test]
    async fn can_reject_malformed_body_with_json_message() {
        let mut storage = MockStorage::new();
        storage.expect_create_task().never();
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(json_request("POST", "/tasks", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn can_reject_unknown_status_value() {
        let mut storage = MockStorage::new();
        storage.expect_update_task().never();
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(json_request("PATCH", "/tasks/abc", r#"{"status": "archived"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn can_answer_404_when_update_target_is_missing() {
        let mut storage = MockStorage::new();
        storage
            .expect_update_task()
            .withf(|id, changes| id == "missing" && changes.status.is_some())
            .returning(|_, _| Ok(None));
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(json_request("PATCH", "/tasks/missing", r#"{"status": "done"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Task not found"})
        );
    }

    #[tokio::test]
    async fn can_answer_500_when_delete_fails() {
        let mut storage = MockStorage::new();
        storage
            .expect_delete_task()
            .returning(|_| Err(database_down()));
        let app = create_api_router(Arc::new(storage));

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/tasks/abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Failed to delete task"})
        );
    }
}

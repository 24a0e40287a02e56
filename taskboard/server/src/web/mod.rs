use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::storage::{self, StorageBackend, StorageError, StorageHandle};
use crate::task::TaskValidationError;

pub mod api;

/// JSON body used for every error and for delete confirmations.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error type for JSON API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents a malformed body or a value that fails validation.
    #[error("{0}")]
    InvalidRequest(String),
    /// Represents an id that matches no task.
    #[error("Task {0} not found")]
    TaskNotFound(String),
    /// Represents a path outside the API.
    #[error("Not found")]
    RouteNotFound,
    /// Represents a failed storage call. `context` is what the caller sees.
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: StorageError,
    },
}

impl ApiError {
    pub fn storage(context: &'static str, source: StorageError) -> Self {
        ApiError::Storage { context, source }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<TaskValidationError> for ApiError {
    fn from(err: TaskValidationError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, message) = match self {
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "Task not found".to_string()),
            ApiError::RouteNotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Storage { context, source } => {
                tracing::error!("{}: {}", context, source);
                (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
            }
        };

        (status_code, Json(MessageResponse::new(message))).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::task::api::list_tasks_handler,
        crate::task::api::get_task_handler,
        crate::task::api::create_task_handler,
        crate::task::api::update_task_handler,
        crate::task::api::delete_task_handler,
    ),
    components(schemas(
        crate::task::Task,
        crate::task::NewTask,
        crate::task::TaskChanges,
        crate::task::TaskStatus,
        crate::task::TaskPriority,
        MessageResponse,
    )),
    tags((name = "Tasks", description = "Create, list, update and delete tasks"))
)]
pub struct ApiDoc;

/// Builds the full application router around an opened store.
///
/// Requests outside `/api` are served from `static_dir` when given, with
/// `index.html` as the fallback for client-side routes.
pub fn create_app(storage: StorageHandle, static_dir: Option<&Path>) -> Router {
    let app = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(api::create_api_router(storage))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let app = match static_dir {
        Some(dir) => app.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => app,
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(CorsLayer::new()),
    )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let backend = StorageBackend::from_config(&config);
    let storage = storage::connect(backend).await?;
    let app = create_app(storage, config.static_dir.as_deref());

    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
    tracing::info!("Shutting down");
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

/// Last-resort answer for a handler that panicked.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse::new("Internal Server Error")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sea_orm::DbErr;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn can_hide_storage_details_behind_context() {
        let error = ApiError::storage(
            "Failed to create task",
            StorageError::Database(DbErr::Custom("password=hunter2".to_string())),
        );

        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Failed to create task"})
        );
    }

    #[tokio::test]
    async fn can_map_validation_error_to_bad_request() {
        let response = ApiError::from(TaskValidationError::EmptyTitle).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Task title must not be empty"})
        );
    }

    #[tokio::test]
    async fn can_answer_panics_with_json_500() {
        let app = Router::new()
            .route(
                "/boom",
                axum::routing::get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .layer(CatchPanicLayer::custom(handle_panic));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"message": "Internal Server Error"})
        );
    }

    #[tokio::test]
    async fn can_check_health_endpoint() {
        let app = create_app(Arc::new(storage::MemoryStore::new()), None);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn can_serve_openapi_document() {
        let app = create_app(Arc::new(storage::MemoryStore::new()), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let document = body_json(response).await;
        assert!(document["paths"]["/api/tasks"].is_object());
        assert!(document["paths"]["/api/tasks/{id}"].is_object());
    }
}

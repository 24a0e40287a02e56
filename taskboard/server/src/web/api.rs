use axum::Router;

use crate::storage::StorageHandle;
use crate::web::ApiError;

/// Creates the routes for JSON API endpoints, all nested under `/api`.
pub fn create_api_router(storage: StorageHandle) -> Router {
    let tasks_router = crate::task::api::create_api_router(storage);
    Router::new().nest("/api", tasks_router.fallback(api_not_found_handler))
}

/// Keeps unknown API paths from falling through to the static asset handler.
async fn api_not_found_handler() -> ApiError {
    ApiError::RouteNotFound
}

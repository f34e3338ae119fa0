// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::AppState;
use crate::handlers;

/// Creates and configures the application router. Everything under
/// `/api/{user_id}/` requires a bearer token whose user matches the path.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/{user_id}/tasks", get(handlers::list_tasks))
        .route("/api/{user_id}/tasks", post(handlers::create_task))
        .route("/api/{user_id}/tasks/{task_id}", get(handlers::get_task))
        .route("/api/{user_id}/tasks/{task_id}", put(handlers::update_task))
        .route(
            "/api/{user_id}/tasks/{task_id}",
            delete(handlers::delete_task),
        )
        .route(
            "/api/{user_id}/tasks/{task_id}/complete",
            patch(handlers::toggle_complete),
        )
        .route("/api/{user_id}/chat", post(handlers::chat))
        // Adds the shared application state
        .with_state(state)
}

// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{ChatRequest, ChatResponse, CreateTaskPayload, Task, UpdateTaskPayload};
use tracing::{debug, error, info};

use crate::agent::AgentReply;
use crate::auth::{AuthUser, require_user_match};
use crate::database;
use crate::events::{TaskEvent, TaskEventKind};
use crate::AppState;

const TASK_NOT_FOUND: &str = "Task not found";

/// Liveness probe. Unauthenticated.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for listing all tasks of the authenticated user.
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Task>>, AppError> {
    require_user_match(&auth, &user_id)?;
    let tasks = database::get_tasks_for_user(&state.pool, &user_id).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

/// Handler for creating a new task.
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    require_user_match(&auth, &user_id)?;
    debug!("Received request to create task for user: {}", user_id);

    let validated = payload
        .validate()
        .map_err(|msg| AppError::bad_request(&msg))?;

    let new_task = database::create_task(&state.pool, &user_id, validated).await?;

    info!("Task created successfully with ID: {}", new_task.id);
    state
        .events
        .publish(TaskEvent::new(
            TaskEventKind::Created,
            &user_id,
            new_task.id,
            &new_task.title,
        ))
        .await;

    Ok((StatusCode::CREATED, Json(new_task)))
}

/// Handler for fetching a single task.
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<Json<Task>, AppError> {
    require_user_match(&auth, &user_id)?;
    let task = database::get_task(&state.pool, &user_id, task_id)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;
    Ok(Json(task))
}

/// Handler for partially updating a task.
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(String, i64)>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Result<Json<Task>, AppError> {
    require_user_match(&auth, &user_id)?;

    let changes = payload
        .validate()
        .map_err(|msg| AppError::bad_request(&msg))?;

    let task = database::apply_task_changes(&state.pool, &user_id, task_id, changes)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;

    state
        .events
        .publish(TaskEvent::new(
            TaskEventKind::Updated,
            &user_id,
            task.id,
            &task.title,
        ))
        .await;

    Ok(Json(task))
}

/// Handler for deleting a task by ID.
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_user_match(&auth, &user_id)?;
    debug!("Attempting to delete task with ID: {}", task_id);

    let task = database::delete_task(&state.pool, &user_id, task_id)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;

    state
        .events
        .publish(TaskEvent::new(
            TaskEventKind::Deleted,
            &user_id,
            task.id,
            &task.title,
        ))
        .await;

    Ok(Json(serde_json::json!({ "ok": true, "id": task_id })))
}

/// Handler for toggling a task's completion flag.
///
/// Toggle semantics: completing an already-completed task flips it back
/// to pending. The one-way variant lives on the agent tool path. Moving
/// to completed spawns the next occurrence of a recurring task.
pub async fn toggle_complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(String, i64)>,
) -> Result<Json<Task>, AppError> {
    require_user_match(&auth, &user_id)?;

    let outcome = database::toggle_task_completion(&state.pool, &user_id, task_id)
        .await?
        .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))?;

    if outcome.task.completed {
        state
            .events
            .publish(TaskEvent::new(
                TaskEventKind::Completed,
                &user_id,
                outcome.task.id,
                &outcome.task.title,
            ))
            .await;
        if let Some(next) = &outcome.successor {
            info!("Spawned successor task {} for task {}", next.id, task_id);
            state
                .events
                .publish(TaskEvent::new(
                    TaskEventKind::Spawned,
                    &user_id,
                    next.id,
                    &next.title,
                ))
                .await;
        }
    }

    Ok(Json(outcome.task))
}

/// Handler for the chat endpoint. Persists both sides of the exchange and
/// answers through the tool-calling agent. Agent failures degrade to an
/// apologetic reply instead of an error status.
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require_user_match(&auth, &user_id)?;

    let user_message = payload.message.trim().to_string();
    if user_message.is_empty() {
        return Err(AppError::bad_request("message is required"));
    }

    let conversation = match payload.conversation_id {
        Some(id) => database::get_conversation(&state.pool, &user_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation not found"))?,
        None => database::create_conversation(&state.pool, &user_id).await?,
    };

    let history = database::get_messages(&state.pool, conversation.id).await?;
    database::insert_message(&state.pool, &user_id, conversation.id, "user", &user_message).await?;

    let reply = match state
        .agent
        .run(&state, &user_id, &history, &user_message)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!("Chat agent failed: {e:?}");
            AgentReply {
                response: format!("Sorry, I encountered an error: {e}"),
                tool_calls: Vec::new(),
            }
        }
    };

    database::insert_message(
        &state.pool,
        &user_id,
        conversation.id,
        "assistant",
        &reply.response,
    )
    .await?;

    Ok(Json(ChatResponse {
        conversation_id: conversation.id,
        response: reply.response,
        tool_calls: reply.tool_calls,
    }))
}

// --- Custom Error Handling ---
// Transforms internal errors into appropriate HTTP responses.

/// Our custom error type for the application.
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    pub(crate) fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub(crate) fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(crate) fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub(crate) fn forbidden(message: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

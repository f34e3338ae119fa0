// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Task-management tools exposed to the chat agent. Every tool is
//! owner-scoped and returns plain JSON: either a result object or
//! `{"error": "..."}`. Tool failures are data for the model, never
//! HTTP errors.
use common::{CreateTaskPayload, Task, UpdateTaskPayload};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::error;

use crate::events::{TaskEvent, TaskEventKind};
use crate::{AppState, database, search};

const TASK_NOT_FOUND: &str = "Task not found";

/// Tool definitions in OpenAI function-calling format, consumed by the
/// chat agent when building its requests.
pub fn definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "add_task",
                "description": "Create a new task. priority: 'low', 'medium', 'high'. tags: comma-separated. due_date: ISO 8601. recurring_rule: 'daily', 'weekly', 'monthly'.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": { "type": "string" },
                        "tags": { "type": "string" },
                        "due_date": { "type": "string" },
                        "recurring_rule": { "type": "string" }
                    },
                    "required": ["title"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "list_tasks",
                "description": "List tasks with filtering. status: 'all' | 'pending' | 'completed'. Optional priority and tag filters.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "status": { "type": "string" },
                        "priority": { "type": "string" },
                        "tag": { "type": "string" }
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "search_tasks",
                "description": "Semantic search for tasks. Use this for vague queries like 'What do I need to do?' or 'Any chores?'. Returns tasks relevant to the query based on meaning.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "limit": { "type": "integer" }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "complete_task",
                "description": "Mark a task as complete. Completing a recurring task schedules its next occurrence. Re-completing an already-completed task does nothing.",
                "parameters": {
                    "type": "object",
                    "properties": { "task_id": { "type": "integer" } },
                    "required": ["task_id"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "delete_task",
                "description": "Delete a task by id.",
                "parameters": {
                    "type": "object",
                    "properties": { "task_id": { "type": "integer" } },
                    "required": ["task_id"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "update_task",
                "description": "Update task details. Only the provided fields change.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "task_id": { "type": "integer" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": { "type": "string" },
                        "tags": { "type": "string" },
                        "due_date": { "type": "string" },
                        "recurring_rule": { "type": "string" }
                    },
                    "required": ["task_id"]
                }
            }
        }
    ])
}

/// Runs one tool call by name. Unknown names report an error object so
/// the model can recover.
pub async fn dispatch(state: &AppState, user_id: &str, name: &str, args: &Value) -> Value {
    match name {
        "add_task" => add_task(state, user_id, args).await,
        "list_tasks" => list_tasks(state, user_id, args).await,
        "search_tasks" => search_tasks(state, user_id, args).await,
        "complete_task" => complete_task(state, user_id, args).await,
        "delete_task" => delete_task(state, user_id, args).await,
        "update_task" => update_task(state, user_id, args).await,
        other => json!({ "error": format!("unknown tool: {other}") }),
    }
}

fn internal_error(e: anyhow::Error) -> Value {
    error!("Tool failed: {e:?}");
    json!({ "error": "An internal error occurred." })
}

fn task_json(task: &Task) -> Value {
    json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "completed": task.completed,
        "priority": task.priority,
        "tags": task.tags,
        "due_date": task.due_date.map(|d| d.to_rfc3339()),
        "recurring_rule": task.recurring_rule,
        "created_at": task.created_at.to_rfc3339(),
    })
}

async fn add_task(state: &AppState, user_id: &str, args: &Value) -> Value {
    let payload: CreateTaskPayload = match serde_json::from_value(args.clone()) {
        Ok(p) => p,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };
    let validated = match payload.validate() {
        Ok(v) => v,
        Err(msg) => return json!({ "error": msg }),
    };
    match database::create_task(&state.pool, user_id, validated).await {
        Ok(task) => {
            state
                .events
                .publish(TaskEvent::new(
                    TaskEventKind::Created,
                    user_id,
                    task.id,
                    &task.title,
                ))
                .await;
            json!({ "task_id": task.id, "status": "created", "title": task.title })
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct ListArgs {
    status: Option<String>,
    priority: Option<String>,
    tag: Option<String>,
}

async fn list_tasks(state: &AppState, user_id: &str, args: &Value) -> Value {
    let filters: ListArgs = match serde_json::from_value(args.clone()) {
        Ok(f) => f,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };

    let priority_filter = match filters.priority.as_deref() {
        None => None,
        Some(raw) => match common::Priority::parse(raw) {
            Some(p) => Some(p),
            None => return json!({ "error": "priority filter must be low, medium or high" }),
        },
    };

    let mut tasks = match database::get_tasks_for_user(&state.pool, user_id).await {
        Ok(tasks) => tasks,
        Err(e) => return internal_error(e),
    };

    match filters.status.as_deref().unwrap_or("all") {
        "pending" => tasks.retain(|t| !t.completed),
        "completed" => tasks.retain(|t| t.completed),
        _ => {}
    }
    if let Some(priority) = priority_filter {
        tasks.retain(|t| t.priority == priority);
    }
    if let Some(tag) = filters.tag.as_deref() {
        tasks.retain(|t| {
            t.tags
                .as_deref()
                .is_some_and(|tags| tags.split(',').any(|candidate| candidate.trim() == tag))
        });
    }

    Value::Array(tasks.iter().map(task_json).collect())
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    limit: Option<usize>,
}

async fn search_tasks(state: &AppState, user_id: &str, args: &Value) -> Value {
    let search_args: SearchArgs = match serde_json::from_value(args.clone()) {
        Ok(a) => a,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };
    match search::search_tasks(
        &state.pool,
        state.embeddings.as_ref(),
        user_id,
        &search_args.query,
        search_args.limit,
    )
    .await
    {
        Ok(results) => json!(results),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct IdArgs {
    task_id: i64,
}

async fn complete_task(state: &AppState, user_id: &str, args: &Value) -> Value {
    let IdArgs { task_id } = match serde_json::from_value(args.clone()) {
        Ok(a) => a,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };
    match database::complete_task_once(&state.pool, user_id, task_id).await {
        Ok(None) => json!({ "error": TASK_NOT_FOUND }),
        Ok(Some(receipt)) => {
            if receipt.status == crate::recurrence::CompletionStatus::Completed {
                state
                    .events
                    .publish(TaskEvent::new(
                        TaskEventKind::Completed,
                        user_id,
                        receipt.task_id,
                        &receipt.title,
                    ))
                    .await;
                if let Some(next_id) = receipt.next_task_id {
                    state
                        .events
                        .publish(TaskEvent::new(
                            TaskEventKind::Spawned,
                            user_id,
                            next_id,
                            &receipt.title,
                        ))
                        .await;
                }
            }
            json!(receipt)
        }
        Err(e) => internal_error(e),
    }
}

async fn delete_task(state: &AppState, user_id: &str, args: &Value) -> Value {
    let IdArgs { task_id } = match serde_json::from_value(args.clone()) {
        Ok(a) => a,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };
    match database::delete_task(&state.pool, user_id, task_id).await {
        Ok(None) => json!({ "error": TASK_NOT_FOUND }),
        Ok(Some(task)) => {
            state
                .events
                .publish(TaskEvent::new(
                    TaskEventKind::Deleted,
                    user_id,
                    task.id,
                    &task.title,
                ))
                .await;
            json!({ "task_id": task.id, "status": "deleted", "title": task.title })
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    task_id: i64,
    #[serde(flatten)]
    changes: UpdateTaskPayload,
}

async fn update_task(state: &AppState, user_id: &str, args: &Value) -> Value {
    let update: UpdateArgs = match serde_json::from_value(args.clone()) {
        Ok(a) => a,
        Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
    };
    let changes = match update.changes.validate() {
        Ok(c) => c,
        Err(msg) => return json!({ "error": msg }),
    };
    match database::apply_task_changes(&state.pool, user_id, update.task_id, changes).await {
        Ok(None) => json!({ "error": TASK_NOT_FOUND }),
        Ok(Some(task)) => {
            state
                .events
                .publish(TaskEvent::new(
                    TaskEventKind::Updated,
                    user_id,
                    task.id,
                    &task.title,
                ))
                .await;
            json!({ "task_id": task.id, "status": "updated", "title": task.title })
        }
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ChatAgent;
    use crate::config::AppConfig;
    use crate::embedding::EmbeddingProvider;
    use crate::events::EventPublisher;
    use anyhow::Result;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::Arc;

    struct FixedEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    async fn setup_state() -> AppState {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        database::create_schema(&pool).await.unwrap();
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            port: 0,
            auth_secret: "secret".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            embedding_model: "test".to_string(),
            chat_model: "test".to_string(),
            events_url: None,
        };
        AppState {
            pool,
            agent: Arc::new(ChatAgent::new(&config)),
            config: Arc::new(config),
            embeddings: Arc::new(FixedEmbeddings),
            events: EventPublisher::disabled(),
        }
    }

    #[tokio::test]
    async fn test_add_then_list_roundtrip() {
        let state = setup_state().await;

        let created = dispatch(
            &state,
            "alice",
            "add_task",
            &json!({ "title": "Buy milk", "priority": "high", "tags": "groceries" }),
        )
        .await;
        assert_eq!(created["status"], "created");
        assert_eq!(created["title"], "Buy milk");

        let listed = dispatch(&state, "alice", "list_tasks", &json!({})).await;
        let tasks = listed.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["priority"], "high");
    }

    #[tokio::test]
    async fn test_add_task_reports_validation_errors() {
        let state = setup_state().await;
        let result = dispatch(&state, "alice", "add_task", &json!({ "title": "   " })).await;
        assert!(result["error"].as_str().unwrap().contains("Title"));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_tag() {
        let state = setup_state().await;
        dispatch(
            &state,
            "alice",
            "add_task",
            &json!({ "title": "Tagged", "tags": "home,chores" }),
        )
        .await;
        let other = dispatch(&state, "alice", "add_task", &json!({ "title": "Plain" })).await;
        dispatch(
            &state,
            "alice",
            "complete_task",
            &json!({ "task_id": other["task_id"] }),
        )
        .await;

        let pending = dispatch(&state, "alice", "list_tasks", &json!({ "status": "pending" })).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let tagged = dispatch(&state, "alice", "list_tasks", &json!({ "tag": "chores" })).await;
        assert_eq!(tagged.as_array().unwrap().len(), 1);
        assert_eq!(tagged[0]["title"], "Tagged");
    }

    #[tokio::test]
    async fn test_complete_task_is_one_way() {
        let state = setup_state().await;
        let created = dispatch(
            &state,
            "alice",
            "add_task",
            &json!({
                "title": "Daily report",
                "due_date": "2024-01-01T00:00:00Z",
                "recurring_rule": "daily"
            }),
        )
        .await;
        let task_id = created["task_id"].clone();

        let first = dispatch(&state, "alice", "complete_task", &json!({ "task_id": task_id })).await;
        assert_eq!(first["status"], "completed");
        assert!(first["next_task_id"].is_i64());
        let next_due: chrono::DateTime<chrono::Utc> =
            first["next_due_date"].as_str().unwrap().parse().unwrap();
        assert_eq!(next_due.to_rfc3339(), "2024-01-02T00:00:00+00:00");

        let second =
            dispatch(&state, "alice", "complete_task", &json!({ "task_id": task_id })).await;
        assert_eq!(second["status"], "already_completed");
        assert!(second.get("next_task_id").is_none());
    }

    #[tokio::test]
    async fn test_tools_are_owner_scoped() {
        let state = setup_state().await;
        let created = dispatch(&state, "alice", "add_task", &json!({ "title": "Mine" })).await;
        let task_id = created["task_id"].clone();

        let stolen = dispatch(&state, "bob", "delete_task", &json!({ "task_id": task_id })).await;
        assert_eq!(stolen["error"], TASK_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_task_changes_named_fields() {
        let state = setup_state().await;
        let created = dispatch(&state, "alice", "add_task", &json!({ "title": "Old name" })).await;

        let updated = dispatch(
            &state,
            "alice",
            "update_task",
            &json!({ "task_id": created["task_id"], "title": "New name" }),
        )
        .await;
        assert_eq!(updated["status"], "updated");
        assert_eq!(updated["title"], "New name");
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error() {
        let state = setup_state().await;
        let result = dispatch(&state, "alice", "fly_to_moon", &json!({})).await;
        assert_eq!(result["error"], "unknown tool: fly_to_moon");
    }
}

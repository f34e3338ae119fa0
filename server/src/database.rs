// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result, bail};
use chrono::Utc;
use common::{Conversation, Message, Task, TaskChanges, ValidatedTask};
use sqlx::{Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{debug, info};

use crate::recurrence::{self, CompletionReceipt, CompletionStatus};

/// Result of toggling a task's completion flag. `successor` is set only
/// when the toggle moved the task to completed and a recurring rule with a
/// due date was present.
#[derive(Debug, Clone)]
pub struct ToggleOutcome {
    pub task: Task,
    pub successor: Option<Task>,
}

/// Creates the schema. Used by startup and by the test setup.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            completed BOOLEAN NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'medium',
            tags TEXT NULL,
            due_date TIMESTAMP NULL,
            recurring_rule TEXT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'tasks' table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks (user_id);")
        .execute(pool)
        .await
        .context("Failed to create tasks user index")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'conversations' table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create 'messages' table")?;

    Ok(())
}

/// Establishes the database connection pool.
/// If the database does not exist, it creates it, then ensures the schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    create_schema(&pool).await?;

    info!("Schema is ready.");

    Ok(pool)
}

/// Retrieves every task owned by `user_id`, oldest first.
pub async fn get_tasks_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE user_id = ? ORDER BY id ASC;",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve tasks from DB")?;

    Ok(tasks)
}

/// Inserts a new task. Input must already be validated.
pub async fn create_task(pool: &SqlitePool, user_id: &str, new: ValidatedTask) -> Result<Task> {
    let now = Utc::now();

    debug!(
        "Insert values: user_id={}, title={}, priority={}, recurring_rule={:?}",
        user_id, new.title, new.priority, new.recurring_rule
    );

    let id = sqlx::query(
        "INSERT INTO tasks (user_id, title, description, completed, priority, tags, due_date, recurring_rule, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.priority)
    .bind(&new.tags)
    .bind(new.due_date)
    .bind(new.recurring_rule)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    Ok(Task {
        id,
        user_id: user_id.to_string(),
        title: new.title,
        description: new.description,
        completed: false,
        priority: new.priority,
        tags: new.tags,
        due_date: new.due_date,
        recurring_rule: new.recurring_rule,
        created_at: now,
        updated_at: now,
    })
}

/// Fetches one task. `None` covers both a missing id and a task owned by
/// somebody else; callers cannot tell the two apart.
pub async fn get_task(pool: &SqlitePool, user_id: &str, task_id: i64) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ? AND user_id = ?;")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch task from DB")?;

    Ok(task)
}

/// Applies a partial update and stamps `updated_at`. Returns the updated
/// row, or `None` if the task does not exist for this owner.
pub async fn apply_task_changes(
    pool: &SqlitePool,
    user_id: &str,
    task_id: i64,
    changes: TaskChanges,
) -> Result<Option<Task>> {
    let Some(task) = get_task(pool, user_id, task_id).await? else {
        return Ok(None);
    };

    let updated = Task {
        title: changes.title.unwrap_or(task.title),
        description: changes.description.unwrap_or(task.description),
        priority: changes.priority.unwrap_or(task.priority),
        tags: changes.tags.or(task.tags),
        due_date: changes.due_date.or(task.due_date),
        recurring_rule: changes.recurring_rule.or(task.recurring_rule),
        updated_at: Utc::now(),
        ..task
    };

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, priority = ?, tags = ?, due_date = ?, recurring_rule = ?, updated_at = ? \
         WHERE id = ? AND user_id = ?",
    )
    .bind(&updated.title)
    .bind(&updated.description)
    .bind(updated.priority)
    .bind(&updated.tags)
    .bind(updated.due_date)
    .bind(updated.recurring_rule)
    .bind(updated.updated_at)
    .bind(task_id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to update task in DB")?;

    Ok(Some(updated))
}

/// Hard-deletes a task. Returns the deleted row, or `None` if it was not
/// found for this owner.
pub async fn delete_task(pool: &SqlitePool, user_id: &str, task_id: i64) -> Result<Option<Task>> {
    let Some(task) = get_task(pool, user_id, task_id).await? else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
        .bind(task_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to delete task from DB")?;

    info!("Deleted task {} for user {}", task_id, user_id);

    Ok(Some(task))
}

/// Toggle semantics, used by the REST endpoint: flips the completion flag.
///
/// Completing (false -> true) spawns a successor when a recurring rule and
/// due date are present. Un-completing (true -> false) never spawns. The
/// flag update carries a `completed = <old>` guard and shares a transaction
/// with the successor insert, so a completion event yields at most one
/// successor even under concurrent callers.
pub async fn toggle_task_completion(
    pool: &SqlitePool,
    user_id: &str,
    task_id: i64,
) -> Result<Option<ToggleOutcome>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let Some(task) =
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ? AND user_id = ?;")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch task for toggle")?
    else {
        return Ok(None);
    };

    let now = Utc::now();
    let new_completed = !task.completed;

    let result = sqlx::query(
        "UPDATE tasks SET completed = ?, updated_at = ? WHERE id = ? AND user_id = ? AND completed = ?",
    )
    .bind(new_completed)
    .bind(now)
    .bind(task_id)
    .bind(user_id)
    .bind(task.completed)
    .execute(&mut *tx)
    .await
    .context("Failed to toggle task completion")?;

    if result.rows_affected() == 0 {
        bail!("Task {} was modified concurrently", task_id);
    }

    let mut successor = None;
    if new_completed {
        if let Some(next_due) = recurrence::next_occurrence(task.recurring_rule, task.due_date) {
            successor = Some(insert_successor(&mut tx, &task, next_due).await?);
        }
    }

    tx.commit().await.context("Failed to commit toggle")?;

    if let Some(next) = &successor {
        info!(
            "Task {} completed, spawned successor {} due {}",
            task_id, next.id, next.due_date.map(|d| d.to_rfc3339()).unwrap_or_default()
        );
    }

    Ok(Some(ToggleOutcome {
        task: Task {
            completed: new_completed,
            updated_at: now,
            ..task
        },
        successor,
    }))
}

/// One-way completion, used by the agent tool path.
///
/// Re-completing an already-completed task is a no-op reported as
/// `already_completed` and never spawns a second successor. A fresh
/// completion commits the flag update and the successor insert in one
/// transaction.
pub async fn complete_task_once(
    pool: &SqlitePool,
    user_id: &str,
    task_id: i64,
) -> Result<Option<CompletionReceipt>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let Some(task) =
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ? AND user_id = ?;")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch task for completion")?
    else {
        return Ok(None);
    };

    if task.completed {
        debug!("Task {} already completed, nothing to do", task_id);
        return Ok(Some(CompletionReceipt::already_completed(
            task.id, task.title,
        )));
    }

    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE tasks SET completed = 1, updated_at = ? WHERE id = ? AND user_id = ? AND completed = 0",
    )
    .bind(now)
    .bind(task_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .context("Failed to mark task completed")?;

    // Somebody else completed it between our read and write. Their
    // completion owns the successor; report the no-op.
    if result.rows_affected() == 0 {
        return Ok(Some(CompletionReceipt::already_completed(
            task.id, task.title,
        )));
    }

    let mut receipt = CompletionReceipt {
        task_id: task.id,
        status: CompletionStatus::Completed,
        title: task.title.clone(),
        next_task_id: None,
        next_due_date: None,
    };

    if let Some(next_due) = recurrence::next_occurrence(task.recurring_rule, task.due_date) {
        let next = insert_successor(&mut tx, &task, next_due).await?;
        receipt.next_task_id = Some(next.id);
        receipt.next_due_date = Some(next_due);
    }

    tx.commit().await.context("Failed to commit completion")?;

    Ok(Some(receipt))
}

/// Inserts the next occurrence of a recurring task: a fresh pending row
/// with the same title/description/priority/tags/rule and the advanced due
/// date. Runs inside the caller's transaction.
async fn insert_successor(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    original: &Task,
    next_due: chrono::DateTime<Utc>,
) -> Result<Task> {
    let now = Utc::now();

    let id = sqlx::query(
        "INSERT INTO tasks (user_id, title, description, completed, priority, tags, due_date, recurring_rule, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&original.user_id)
    .bind(&original.title)
    .bind(&original.description)
    .bind(original.priority)
    .bind(&original.tags)
    .bind(next_due)
    .bind(original.recurring_rule)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("Failed to insert successor task")?
    .last_insert_rowid();

    Ok(Task {
        id,
        user_id: original.user_id.clone(),
        title: original.title.clone(),
        description: original.description.clone(),
        completed: false,
        priority: original.priority,
        tags: original.tags.clone(),
        due_date: Some(next_due),
        recurring_rule: original.recurring_rule,
        created_at: now,
        updated_at: now,
    })
}

/// Creates a new empty conversation for a user.
pub async fn create_conversation(pool: &SqlitePool, user_id: &str) -> Result<Conversation> {
    let now = Utc::now();
    let id = sqlx::query("INSERT INTO conversations (user_id, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create conversation")?
        .last_insert_rowid();

    Ok(Conversation {
        id,
        user_id: user_id.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_conversation(
    pool: &SqlitePool,
    user_id: &str,
    conversation_id: i64,
) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE id = ? AND user_id = ?;",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch conversation")?;

    Ok(conversation)
}

/// All messages of a conversation, oldest first.
pub async fn get_messages(pool: &SqlitePool, conversation_id: i64) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE conversation_id = ? ORDER BY id ASC;",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch messages")?;

    Ok(messages)
}

/// Appends a message and bumps the conversation's `updated_at`.
pub async fn insert_message(
    pool: &SqlitePool,
    user_id: &str,
    conversation_id: i64,
    role: &str,
    content: &str,
) -> Result<Message> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO messages (user_id, conversation_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(conversation_id)
    .bind(role)
    .bind(content)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert message")?
    .last_insert_rowid();

    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(conversation_id)
        .execute(pool)
        .await
        .context("Failed to touch conversation")?;

    Ok(Message {
        id,
        user_id: user_id.to_string(),
        conversation_id,
        role: role.to_string(),
        content: content.to_string(),
        created_at: now,
    })
}

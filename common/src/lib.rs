// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TITLE_MIN: usize = 1;
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 1000;

/// Task priority. Unrecognized input coerces to `Medium` rather than
/// failing; see [`Priority::from_lossy`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Strict parse. `None` for anything other than the three known values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Lenient parse: unknown values fall back to the default priority.
    pub fn from_lossy(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repetition policy for a task. On completion of a task carrying a rule
/// and a due date, a successor task is spawned with the due date advanced.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RecurringRule {
    Daily,
    Weekly,
    Monthly,
}

impl RecurringRule {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RecurringRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a task within the system.
///
/// `sqlx::FromRow` lets the database layer build a `Task` directly from a
/// result row. All timestamps are UTC.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: i64,

    /// Owner of the task. Every query is filtered on it.
    pub user_id: String,

    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,

    /// Comma-joined label set, e.g. "groceries,errands".
    pub tags: Option<String>,

    pub due_date: Option<DateTime<Utc>>,
    pub recurring_rule: Option<RecurringRule>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns the trimmed title, or a message if it falls outside 1–200
    /// characters.
    pub fn validate_title(raw: &str) -> Result<String, String> {
        let t = raw.trim();
        let len = t.chars().count();
        if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
            return Err(format!("Title must be {TITLE_MIN}–{TITLE_MAX} characters"));
        }
        Ok(t.to_string())
    }

    /// Returns the trimmed description, or a message if it exceeds 1000
    /// characters.
    pub fn validate_description(raw: &str) -> Result<String, String> {
        let d = raw.trim();
        if d.chars().count() > DESCRIPTION_MAX {
            return Err(format!("Description max {DESCRIPTION_MAX} characters"));
        }
        Ok(d.to_string())
    }

    pub fn validate_recurring_rule(raw: &str) -> Result<RecurringRule, String> {
        RecurringRule::parse(raw)
            .ok_or_else(|| "Recurring rule must be one of: daily, weekly, monthly".to_string())
    }
}

/// Structure used to receive task creation data from the API and from the
/// agent tool layer. Only `title` is required.
#[derive(Deserialize, Debug, Default)]
pub struct CreateTaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    // Free-form on the wire; coerced/validated by `validate`.
    pub priority: Option<String>,
    pub tags: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurring_rule: Option<String>,
}

/// Creation data that has passed validation and is safe to insert.
#[derive(Debug, Clone)]
pub struct ValidatedTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub tags: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurring_rule: Option<RecurringRule>,
}

impl CreateTaskPayload {
    /// Validates the payload. Title and description length and the
    /// recurring rule are checked; an unknown priority silently coerces to
    /// the default instead of failing.
    pub fn validate(self) -> Result<ValidatedTask, String> {
        let title = Task::validate_title(&self.title)?;
        let description = Task::validate_description(&self.description)?;
        let priority = self
            .priority
            .as_deref()
            .map(Priority::from_lossy)
            .unwrap_or_default();
        let recurring_rule = self
            .recurring_rule
            .as_deref()
            .map(Task::validate_recurring_rule)
            .transpose()?;
        Ok(ValidatedTask {
            title,
            description,
            priority,
            tags: self.tags,
            due_date: self.due_date,
            recurring_rule,
        })
    }
}

/// Partial update for a task. `None` fields are left untouched.
#[derive(Deserialize, Debug, Default)]
pub struct UpdateTaskPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurring_rule: Option<String>,
}

/// Validated field changes for a task update.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurring_rule: Option<RecurringRule>,
}

impl UpdateTaskPayload {
    pub fn validate(self) -> Result<TaskChanges, String> {
        let title = self
            .title
            .as_deref()
            .map(Task::validate_title)
            .transpose()?;
        let description = self
            .description
            .as_deref()
            .map(Task::validate_description)
            .transpose()?;
        let priority = self.priority.as_deref().map(Priority::from_lossy);
        let recurring_rule = self
            .recurring_rule
            .as_deref()
            .map(Task::validate_recurring_rule)
            .transpose()?;
        Ok(TaskChanges {
            title,
            description,
            priority,
            tags: self.tags,
            due_date: self.due_date,
            recurring_rule,
        })
    }
}

/// One ranked hit from semantic search. `relevance_score` is cosine
/// similarity rounded to 3 decimals; `due_date` is RFC 3339 or null.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchResult {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub tags: Option<String>,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub relevance_score: f64,
}

/// A chat thread owned by a single user.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single message within a conversation. `role` is "user" or "assistant".
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub user_id: String,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    pub conversation_id: Option<i64>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub conversation_id: i64,
    pub response: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Record of one tool invocation the agent made while answering.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: serde_json::Value,
}

// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEventKind {
    Created,
    Updated,
    Completed,
    Deleted,
    /// A recurring task's successor was inserted.
    Spawned,
}

/// A task lifecycle notification for downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub user_id: String,
    pub task_id: i64,
    pub title: String,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, user_id: &str, task_id: i64, title: &str) -> Self {
        Self {
            kind,
            user_id: user_id.to_string(),
            task_id,
            title: title.to_string(),
        }
    }
}

/// Best-effort event sink. Task operations never fail because the sink is
/// down: publish errors are logged and swallowed. With no endpoint
/// configured, publishing is a no-op.
#[derive(Clone)]
pub struct EventPublisher {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl EventPublisher {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn publish(&self, event: TaskEvent) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };

        let send = self
            .client
            .post(endpoint)
            .timeout(PUBLISH_TIMEOUT)
            .json(&event)
            .send()
            .await;

        match send {
            Ok(response) if response.status().is_success() => {
                debug!("Published {:?} event for task {}", event.kind, event.task_id);
            }
            Ok(response) => {
                warn!(
                    "Event sink rejected {:?} event for task {}: {}",
                    event.kind,
                    event.task_id,
                    response.status()
                );
            }
            Err(e) => {
                warn!(
                    "Failed to publish {:?} event for task {}: {}",
                    event.kind, event.task_id, e
                );
            }
        }
    }
}

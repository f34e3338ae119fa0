// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use common::{Message, ToolCallRecord};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::AppConfig;
use crate::{AppState, tools};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on tool rounds per user message. A model stuck calling
/// tools forever is cut off with an error instead of looping.
const MAX_TOOL_ROUNDS: usize = 5;

/// What the agent produced for one user message.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Todo assistant backed by an OpenAI-compatible chat-completions API.
///
/// Each run sends the conversation plus the task-tool definitions, executes
/// any tool calls the model makes through [`tools::dispatch`], feeds the
/// results back, and repeats until the model answers in plain text.
pub struct ChatAgent {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatAgent {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            model: config.chat_model.clone(),
        }
    }

    fn instructions(user_id: &str) -> String {
        format!(
            "You are a helpful todo assistant. The authenticated user's id is: {user_id}.\n\
             Use the task tools to add, list, complete, delete, or update tasks. Confirm actions with a friendly response.\n\
             Use 'search_tasks' to find relevant tasks when the user asks vague questions or searches by meaning.\n\
             If a tool returns an error (e.g. \"Task not found\"), say so clearly."
        )
    }

    /// Runs the agent over the stored history plus the new user message.
    pub async fn run(
        &self,
        state: &AppState,
        user_id: &str,
        history: &[Message],
        user_message: &str,
    ) -> Result<AgentReply> {
        let mut messages: Vec<Value> =
            vec![json!({ "role": "system", "content": Self::instructions(user_id) })];
        for m in history {
            messages.push(json!({ "role": m.role, "content": m.content }));
        }
        messages.push(json!({ "role": "user", "content": user_message }));

        let tool_definitions = tools::definitions();
        let mut recorded: Vec<ToolCallRecord> = Vec::new();

        for _ in 0..MAX_TOOL_ROUNDS {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .timeout(REQUEST_TIMEOUT)
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": messages,
                    "tools": tool_definitions,
                }))
                .send()
                .await
                .context("chat completion request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                bail!("chat API error {status}: {body}");
            }

            let body: Value = response
                .json()
                .await
                .context("invalid chat completion body")?;
            let message = body["choices"][0]["message"].clone();
            if message.is_null() {
                bail!("chat completion contained no message");
            }

            let tool_calls = message["tool_calls"].as_array().cloned().unwrap_or_default();
            if tool_calls.is_empty() {
                let content = message["content"].as_str().unwrap_or_default().to_string();
                return Ok(AgentReply {
                    response: content,
                    tool_calls: recorded,
                });
            }

            // The assistant turn that requested the calls must precede the
            // tool results in the transcript.
            messages.push(message.clone());

            for call in &tool_calls {
                let call_id = call["id"].as_str().unwrap_or_default();
                let name = call["function"]["name"].as_str().unwrap_or_default();
                let arguments: Value = call["function"]["arguments"]
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_else(|| json!({}));

                debug!("Agent calls tool {} with {}", name, arguments);
                let result = tools::dispatch(state, user_id, name, &arguments).await;

                recorded.push(ToolCallRecord {
                    name: name.to_string(),
                    arguments,
                });
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": result.to_string(),
                }));
            }
        }

        bail!("agent exceeded {MAX_TOOL_ROUNDS} tool rounds without answering")
    }
}

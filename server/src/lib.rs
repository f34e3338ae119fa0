// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use sqlx::SqlitePool;

pub mod agent;
pub mod auth;
pub mod config;
pub mod database;
pub mod embedding;
pub mod events;
pub mod handlers;
pub mod recurrence;
pub mod routes;
pub mod search;
pub mod tools;

use agent::ChatAgent;
use config::AppConfig;
use embedding::{EmbeddingProvider, OpenAiEmbeddings};
use events::EventPublisher;

/// Shared application state, constructed once in `main` and handed to the
/// router. Everything request handlers need lives here; no process-wide
/// singletons.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub events: EventPublisher,
    pub agent: Arc<ChatAgent>,
}

impl AppState {
    /// Builds the state with the production providers (OpenAI-compatible
    /// embeddings and chat agent, HTTP event sink).
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddings::new(&config));
        let events = EventPublisher::new(config.events_url.clone());
        let agent = Arc::new(ChatAgent::new(&config));
        Self {
            pool,
            config: Arc::new(config),
            embeddings,
            events,
            agent,
        }
    }
}

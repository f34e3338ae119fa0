// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::env;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,

    /// HS256 shared secret for bearer-token verification.
    pub auth_secret: String,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub chat_model: String,

    /// Optional endpoint for best-effort lifecycle events. Unset disables
    /// publishing entirely.
    pub events_url: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", "sqlite://database/sqlite.db"),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8001),
            auth_secret: env_or("AUTH_SECRET", "change-me-in-production"),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            chat_model: env_or("CHAT_MODEL", "gpt-4o-mini"),
            events_url: env::var("EVENTS_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

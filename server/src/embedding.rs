// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Bound on each embedding request. A hung provider call surfaces as an
/// error, which the search path treats the same as any provider failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Vendor-agnostic embedding capability.
///
/// `embed_batch` must preserve positional correspondence between the input
/// list and the output list. Batching is a performance hint only: the
/// default implementation loops over `embed` and is behaviorally
/// equivalent.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            model: config.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .context("embedding response contained no vector")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Newlines degrade embedding quality for some models.
        let input: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .context("embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("embedding API error {status}: {body}");
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("invalid embedding response body")?;

        if parsed.data.len() != texts.len() {
            bail!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            );
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            port: 0,
            auth_secret: "secret".to_string(),
            openai_api_key: "test-key".to_string(),
            openai_base_url: base_url,
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            events_url: None,
        }
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_input_order() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "embedding": [1.0, 0.0] },
                    { "embedding": [0.0, 1.0] }
                ]
            })))
            .mount(&mock_server)
            .await;

        let provider = OpenAiEmbeddings::new(&test_config(mock_server.uri()));
        let vectors = provider
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_returns_single_vector() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "embedding": [0.5, 0.5, 0.5] } ]
            })))
            .mount(&mock_server)
            .await;

        let provider = OpenAiEmbeddings::new(&test_config(mock_server.uri()));
        let vector = provider.embed("hello\nworld").await.unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_is_surfaced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiEmbeddings::new(&test_config(mock_server.uri()));
        let err = provider.embed("anything").await.unwrap_err();
        assert!(err.to_string().contains("embedding API error"));
    }

    #[tokio::test]
    async fn test_count_mismatch_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "embedding": [1.0] } ]
            })))
            .mount(&mock_server)
            .await;

        let provider = OpenAiEmbeddings::new(&test_config(mock_server.uri()));
        let err = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_the_network() {
        // No mock server at all; an empty input must not hit the wire.
        let provider = OpenAiEmbeddings::new(&test_config("http://127.0.0.1:9".to_string()));
        let vectors = provider.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    struct SingleOnly;

    #[async_trait]
    impl EmbeddingProvider for SingleOnly {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32])
        }
    }

    #[tokio::test]
    async fn test_default_batch_loops_single_calls_in_order() {
        let provider = SingleOnly;
        let vectors = provider
            .embed_batch(&["a".to_string(), "abc".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![3.0]]);
    }
}

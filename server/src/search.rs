// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::cmp::Ordering;

use anyhow::Result;
use common::{SearchResult, Task};
use sqlx::SqlitePool;
use tracing::warn;

use crate::database;
use crate::embedding::EmbeddingProvider;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Canonical text representation of a task for embedding.
///
/// Field order is fixed: title, description, tags, priority. Changing it
/// changes every score.
pub fn task_text(task: &Task) -> String {
    let mut text = task.title.clone();
    if !task.description.is_empty() {
        text.push(' ');
        text.push_str(&task.description);
    }
    if let Some(tags) = task.tags.as_deref().filter(|t| !t.is_empty()) {
        text.push_str(" tags:");
        text.push_str(tags);
    }
    text.push_str(" priority:");
    text.push_str(task.priority.as_str());
    text
}

/// Cosine similarity between two vectors. Defined as 0.0 when either
/// vector has zero magnitude.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> f32 {
    let dot: f32 = v1.iter().zip(v2).map(|(a, b)| a * b).sum();
    let magnitude1 = v1.iter().map(|a| a * a).sum::<f32>().sqrt();
    let magnitude2 = v2.iter().map(|b| b * b).sum::<f32>().sqrt();
    if magnitude1 == 0.0 || magnitude2 == 0.0 {
        return 0.0;
    }
    dot / (magnitude1 * magnitude2)
}

fn round3(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 1000.0
}

/// Ranks a user's tasks against a free-text query.
///
/// Embeds the query and every task on each call: no cache, no stored
/// vectors, O(N) per search. Acceptable for per-user task counts. Provider
/// failures are recovered locally: the caller gets an empty list, which is
/// indistinguishable from "no matches". Database errors still propagate.
///
/// Results are sorted by descending score (stable, so ties keep task
/// order), truncated to `limit`, and scores rounded to 3 decimals. No
/// relevance threshold is applied.
pub async fn search_tasks(
    pool: &SqlitePool,
    embeddings: &dyn EmbeddingProvider,
    user_id: &str,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchResult>> {
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let query_vec = match embeddings.embed(query).await {
        Ok(v) => v,
        Err(e) => {
            warn!("Semantic search unavailable, query embedding failed: {e:#}");
            return Ok(Vec::new());
        }
    };

    let tasks = database::get_tasks_for_user(pool, user_id).await?;
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = tasks.iter().map(task_text).collect();
    let task_vecs = match embeddings.embed_batch(&texts).await {
        Ok(v) => v,
        Err(e) => {
            warn!("Semantic search unavailable, batch embedding failed: {e:#}");
            return Ok(Vec::new());
        }
    };

    let mut scored: Vec<(f32, &Task)> = tasks
        .iter()
        .zip(&task_vecs)
        .map(|(task, vec)| (cosine_similarity(&query_vec, vec), task))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(limit)
        .map(|(score, task)| SearchResult {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            tags: task.tags.clone(),
            priority: task.priority,
            due_date: task.due_date.map(|d| d.to_rfc3339()),
            relevance_score: round3(score),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use common::CreateTaskPayload;

    /// Deterministic bag-of-words embedding: each word bumps one bucket.
    /// Shared words between texts produce real cosine overlap, which is
    /// all the ranking logic cares about.
    struct HashEmbeddings;

    const DIM: usize = 32;

    fn hash_embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for word in text.to_lowercase().split_whitespace() {
            let bucket = word
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % DIM] += 1.0;
        }
        v
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(hash_embed(text))
        }
    }

    struct FailingEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddings {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("provider down")
        }
    }

    async fn seed(pool: &SqlitePool, user: &str, title: &str, description: &str) {
        let new = CreateTaskPayload {
            title: title.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        database::create_task(pool, user, new).await.unwrap();
    }

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        database::create_schema(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_of_zero_vector_is_zero() {
        let v = vec![1.0, 2.0];
        let zero = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_of_opposite_vectors_is_negative_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_task_text_field_order() {
        let new = CreateTaskPayload {
            title: "Buy almond milk".to_string(),
            description: "healthy drink".to_string(),
            tags: Some("groceries".to_string()),
            priority: Some("high".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let task = Task {
            id: 1,
            user_id: "alice".to_string(),
            title: new.title,
            description: new.description,
            completed: false,
            priority: new.priority,
            tags: new.tags,
            due_date: None,
            recurring_rule: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(
            task_text(&task),
            "Buy almond milk healthy drink tags:groceries priority:high"
        );
    }

    #[test]
    fn test_task_text_skips_empty_parts() {
        let task = Task {
            id: 1,
            user_id: "alice".to_string(),
            title: "File taxes".to_string(),
            description: String::new(),
            completed: false,
            priority: common::Priority::Medium,
            tags: None,
            due_date: None,
            recurring_rule: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(task_text(&task), "File taxes priority:medium");
    }

    #[tokio::test]
    async fn test_ranks_relevant_task_first() {
        let pool = setup_pool().await;
        seed(&pool, "alice", "Buy almond milk", "healthy drink").await;
        seed(&pool, "alice", "File taxes", "").await;

        let results = search_tasks(&pool, &HashEmbeddings, "alice", "healthy drink", None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Buy almond milk");
        assert!(results[0].relevance_score > results[1].relevance_score);
    }

    #[tokio::test]
    async fn test_limit_truncates_sorted_results() {
        let pool = setup_pool().await;
        for i in 0..5 {
            seed(&pool, "alice", &format!("task number {i}"), "").await;
        }

        let results = search_tasks(&pool, &HashEmbeddings, "alice", "task number", Some(2))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].relevance_score >= results[1].relevance_score);
    }

    #[tokio::test]
    async fn test_provider_failure_returns_empty_not_error() {
        let pool = setup_pool().await;
        seed(&pool, "alice", "Buy almond milk", "healthy drink").await;

        let results = search_tasks(&pool, &FailingEmbeddings, "alice", "anything", None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_owner_scoped() {
        let pool = setup_pool().await;
        seed(&pool, "bob", "Buy almond milk", "healthy drink").await;

        let results = search_tasks(&pool, &HashEmbeddings, "alice", "healthy drink", None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_scores_are_rounded_to_three_decimals() {
        let pool = setup_pool().await;
        seed(&pool, "alice", "Buy almond milk", "healthy drink").await;

        let results = search_tasks(&pool, &HashEmbeddings, "alice", "milk almond", None)
            .await
            .unwrap();
        let score = results[0].relevance_score;
        assert_eq!(score, (score * 1000.0).round() / 1000.0);
    }
}

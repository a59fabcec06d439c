use async_trait::async_trait;

use crate::AiError;

/// Scores (query, passage) pairs jointly. Higher is more relevant.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// One score per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, AiError>;
}

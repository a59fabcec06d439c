//! Query encoders for the semantic index.

use async_trait::async_trait;

use crate::AiError;

/// Instruction prefix BGE Chinese models expect on retrieval queries.
const BGE_QUERY_PREFIX: &str = "为这个句子生成表示以用于检索相关文章：";
const E5_QUERY_PREFIX: &str = "query: ";

/// Turns a query string into a dense vector in the passage-embedding space.
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    /// Model identifier, used to pick the query prefix.
    fn model_name(&self) -> &str;

    /// Embed raw text. Callers apply [`format_query_for_model`] first.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, AiError>;
}

/// Apply the model family's query-side prefix.
pub fn format_query_for_model(model: &str, query: &str) -> String {
    let m = model.to_ascii_lowercase();
    if m.contains("bge") {
        format!("{BGE_QUERY_PREFIX}{query}")
    } else if m.contains("e5") {
        format!("{E5_QUERY_PREFIX}{query}")
    } else {
        query.to_string()
    }
}

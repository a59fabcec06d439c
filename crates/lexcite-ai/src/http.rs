//! HTTP clients for remotely hosted embedding and rerank services.
//!
//! Both speak the text-embeddings-inference wire format: `POST /embed` with
//! `{"inputs": [...]}` and `POST /rerank` with `{"query", "texts"}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AiError, CrossEncoder, QueryEncoder};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: [&'a str; 1],
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

fn trim_base(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, AiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AiError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

/// Query encoder backed by a remote embedding endpoint.
pub struct HttpEncoder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEncoder {
    /// `base_url` like `http://localhost:8080`; `model` picks the query prefix.
    pub fn new(base_url: String, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url),
            model: model.into(),
        }
    }
}

#[async_trait]
impl QueryEncoder for HttpEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let url = format!("{}/embed", self.base_url);
        debug!(url = %url, "requesting query embedding");
        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { inputs: [text] })
            .send()
            .await?;
        let vectors: Vec<Vec<f32>> = check(resp).await?.json().await?;
        vectors
            .into_iter()
            .next()
            .ok_or(AiError::ScoreCount { expected: 1, got: 0 })
    }
}

/// Cross-encoder reranker backed by a remote rerank endpoint.
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCrossEncoder {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, AiError> {
        if passages.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/rerank", self.base_url);
        debug!(url = %url, passages = passages.len(), "requesting rerank scores");
        let resp = self
            .client
            .post(&url)
            .json(&RerankRequest {
                query,
                texts: passages,
            })
            .send()
            .await?;
        let hits: Vec<RerankHit> = check(resp).await?.json().await?;
        scores_in_input_order(hits, passages.len())
    }
}

/// The service returns hits sorted by score; put them back in passage order.
fn scores_in_input_order(hits: Vec<RerankHit>, n: usize) -> Result<Vec<f32>, AiError> {
    if hits.len() != n {
        return Err(AiError::ScoreCount {
            expected: n,
            got: hits.len(),
        });
    }
    let mut scores = vec![f32::NAN; n];
    for h in hits {
        if h.index >= n {
            return Err(AiError::ScoreCount { expected: n, got: h.index + 1 });
        }
        scores[h.index] = h.score;
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(AiError::Model("rerank response skipped a passage".into()));
    }
    Ok(scores)
}

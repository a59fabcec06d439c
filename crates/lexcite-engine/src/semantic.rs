//! Embedding-similarity retrieval over the passage store.

use std::sync::Arc;
use std::time::Duration;

use lexcite_ai::{QueryEncoder, format_query_for_model, with_timeout};
use lexcite_core::StatuteChunk;
use lexcite_store::{Corpus, VectorStore};
use tracing::debug;

use crate::RetrievalError;

/// Nearest-neighbour search. Either half may be missing, in which case every
/// search reports [`RetrievalError::Unavailable`].
pub struct SemanticIndex {
    store: Option<Arc<VectorStore>>,
    encoder: Option<Arc<dyn QueryEncoder>>,
    corpus: Arc<Corpus>,
    timeout: Duration,
}

impl SemanticIndex {
    pub fn new(
        store: Option<Arc<VectorStore>>,
        encoder: Option<Arc<dyn QueryEncoder>>,
        corpus: Arc<Corpus>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            encoder,
            corpus,
            timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.as_ref().is_some_and(|s| !s.is_empty()) && self.encoder.is_some()
    }

    /// Top `k` chunks by `1 − cosine distance`, descending.
    ///
    /// Ids without a corpus chunk are skipped.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(f64, Arc<StatuteChunk>)>, RetrievalError> {
        let store = self
            .store
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or(RetrievalError::Unavailable("embedding store"))?;
        let encoder = self
            .encoder
            .as_ref()
            .ok_or(RetrievalError::Unavailable("query encoder"))?;

        let text = format_query_for_model(encoder.model_name(), query);
        let vector = with_timeout(self.timeout, encoder.encode(&text)).await?;
        let hits = store.search(&vector, k)?;
        debug!(hits = hits.len(), model = encoder.model_name(), "semantic search");

        Ok(hits
            .into_iter()
            .filter_map(|(id, dist)| self.corpus.get(&id).map(|c| (1.0 - dist as f64, c)))
            .collect())
    }
}

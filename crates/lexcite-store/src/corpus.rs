//! The statute corpus: chunk records loaded from the offline-built JSON index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lexcite_core::{ArticleKey, StatuteChunk, canonical_law_name, normalize_article};
use serde::Deserialize;
use tracing::{info, warn};

use crate::StoreError;
use crate::lexical::term_frequencies;

#[derive(Deserialize)]
struct IndexFile {
    docs: Vec<RawChunk>,
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "law_id", alias = "law_name", default)]
    law: String,
    #[serde(alias = "article_no", default)]
    article: String,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    heading: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(alias = "source_file", default)]
    title: Option<String>,
    #[serde(default)]
    tf: Option<std::collections::BTreeMap<String, u32>>,
}

impl RawChunk {
    fn into_chunk(self) -> Result<StatuteChunk, StoreError> {
        let key = ArticleKey::new(self.law, self.article)?;
        let id = self
            .id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}_{}", key.law(), key.article()));
        Ok(StatuteChunk {
            id,
            key,
            chapter: self.chapter.unwrap_or_default(),
            heading: self.heading.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            title: self.title.filter(|s| !s.is_empty()),
            tf: self.tf.unwrap_or_default(),
        })
    }
}

/// Every chunk in the corpus, in file order, with id and article lookups.
pub struct Corpus {
    chunks: Vec<Arc<StatuteChunk>>,
    by_id: HashMap<String, usize>,
    by_article: HashMap<(String, String), usize>,
}

impl Corpus {
    /// Load `{"docs": [...]}` from the JSON index written by the corpus builder.
    ///
    /// Records without a law or article are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let file: IndexFile = serde_json::from_slice(&std::fs::read(path)?)?;

        let mut chunks = Vec::with_capacity(file.docs.len());
        let mut rejected = 0usize;
        for raw in file.docs {
            match raw.into_chunk() {
                Ok(c) => chunks.push(c),
                Err(e) => {
                    rejected += 1;
                    warn!(error = %e, "skipping corpus record");
                }
            }
        }
        if chunks.is_empty() {
            return Err(StoreError::EmptyCorpus(path.to_path_buf()));
        }

        let corpus = Self::from_chunks(chunks);
        info!(chunks = corpus.len(), rejected, path = %path.display(), "loaded statute corpus");
        Ok(corpus)
    }

    /// Build a corpus from chunks already in memory.
    ///
    /// Chunks with an empty term-frequency map get one computed from heading and text.
    pub fn from_chunks(chunks: Vec<StatuteChunk>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_article = HashMap::new();
        let chunks: Vec<Arc<StatuteChunk>> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                if c.tf.is_empty() {
                    c.tf = term_frequencies(&format!("{}\n{}", c.heading, c.text))
                        .into_iter()
                        .collect();
                }
                by_id.entry(c.id.clone()).or_insert(i);
                by_article.entry(article_slot(c.law(), c.article())).or_insert(i);
                Arc::new(c)
            })
            .collect();
        Self {
            chunks,
            by_id,
            by_article,
        }
    }

    pub fn chunks(&self) -> &[Arc<StatuteChunk>] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<StatuteChunk>> {
        self.by_id.get(id).map(|&i| Arc::clone(&self.chunks[i]))
    }

    /// Direct lookup by law and article, tolerant of aliases and numeral style.
    pub fn find_article(&self, law: &str, article: &str) -> Option<Arc<StatuteChunk>> {
        self.by_article
            .get(&article_slot(law, article))
            .map(|&i| Arc::clone(&self.chunks[i]))
    }
}

fn article_slot(law: &str, article: &str) -> (String, String) {
    (canonical_law_name(law), normalize_article(article))
}

//! TF-IDF lexical index with CJK unigram + bigram tokenisation.
//!
//! Chinese statute text has no word boundaries, so every CJK character is a
//! token and every adjacent pair of CJK characters is another. Latin runs are
//! kept whole. Weights use smoothed idf `ln((N+1)/(df+1)) + 1` and documents
//! are ranked by cosine similarity.

use std::collections::HashMap;
use std::sync::Arc;

use lexcite_core::StatuteChunk;
use tracing::info;

use crate::Corpus;

/// True for code points in the CJK Unified Ideograph blocks and extensions.
pub fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
    )
}

/// Lowercased `[a-z0-9]{2,}` runs, then CJK unigrams, then CJK bigrams.
///
/// Bigrams are formed over the CJK characters of the whole text with
/// non-CJK characters removed, so "工資、扣款" yields "資扣".
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens: Vec<String> = Vec::new();

    let mut run = String::new();
    for c in lower.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            run.push(c);
        } else {
            if run.len() >= 2 {
                tokens.push(std::mem::take(&mut run));
            }
            run.clear();
        }
    }
    if run.len() >= 2 {
        tokens.push(run);
    }

    let cjk: Vec<char> = lower.chars().filter(|&c| is_cjk(c)).collect();
    tokens.extend(cjk.iter().map(|c| c.to_string()));
    tokens.extend(cjk.windows(2).map(|w| w.iter().collect::<String>()));
    tokens
}

/// Term counts for one text.
pub(crate) fn term_frequencies(text: &str) -> HashMap<String, u32> {
    let mut tf: HashMap<String, u32> = HashMap::new();
    for t in tokenize(text) {
        *tf.entry(t).or_insert(0) += 1;
    }
    tf
}

/// In-memory TF-IDF index over a corpus. Read-only after construction.
pub struct LexicalIndex {
    docs: Vec<Arc<StatuteChunk>>,
    idf: HashMap<String, f64>,
    norms: Vec<f64>,
}

impl LexicalIndex {
    pub fn build(corpus: &Corpus) -> Self {
        let docs: Vec<Arc<StatuteChunk>> = corpus.chunks().to_vec();
        let n = docs.len() as f64;

        let mut df: HashMap<&str, u32> = HashMap::new();
        for d in &docs {
            for term in d.tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(t, df)| (t.to_string(), ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0))
            .collect();

        let norms = docs
            .iter()
            .map(|d| {
                let s: f64 = d
                    .tf
                    .iter()
                    .map(|(t, &c)| {
                        let w = c as f64 * idf.get(t).copied().unwrap_or(0.0);
                        w * w
                    })
                    .sum();
                if s > 0.0 { s.sqrt() } else { 1.0 }
            })
            .collect();

        info!(docs = docs.len(), terms = idf.len(), "built lexical index");
        Self { docs, idf, norms }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Top `k` documents by cosine similarity, descending. Zero scores are dropped.
    ///
    /// Ties keep corpus order.
    pub fn search(&self, query: &str, k: usize) -> Vec<(f64, Arc<StatuteChunk>)> {
        let q_tf = term_frequencies(query);
        let q_weights: Vec<(&str, f64)> = q_tf
            .iter()
            .map(|(t, &c)| (t.as_str(), c as f64 * self.idf.get(t).copied().unwrap_or(0.0)))
            .collect();
        let q_norm = {
            let s: f64 = q_weights.iter().map(|(_, w)| w * w).sum();
            if s > 0.0 { s.sqrt() } else { 1.0 }
        };

        let mut scored: Vec<(f64, usize)> = Vec::new();
        for (i, d) in self.docs.iter().enumerate() {
            let dot: f64 = q_weights
                .iter()
                .filter_map(|(t, qw)| {
                    d.tf.get(*t)
                        .map(|&c| qw * c as f64 * self.idf.get(*t).copied().unwrap_or(0.0))
                })
                .sum();
            if dot > 0.0 {
                scored.push((dot / (q_norm * self.norms[i]), i));
            }
        }
        // Stable sort keeps document order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(s, i)| (s, Arc::clone(&self.docs[i])))
            .collect()
    }
}

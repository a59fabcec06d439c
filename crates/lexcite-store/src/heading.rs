//! Exact article-number and heading-keyword lookups.
//!
//! "What does Article 22 say" must resolve deterministically, so these
//! lookups bypass scoring entirely.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lexcite_core::{StatuteChunk, normalize_article};
use tracing::info;

use crate::Corpus;

pub struct HeadingIndex {
    by_article: HashMap<String, Vec<Arc<StatuteChunk>>>,
    by_keyword: HashMap<String, Vec<Arc<StatuteChunk>>>,
}

impl HeadingIndex {
    pub fn build(corpus: &Corpus) -> Self {
        let mut by_article: HashMap<String, Vec<Arc<StatuteChunk>>> = HashMap::new();
        let mut by_keyword: HashMap<String, Vec<Arc<StatuteChunk>>> = HashMap::new();

        for chunk in corpus.chunks() {
            let art = chunk.article().trim();
            by_article.entry(art.to_string()).or_default().push(Arc::clone(chunk));
            let stripped = art.trim_start_matches('0');
            if !stripped.is_empty() && stripped != art {
                by_article
                    .entry(stripped.to_string())
                    .or_default()
                    .push(Arc::clone(chunk));
            }
            for token in heading_tokens(&chunk.heading) {
                by_keyword.entry(token).or_default().push(Arc::clone(chunk));
            }
        }

        info!(
            articles = by_article.len(),
            keywords = by_keyword.len(),
            "built heading index"
        );
        Self {
            by_article,
            by_keyword,
        }
    }

    /// Chunks whose article number equals `article`.
    ///
    /// Chunks from any law containing a `preferred` entry come first. The raw
    /// key is tried before its normalised form, so "022" and "二十二" both land.
    pub fn search_by_article(
        &self,
        article: &str,
        preferred: &[String],
        limit: usize,
    ) -> Vec<Arc<StatuteChunk>> {
        let key = article.trim();
        if key.is_empty() {
            return vec![];
        }
        let matches = self
            .by_article
            .get(key)
            .or_else(|| self.by_article.get(&normalize_article(key)));
        let Some(matches) = matches else {
            return vec![];
        };

        let (pref, others): (Vec<_>, Vec<_>) = matches
            .iter()
            .partition(|c| preferred.iter().any(|p| !p.is_empty() && c.law().contains(p.as_str())));
        dedup_limit(pref.into_iter().chain(others), limit)
    }

    /// Chunks whose heading contains `keyword` as a whole token.
    pub fn search_by_keyword(&self, keyword: &str, limit: usize) -> Vec<Arc<StatuteChunk>> {
        let key = keyword.trim();
        if key.is_empty() {
            return vec![];
        }
        match self.by_keyword.get(key) {
            Some(matches) => dedup_limit(matches.iter(), limit),
            None => vec![],
        }
    }
}

fn dedup_limit<'a>(
    iter: impl Iterator<Item = &'a Arc<StatuteChunk>>,
    limit: usize,
) -> Vec<Arc<StatuteChunk>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in iter {
        if out.len() >= limit {
            break;
        }
        if seen.insert(c.id.as_str()) {
            out.push(Arc::clone(c));
        }
    }
    out
}

/// Split a heading on anything that is not a word character, CJK, or hyphen.
fn heading_tokens(heading: &str) -> Vec<String> {
    heading
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexcite_core::ArticleKey;

    fn chunk(id: &str, law: &str, article: &str, heading: &str) -> StatuteChunk {
        StatuteChunk {
            id: id.into(),
            key: ArticleKey::new(law, article).unwrap(),
            chapter: String::new(),
            heading: heading.into(),
            text: String::new(),
            title: None,
            tf: Default::default(),
        }
    }

    fn index() -> HeadingIndex {
        HeadingIndex::build(&Corpus::from_chunks(vec![
            chunk("civ-22", "民法", "22", "第 22 條"),
            chunk("lsa-22", "勞動基準法", "22", "第 22 條 工資給付"),
            chunk("lsa-07", "勞動基準法施行細則", "07", "第 7 條（勞動契約）"),
            chunk("lsa-26", "勞動基準法", "26", "第 26 條 預扣工資"),
        ]))
    }

    #[test]
    fn preferred_laws_first() {
        let idx = index();
        let hits = idx.search_by_article("22", &["勞動基準法".into()], 5);
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["lsa-22", "civ-22"]);
    }

    #[test]
    fn without_preference_corpus_order() {
        let idx = index();
        let ids: Vec<String> = idx.search_by_article("22", &[], 5).iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["civ-22", "lsa-22"]);
    }

    #[test]
    fn leading_zero_variants() {
        let idx = index();
        assert_eq!(idx.search_by_article("7", &[], 5)[0].id, "lsa-07");
        assert_eq!(idx.search_by_article("07", &[], 5)[0].id, "lsa-07");
    }

    #[test]
    fn cjk_article_number_falls_back_to_normalised() {
        let idx = index();
        assert_eq!(idx.search_by_article("二十六", &[], 5)[0].id, "lsa-26");
    }

    #[test]
    fn limit_is_respected() {
        let idx = index();
        assert_eq!(idx.search_by_article("22", &[], 1).len(), 1);
        assert!(idx.search_by_article("", &[], 5).is_empty());
    }

    #[test]
    fn keyword_lookup() {
        let idx = index();
        let hits = idx.search_by_keyword("工資給付", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "lsa-22");
        assert_eq!(idx.search_by_keyword("勞動契約", 3)[0].id, "lsa-07");
        assert!(idx.search_by_keyword("資遣", 3).is_empty());
    }
}

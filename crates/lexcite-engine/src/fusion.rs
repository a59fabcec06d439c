//! Hybrid fusion: lexical, semantic, and heading signals combined into one
//! ranked candidate list under topic routing rules.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use lexcite_ai::{CrossEncoder, with_timeout};
use lexcite_core::{Provenance, RetrievalCandidate, StatuteChunk, normalize_article};
use lexcite_store::{Corpus, HeadingIndex, LexicalIndex};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{FusionConfig, RuleBook};
use crate::semantic::SemanticIndex;
use crate::topics::TopicTable;
use crate::EngineError;

static ARTICLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*([\x{4E00}-\x{9FFF}0-9]+)\s*條").expect("valid regex"));
static ARTICLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,3})\s*條").expect("valid regex"));
static ARTICLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*([0-9]{1,3})").expect("valid regex"));
static CHAPTER_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*([\x{4E00}-\x{9FFF}0-9]+)\s*章").expect("valid regex"));
static CJK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4E00}-\x{9FFF}]{2,}").expect("valid regex"));

const HEADING_BONUS: f64 = 1.0;
const HINT_BONUS: f64 = 0.15;
const CHAPTER_BONUS: f64 = 0.10;
const MISSING_PHRASE_PENALTY: f64 = 0.5;
const BLOCKED_PENALTY: f64 = 1e6;
const PREFERRED_BONUS: f64 = 0.20;
const NOT_PREFERRED_PENALTY: f64 = 0.05;
const PRIOR_BONUS: f64 = 0.20;
/// Score given to prior articles forced in by direct lookup.
pub const FORCED_SCORE: f64 = 100.0;

/// True once a candidate carries the blocked-law penalty.
pub(crate) fn is_blocked_score(score: f64) -> bool {
    score <= -BLOCKED_PENALTY / 2.0
}

/// Article number the query asks about explicitly, e.g. `第22條` → `22`.
pub fn extract_article_hint(query: &str) -> Option<String> {
    let q = query.trim();
    [&ARTICLE_REF, &ARTICLE_SUFFIX, &ARTICLE_PREFIX]
        .iter()
        .find_map(|re| re.captures(q).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

/// Whole chapter reference in the query, e.g. `第三章`.
pub fn extract_chapter_token(query: &str) -> Option<String> {
    CHAPTER_REF
        .find(query.trim())
        .map(|m| m.as_str().to_string())
}

/// Up to `max` distinct CJK runs of two or more characters.
pub fn extract_keywords(query: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in CJK_RUN.find_iter(query) {
        if out.len() >= max {
            break;
        }
        let tok = m.as_str().to_string();
        if !out.contains(&tok) {
            out.push(tok);
        }
    }
    out
}

/// Per-call retrieval knobs. Topic-derived values are added to, never
/// replace, the caller's lists.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub w_vec: f64,
    pub w_lex: f64,
    pub preferred_laws: Vec<String>,
    pub blocked_laws: Vec<String>,
    pub prior_articles: Vec<String>,
    /// Skip topic matching and use this topic.
    pub topic: Option<String>,
    pub use_rerank: bool,
    /// Drop candidates outside the preferred laws instead of penalising them.
    pub strict_whitelist: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}

impl RetrieveOptions {
    pub fn from_config(cfg: &FusionConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            w_vec: cfg.w_vec,
            w_lex: cfg.w_lex,
            preferred_laws: vec![],
            blocked_laws: vec![],
            prior_articles: vec![],
            topic: None,
            use_rerank: false,
            strict_whitelist: false,
        }
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn preferred(mut self, laws: Vec<String>) -> Self {
        self.preferred_laws = laws;
        self
    }

    pub fn rerank(mut self, on: bool) -> Self {
        self.use_rerank = on;
        self
    }
}

fn union_into(dst: &mut Vec<String>, src: Vec<String>) {
    for s in src {
        if !s.is_empty() && !dst.contains(&s) {
            dst.push(s);
        }
    }
}

/// Candidate pool keyed by chunk id, in first-seen order.
#[derive(Default)]
struct Pool {
    entries: Vec<(f64, Arc<StatuteChunk>, Provenance)>,
    index: HashMap<String, usize>,
}

impl Pool {
    fn add(&mut self, chunk: Arc<StatuteChunk>, score: f64, provenance: Provenance) {
        match self.index.get(&chunk.id) {
            Some(&i) => self.entries[i].0 += score,
            None => {
                self.index.insert(chunk.id.clone(), self.entries.len());
                self.entries.push((score, chunk, provenance));
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

/// Shared, read-only retrieval pipeline. One per engine.
pub struct HybridRetriever {
    corpus: Arc<Corpus>,
    lexical: Arc<LexicalIndex>,
    heading: Arc<HeadingIndex>,
    semantic: Arc<SemanticIndex>,
    topics: Arc<TopicTable>,
    rules: Arc<RuleBook>,
    reranker: Option<Arc<dyn CrossEncoder>>,
    rerank_window: usize,
    timeout: Duration,
}

impl HybridRetriever {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        corpus: Arc<Corpus>,
        lexical: Arc<LexicalIndex>,
        heading: Arc<HeadingIndex>,
        semantic: Arc<SemanticIndex>,
        topics: Arc<TopicTable>,
        rules: Arc<RuleBook>,
        reranker: Option<Arc<dyn CrossEncoder>>,
        rerank_window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            corpus,
            lexical,
            heading,
            semantic,
            topics,
            rules,
            reranker,
            rerank_window,
            timeout,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Ranked candidates for one query, at most `opts.top_k` long.
    pub async fn retrieve(
        &self,
        query: &str,
        opts: &RetrieveOptions,
    ) -> Result<Vec<RetrievalCandidate>, EngineError> {
        let top_k = opts.top_k.max(1);
        let topic = opts
            .topic
            .clone()
            .or_else(|| self.topics.resolve(query).map(|m| m.topic_id));

        let mut preferred = opts.preferred_laws.clone();
        let mut blocked = opts.blocked_laws.clone();
        let mut priors = opts.prior_articles.clone();
        let mut required_phrases = Vec::new();
        if let Some(t) = &topic {
            union_into(&mut preferred, self.topics.preferred_laws(t));
            union_into(&mut blocked, self.topics.blocked_laws(t));
            union_into(&mut priors, self.topics.prior_articles(t));
            required_phrases = self.topics.required_phrases(t);
        }

        let mut pool = self.gather(query, opts, top_k).await?;

        let hint = extract_article_hint(query);
        let mut heading_hits = Vec::new();
        if let Some(h) = &hint {
            heading_hits.extend(self.heading.search_by_article(h, &preferred, 5));
        }
        for kw in extract_keywords(query, 3) {
            heading_hits.extend(self.heading.search_by_keyword(&kw, 3));
        }
        for chunk in heading_hits {
            if !pool.contains(&chunk.id) {
                pool.add(chunk, HEADING_BONUS, Provenance::HeadingMatch);
            }
        }

        let chapter = extract_chapter_token(query);
        let civil = &self.rules.civil_law;
        let civil_asked = civil.triggers.iter().any(|t| query.contains(t.as_str()));

        let mut items: Vec<RetrievalCandidate> = Vec::with_capacity(pool.entries.len());
        for (mut s, chunk, provenance) in pool.entries {
            let is_preferred = preferred.iter().any(|p| chunk.law_matches(p));
            if opts.strict_whitelist && !preferred.is_empty() && !is_preferred {
                continue;
            }
            if let Some(h) = &hint {
                if chunk.heading.contains(h.as_str()) {
                    s += HINT_BONUS;
                }
            }
            if let Some(c) = &chapter {
                if chunk.chapter.contains(c.as_str()) {
                    s += CHAPTER_BONUS;
                }
            }
            if !required_phrases.is_empty()
                && !required_phrases
                    .iter()
                    .any(|p| chunk.text.contains(p.as_str()) || chunk.heading.contains(p.as_str()))
            {
                s -= MISSING_PHRASE_PENALTY;
            }
            for b in &blocked {
                if chunk.law_matches(b) {
                    s -= BLOCKED_PENALTY;
                }
            }
            if !preferred.is_empty() {
                s += if is_preferred {
                    PREFERRED_BONUS
                } else {
                    -NOT_PREFERRED_PENALTY
                };
            }
            if priors
                .iter()
                .any(|p| p == chunk.article() || chunk.heading.contains(p.as_str()))
            {
                s += PRIOR_BONUS;
            }
            if chunk.law_matches(&civil.marker) && !civil_asked {
                s -= civil.penalty;
            }
            items.push(RetrievalCandidate::from_chunk(&chunk, s, provenance));
        }
        items.sort_by(|a, b| b.score.total_cmp(&a.score));

        if let Some(t) = &topic {
            self.topics.boost_results(&mut items, t);
        }

        self.force_priors(&mut items, &priors, &preferred, top_k);

        if opts.use_rerank {
            items = self.rerank(query, items, top_k).await;
        }
        items.truncate(top_k);
        debug!(
            query = %query,
            topic = topic.as_deref().unwrap_or("-"),
            results = items.len(),
            "hybrid retrieval"
        );
        Ok(items)
    }

    /// Concurrent lexical and semantic passes, weighted into one pool.
    async fn gather(&self, query: &str, opts: &RetrieveOptions, top_k: usize) -> Result<Pool, EngineError> {
        let k = top_k.max(10);
        let lexical = Arc::clone(&self.lexical);
        let q = query.to_string();
        let lex_task = tokio::task::spawn_blocking(move || lexical.search(&q, k));
        let sem_fut = self.semantic.search(query, k);
        let (lex, sem) = tokio::join!(lex_task, sem_fut);

        let mut pool = Pool::default();
        match sem {
            Ok(hits) => {
                for (s, chunk) in hits {
                    pool.add(chunk, opts.w_vec * s, Provenance::Hybrid);
                }
            }
            Err(e) => debug!(error = %e, "semantic signal contributed nothing"),
        }
        for (s, chunk) in lex? {
            pool.add(chunk, opts.w_lex * s, Provenance::Hybrid);
        }
        Ok(pool)
    }

    /// Insert prior articles absent from the top `top_k` at [`FORCED_SCORE`].
    ///
    /// Each missing article is looked up under the preferred laws in order,
    /// then the default law.
    fn force_priors(
        &self,
        items: &mut Vec<RetrievalCandidate>,
        priors: &[String],
        preferred: &[String],
        top_k: usize,
    ) {
        if priors.is_empty() {
            return;
        }
        let head = &items[..items.len().min(top_k)];
        let present = |art: &str| {
            let norm = normalize_article(art);
            head.iter().any(|c| {
                normalize_article(c.article()) == norm
                    && (preferred.is_empty() || preferred.iter().any(|p| c.law().contains(p.as_str())))
            })
        };
        let missing: Vec<&String> = priors.iter().filter(|p| !present(p)).collect();
        if missing.is_empty() {
            return;
        }

        let mut laws: Vec<&str> = preferred.iter().map(String::as_str).collect();
        if !laws.contains(&self.rules.default_law.as_str()) {
            laws.push(&self.rules.default_law);
        }

        let mut forced = Vec::new();
        for art in missing {
            let Some(chunk) = laws.iter().find_map(|law| self.corpus.find_article(law, art)) else {
                debug!(article = %art, "prior article not found in corpus");
                continue;
            };
            if forced
                .iter()
                .any(|c: &RetrievalCandidate| c.chunk_id.as_deref() == Some(chunk.id.as_str()))
            {
                continue;
            }
            items.retain(|c| c.chunk_id.as_deref() != Some(chunk.id.as_str()));
            info!(law = %chunk.law(), article = %chunk.article(), "force-retrieved prior article");
            forced.push(RetrievalCandidate::from_chunk(&chunk, FORCED_SCORE, Provenance::PriorArticle));
        }
        items.splice(0..0, forced);
    }

    /// Reorder the head of the list by cross-encoder score.
    ///
    /// Any collaborator failure or timeout keeps the incoming order.
    async fn rerank(
        &self,
        query: &str,
        items: Vec<RetrievalCandidate>,
        top_k: usize,
    ) -> Vec<RetrievalCandidate> {
        let Some(reranker) = &self.reranker else {
            debug!("rerank requested but no cross-encoder configured");
            return items;
        };
        let mut pool = items;
        pool.truncate(self.rerank_window.max(top_k));
        let passages: Vec<String> = pool.iter().map(|c| c.text.clone()).collect();

        match with_timeout(self.timeout, reranker.score(query, &passages)).await {
            Ok(scores) if scores.len() == pool.len() => {
                for (c, s) in pool.iter_mut().zip(scores) {
                    c.score = s as f64;
                    c.provenance = Provenance::Reranked;
                }
                pool.sort_by(|a, b| b.score.total_cmp(&a.score));
                pool
            }
            Ok(scores) => {
                warn!(expected = pool.len(), got = scores.len(), "reranker returned wrong score count, keeping fused order");
                pool
            }
            Err(e) => {
                warn!(error = %e, "reranker failed, keeping fused order");
                pool
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubReranker, retriever, retriever_with_timeout};

    fn keys(items: &[RetrievalCandidate]) -> Vec<String> {
        items.iter().map(|c| c.key.to_string()).collect()
    }

    #[test]
    fn article_hint_forms() {
        assert_eq!(extract_article_hint("勞基法第22條在說什麼").as_deref(), Some("22"));
        assert_eq!(extract_article_hint("第二十二條").as_deref(), Some("二十二"));
        assert_eq!(extract_article_hint("請問 24條 加班費").as_deref(), Some("24"));
        assert_eq!(extract_article_hint("第 38 款").as_deref(), Some("38"));
        assert_eq!(extract_article_hint("加班費怎麼算"), None);
    }

    #[test]
    fn chapter_and_keywords() {
        assert_eq!(extract_chapter_token("第三章 工資").as_deref(), Some("第三章"));
        assert_eq!(extract_chapter_token("工資"), None);
        assert_eq!(
            extract_keywords("工資 給付，工資 預扣 違約金 賠償", 3),
            vec!["工資", "給付", "預扣"]
        );
    }

    #[tokio::test]
    async fn retrieval_is_deterministic() {
        let r = retriever(None);
        let opts = RetrieveOptions::default();
        let a = r.retrieve("雇主可以預扣工資作為違約金嗎", &opts).await.unwrap();
        let b = r.retrieve("雇主可以預扣工資作為違約金嗎", &opts).await.unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
        assert!(a.len() <= opts.top_k);
    }

    #[tokio::test]
    async fn explicit_article_resolved_by_heading() {
        let r = retriever(None);
        let opts = RetrieveOptions::default().preferred(vec!["勞動基準法".into()]);
        let items = r.retrieve("第38條", &opts).await.unwrap();
        let first = &items[0];
        assert_eq!(first.key.to_string(), "勞動基準法#38");
    }

    #[tokio::test]
    async fn topic_priors_forced_in() {
        let r = retriever(None);
        // wage_deduction routes to 勞基 22/26/12; all must lead the list.
        let items = r
            .retrieve("員工曠職三天，薪水怎麼算？", &RetrieveOptions::default())
            .await
            .unwrap();
        let ks = keys(&items);
        for want in ["勞動基準法#22", "勞動基準法#26", "勞動基準法#12"] {
            assert!(ks.contains(&want.to_string()), "{want} missing from {ks:?}");
        }
        assert!(items.iter().all(|c| c.law() != "民法" || c.score < 0.0));
    }

    #[tokio::test]
    async fn civil_law_penalised_unless_asked() {
        let r = retriever(None);
        let opts = RetrieveOptions::default().top_k(10);
        let score_of = |items: &[RetrievalCandidate]| {
            items
                .iter()
                .find(|c| c.law() == "民法")
                .map(|c| c.score)
        };
        let plain = r.retrieve("受領勞務遲延 報酬", &opts).await.unwrap();
        let asked = r.retrieve("民法 受領勞務遲延 報酬", &opts).await.unwrap();
        let (Some(p), Some(a)) = (score_of(&plain), score_of(&asked)) else {
            panic!("civil-law article not retrieved");
        };
        assert!(a > p);
    }

    #[tokio::test]
    async fn strict_whitelist_drops_other_laws() {
        let r = retriever(None);
        let mut opts = RetrieveOptions::default().preferred(vec!["勞動基準法".into()]).top_k(10);
        opts.strict_whitelist = true;
        let items = r.retrieve("受領勞務遲延 報酬", &opts).await.unwrap();
        assert!(items.iter().all(|c| c.law().contains("勞動基準法")));
    }

    #[tokio::test]
    async fn rerank_reorders_and_falls_back() {
        let opts = RetrieveOptions::default().rerank(true);
        let query = "雇主可以預扣工資作為違約金嗎";

        let baseline = retriever(None).retrieve(query, &opts).await.unwrap();

        let reversed = retriever(Some(StubReranker::reverse()))
            .retrieve(query, &opts)
            .await
            .unwrap();
        assert!(reversed.iter().all(|c| c.provenance == Provenance::Reranked));

        let failing = retriever(Some(StubReranker::failing()))
            .retrieve(query, &opts)
            .await
            .unwrap();
        assert_eq!(keys(&failing), keys(&baseline));
    }

    #[tokio::test]
    async fn slow_reranker_times_out_to_fused_order() {
        let opts = RetrieveOptions::default().rerank(true);
        let query = "雇主可以預扣工資作為違約金嗎";

        let baseline = retriever(None).retrieve(query, &opts).await.unwrap();
        assert!(baseline.len() > 1);

        let slow = retriever_with_timeout(
            Some(StubReranker::slow(Duration::from_secs(5))),
            Duration::from_millis(50),
        );
        let items = slow.retrieve(query, &opts).await.unwrap();
        assert_eq!(keys(&items), keys(&baseline));
        assert!(items.iter().all(|c| c.provenance != Provenance::Reranked));
    }
}

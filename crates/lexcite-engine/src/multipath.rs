//! Plan-driven multi-path retrieval and rule-weighted merge.
//!
//! A query plan fans out into independent retrieval passes: global keywords,
//! one pass per high/medium sub-issue, direct lookups of suggested articles,
//! auto-supplemented key articles, and the rewritten query. Passes run on a
//! bounded worker pool; merging happens afterwards in fixed path order so the
//! outcome does not depend on which pass finishes first.

use std::collections::HashSet;
use std::sync::Arc;

use lexcite_core::{ArticleKey, Importance, Provenance, QueryPlan, RetrievalCandidate, canonical_law_name, normalize_article};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{MultiPathRules, RuleBook, TriggerScope};
use crate::fusion::{HybridRetriever, RetrieveOptions};
use crate::query::QueryRewriter;
use crate::EngineError;

/// Score assigned to a suggested article found by direct lookup.
const SUGGESTED_SCORE: f64 = 1.0;

/// One retrieval pass handed to the worker pool.
struct Pass {
    provenance: Provenance,
    query: String,
    top_k: usize,
}

pub struct MultiPathRetriever {
    retriever: Arc<HybridRetriever>,
    rules: Arc<RuleBook>,
    rewriter: Arc<QueryRewriter>,
    defaults: RetrieveOptions,
    workers: usize,
}

impl MultiPathRetriever {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        rules: Arc<RuleBook>,
        rewriter: Arc<QueryRewriter>,
        workers: usize,
    ) -> Self {
        Self {
            retriever,
            rules,
            rewriter,
            defaults: RetrieveOptions::default(),
            workers: workers.max(1),
        }
    }

    /// Base fusion options for every pass; preferred laws and rerank are
    /// overridden per call.
    pub fn with_defaults(mut self, defaults: RetrieveOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Full merged candidate list, sorted by final score. Callers truncate.
    ///
    /// `rewritten` defaults to the rule-based rewrite of `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        plan: &QueryPlan,
        rewritten: Option<&str>,
        top_k: usize,
        use_rerank: bool,
    ) -> Result<Vec<RetrievalCandidate>, EngineError> {
        let mp = &self.rules.multipath;
        let rewritten = rewritten
            .map(str::to_string)
            .unwrap_or_else(|| self.rewriter.rewrite(query));

        // Search passes in merge order; suggested and auto-supplemented
        // lookups slot in between the sub-issues and the rewritten query.
        let mut passes = vec![Pass {
            provenance: Provenance::GlobalKeywords,
            query: plan
                .suggested_keywords
                .iter()
                .take(mp.global_keyword_limit)
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            top_k,
        }];
        for si in &plan.sub_issues {
            let provenance = match si.importance {
                Importance::High => Provenance::SubIssueHigh,
                Importance::Medium => Provenance::SubIssueMedium,
                Importance::Low => continue,
            };
            passes.push(Pass {
                provenance,
                query: si.keywords.join(" "),
                top_k: (top_k / 2).max(3),
            });
        }
        passes.push(Pass {
            provenance: Provenance::RewrittenQuery,
            query: rewritten,
            top_k,
        });

        let opts = self
            .defaults
            .clone()
            .preferred(plan.required_laws.clone())
            .rerank(use_rerank);
        let mut outputs = self.run_passes(&passes, &opts).await?;
        let rewritten_hits = outputs.pop().unwrap_or_default();

        let mut merged = Merge::default();
        for (pass, hits) in passes.iter().zip(outputs) {
            merged.extend(hits, pass.provenance);
        }

        let suggested = plan.suggested_keys();
        for key in &suggested {
            if merged.seen(key) {
                continue;
            }
            if let Some(chunk) = self.retriever.corpus().find_article(key.law(), key.article()) {
                let mut c = RetrievalCandidate::from_chunk(&chunk, SUGGESTED_SCORE, Provenance::SuggestedArticle);
                c.key = key.clone();
                merged.push(c);
            } else {
                debug!(article = %key, "suggested article not in corpus");
            }
        }
        self.auto_supplement(query, plan, &suggested, &mut merged);
        merged.extend(rewritten_hits, Provenance::RewrittenQuery);

        let mut items = merged.items;
        rank(&mut items, plan, &suggested, mp);
        info!(
            results = items.len(),
            passes = passes.len(),
            suggested = suggested.len(),
            "multi-path retrieval"
        );
        Ok(items)
    }

    async fn run_passes(
        &self,
        passes: &[Pass],
        opts: &RetrieveOptions,
    ) -> Result<Vec<Vec<RetrievalCandidate>>, EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        for (slot, pass) in passes.iter().enumerate() {
            if pass.query.trim().is_empty() {
                continue;
            }
            let retriever = Arc::clone(&self.retriever);
            let semaphore = Arc::clone(&semaphore);
            let query = pass.query.clone();
            let opts = opts.clone().top_k(pass.top_k);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (slot, retriever.retrieve(&query, &opts).await)
            });
        }

        let mut outputs = vec![Vec::new(); passes.len()];
        while let Some(joined) = set.join_next().await {
            let (slot, result) = joined?;
            match result {
                Ok(hits) => outputs[slot] = hits,
                Err(e) => warn!(path = %passes[slot].provenance, error = %e, "retrieval pass failed"),
            }
        }
        Ok(outputs)
    }

    fn auto_supplement(
        &self,
        query: &str,
        plan: &QueryPlan,
        suggested: &[ArticleKey],
        merged: &mut Merge,
    ) {
        let main_issue = plan.main_issue.to_lowercase();
        let query = query.to_lowercase();
        for rule in &self.rules.multipath.auto_supplements {
            let triggered = rule.triggers.iter().any(|t| {
                main_issue.contains(t.as_str())
                    || (rule.scope == TriggerScope::MainIssueOrQuery && query.contains(t.as_str()))
            });
            if !triggered {
                continue;
            }
            for key in &rule.candidates {
                if suggested.contains(key) || merged.seen(key) {
                    break;
                }
                if let Some(chunk) = self.retriever.corpus().find_article(key.law(), key.article()) {
                    info!(article = %key, "auto-supplemented key article");
                    let mut c = RetrievalCandidate::from_chunk(&chunk, rule.score, Provenance::AutoSupplemented);
                    c.key = key.clone();
                    merged.push(c);
                    break;
                }
            }
        }
    }
}

/// First-seen de-duplication by (law, article).
#[derive(Default)]
struct Merge {
    items: Vec<RetrievalCandidate>,
    keys: HashSet<(String, String)>,
}

impl Merge {
    fn slot(key: &ArticleKey) -> (String, String) {
        (canonical_law_name(key.law()), normalize_article(key.article()))
    }

    fn seen(&self, key: &ArticleKey) -> bool {
        self.keys.contains(&Self::slot(key))
    }

    fn push(&mut self, c: RetrievalCandidate) {
        if self.keys.insert(Self::slot(&c.key)) {
            self.items.push(c);
        }
    }

    fn extend(&mut self, hits: Vec<RetrievalCandidate>, provenance: Provenance) {
        for mut c in hits {
            c.provenance = provenance;
            self.push(c);
        }
    }
}

fn path_priority(p: Provenance, mp: &MultiPathRules) -> f64 {
    let pr = &mp.priority;
    match p {
        Provenance::SuggestedArticle => pr.suggested_article,
        Provenance::AutoSupplemented => pr.auto_supplemented,
        Provenance::SubIssueHigh => pr.sub_issue_high,
        Provenance::SubIssueMedium => pr.sub_issue_medium,
        Provenance::GlobalKeywords => pr.global_keywords,
        _ => pr.rewritten_query,
    }
}

/// `final = base × priority`, with suggested-pair boosts, the first matching
/// cross-topic penalty, and the non-core-law factor. Sorted descending.
fn rank(items: &mut [RetrievalCandidate], plan: &QueryPlan, suggested: &[ArticleKey], mp: &MultiPathRules) {
    let suggested: HashSet<(String, String)> = suggested.iter().map(Merge::slot).collect();
    let main_issue = plan.main_issue.to_lowercase();

    for c in items.iter_mut() {
        let law = c.law();
        let article = c.article().trim();
        let mut priority = path_priority(c.provenance, mp);

        if suggested.contains(&Merge::slot(&c.key)) {
            priority *= mp.suggested_boost;
            for extra in &mp.extra_boosts {
                if extra.article == article && extra.laws.iter().any(|l| l == law) {
                    priority *= extra.factor;
                }
            }
        }
        if let Some(p) = mp.penalties.iter().find(|p| p.applies(&main_issue, law, article)) {
            priority *= p.factor;
        }
        if c.provenance != Provenance::SuggestedArticle && !plan.required_laws.iter().any(|l| l == law) {
            priority *= mp.non_core_factor;
        }
        c.score *= priority;
    }
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
}

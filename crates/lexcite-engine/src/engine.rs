//! The engine facade: owns every index and rule table and exposes retrieval,
//! validation, and the composed citation pipeline.

use std::sync::Arc;

use lexcite_ai::{CrossEncoder, QueryEncoder};
use lexcite_core::{ArticleKey, Citation, Provenance, QueryPlan, RetrievalCandidate};
use lexcite_store::{Corpus, HeadingIndex, LexicalIndex, ValidationDatabase, VectorStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::EngineError;
use crate::config::{EngineConfig, RuleBook};
use crate::fusion::{HybridRetriever, RetrieveOptions, is_blocked_score};
use crate::graph::KnowledgeGraph;
use crate::multipath::MultiPathRetriever;
use crate::query::{Harmonized, QueryRewriter, harmonize_plan};
use crate::semantic::SemanticIndex;
use crate::topics::{TopicAdvisory, TopicTable};
use crate::validator::{CitationValidator, Rejection, ValidationReport, WhitelistInsertion};

/// Optional inference collaborators wired in at open time.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub encoder: Option<Arc<dyn QueryEncoder>>,
    pub reranker: Option<Arc<dyn CrossEncoder>>,
}

/// Counts reported at startup and by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub chunks: usize,
    pub embeddings: usize,
    pub topics: usize,
    pub topic_version: String,
    pub laws: usize,
    pub validated_articles: usize,
    pub graph_entities: usize,
    pub scenarios: usize,
    pub semantic: bool,
    pub rerank: bool,
}

/// Result of plan-driven retrieval.
#[derive(Debug, Clone)]
pub struct PlannedRetrieval {
    /// The plan after harmonisation.
    pub plan: QueryPlan,
    pub harmonized: Harmonized,
    pub candidates: Vec<RetrievalCandidate>,
}

/// Input to [`Engine::cite`].
#[derive(Debug, Clone, Default)]
pub struct CiteRequest {
    pub query: String,
    /// When present, retrieval goes through the multi-path merge.
    pub plan: Option<QueryPlan>,
    pub rewritten: Option<String>,
    /// Overrides topic matching.
    pub topic: Option<String>,
    pub top_k: Option<usize>,
    pub use_rerank: bool,
}

impl CiteRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Citations cleared for release, with everything the caller should show
/// alongside them.
#[derive(Debug, Clone, Serialize)]
pub struct Cited {
    pub topic: Option<String>,
    pub candidates: Vec<RetrievalCandidate>,
    pub report: ValidationReport,
    pub insertions: Vec<WhitelistInsertion>,
    pub advisory: TopicAdvisory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CiteOutcome {
    Accepted(Box<Cited>),
    Rejected {
        rejection: Rejection,
        report: ValidationReport,
    },
}

pub struct Engine {
    config: EngineConfig,
    corpus: Arc<Corpus>,
    topics: Arc<TopicTable>,
    rules: Arc<RuleBook>,
    graph: Option<Arc<KnowledgeGraph>>,
    db: Arc<ValidationDatabase>,
    embeddings: usize,
    semantic: bool,
    rerank: bool,
    retriever: Arc<HybridRetriever>,
    rewriter: Arc<QueryRewriter>,
    multipath: MultiPathRetriever,
    validator: CitationValidator,
}

impl Engine {
    /// Load everything the engine serves from. Topic guides, the rule book,
    /// the corpus, and the validation database are required; the knowledge
    /// graph and embedding store are optional.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        Self::open_with(config, Collaborators::default())
    }

    pub fn open_with(config: EngineConfig, collaborators: Collaborators) -> Result<Self, EngineError> {
        let topics = Arc::new(TopicTable::load(&config.topic_guides)?);
        let rules = Arc::new(RuleBook::load(&config.rules)?);
        let db = Arc::new(ValidationDatabase::load(&config.validation_db)?);
        let corpus = Arc::new(Corpus::load(&config.corpus)?);

        let graph = match &config.knowledge_graph {
            Some(path) => match KnowledgeGraph::load(path) {
                Ok(g) => Some(Arc::new(g)),
                Err(e) => {
                    warn!(error = %e, "knowledge graph unavailable, scenario enforcement disabled");
                    None
                }
            },
            None => None,
        };
        let vectors = match &config.embeddings {
            Some(path) => match VectorStore::load(path) {
                Ok(v) => Some(Arc::new(v)),
                Err(e) => {
                    warn!(error = %e, "embedding store unavailable, semantic search disabled");
                    None
                }
            },
            None => None,
        };
        let embeddings = vectors.as_ref().map_or(0, |v| v.len());

        let timeout = config.collaborators.timeout();
        let semantic = Arc::new(SemanticIndex::new(
            vectors,
            collaborators.encoder,
            Arc::clone(&corpus),
            timeout,
        ));
        let semantic_ready = semantic.is_available();
        if !semantic_ready {
            info!("semantic search not provisioned, lexical and heading signals only");
        }
        let rerank = collaborators.reranker.is_some();
        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&corpus),
            Arc::new(LexicalIndex::build(&corpus)),
            Arc::new(HeadingIndex::build(&corpus)),
            semantic,
            Arc::clone(&topics),
            Arc::clone(&rules),
            collaborators.reranker,
            config.fusion.rerank_window,
            timeout,
        ));

        let rewriter = QueryRewriter::new(&rules.rewrites).map_err(|e| EngineError::InvalidConfig {
            path: config.rules.clone(),
            message: e.to_string(),
        })?;
        let rewriter = Arc::new(rewriter);
        let multipath = MultiPathRetriever::new(
            Arc::clone(&retriever),
            Arc::clone(&rules),
            Arc::clone(&rewriter),
            config.multipath.workers,
        )
        .with_defaults(RetrieveOptions::from_config(&config.fusion));
        let validator = CitationValidator::new(Arc::clone(&db), Arc::clone(&rules));

        let engine = Self {
            config,
            corpus,
            topics,
            rules,
            graph,
            db,
            embeddings,
            semantic: semantic_ready,
            rerank,
            retriever,
            rewriter,
            multipath,
            validator,
        };
        let i = engine.info();
        info!(
            chunks = i.chunks,
            topics = i.topics,
            laws = i.laws,
            articles = i.validated_articles,
            graph_entities = i.graph_entities,
            semantic = i.semantic,
            rerank = i.rerank,
            "engine ready"
        );
        Ok(engine)
    }

    /// Release every index. Nothing is persisted.
    pub fn close(self) {
        info!(chunks = self.corpus.len(), "engine closed");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn graph(&self) -> Option<&KnowledgeGraph> {
        self.graph.as_deref()
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            chunks: self.corpus.len(),
            embeddings: self.embeddings,
            topics: self.topics.len(),
            topic_version: self.topics.version().to_string(),
            laws: self.db.laws().count(),
            validated_articles: self.db.article_count(),
            graph_entities: self.graph.as_ref().map_or(0, |g| g.entity_count()),
            scenarios: self.graph.as_ref().map_or(0, |g| g.scenarios().len()),
            semantic: self.semantic,
            rerank: self.rerank,
        }
    }

    /// Retrieval options seeded from the configured fusion weights.
    pub fn options(&self) -> RetrieveOptions {
        RetrieveOptions::from_config(&self.config.fusion)
    }

    /// Hybrid fusion for one query.
    pub async fn retrieve(
        &self,
        query: &str,
        opts: &RetrieveOptions,
    ) -> Result<Vec<RetrievalCandidate>, EngineError> {
        self.retriever.retrieve(query, opts).await
    }

    /// Harmonise `plan` (or the fallback plan) and run the multi-path merge.
    /// The merged list is truncated to `top_k`.
    pub async fn retrieve_with_plan(
        &self,
        query: &str,
        plan: Option<QueryPlan>,
        rewritten: Option<&str>,
        top_k: usize,
        use_rerank: bool,
    ) -> Result<PlannedRetrieval, EngineError> {
        let mut plan = plan.unwrap_or_else(|| QueryPlan::fallback(query, &self.rules.default_law));
        let harmonized = harmonize_plan(&mut plan, query, &self.rules.canonical_issues);
        let mut candidates = self
            .multipath
            .retrieve(query, &plan, rewritten, top_k, use_rerank)
            .await?;
        candidates.truncate(top_k.max(1));
        Ok(PlannedRetrieval {
            plan,
            harmonized,
            candidates,
        })
    }

    /// Append scenario-required articles from the knowledge graph, with text
    /// from the validation database. Articles the database lacks are dropped,
    /// since they could never pass the existence check.
    pub fn enhance_citations(&self, query: &str, candidates: &[RetrievalCandidate]) -> Vec<RetrievalCandidate> {
        let Some(graph) = &self.graph else {
            return candidates.to_vec();
        };
        graph
            .enhance_citations(candidates, query)
            .into_iter()
            .filter_map(|mut c| {
                if c.provenance != Provenance::GraphEnforced {
                    return Some(c);
                }
                match self.db.lookup(c.law(), c.article()) {
                    Some((_, record)) => {
                        c.text = record.text.clone();
                        if c.heading.is_empty() {
                            c.heading = record.heading.clone();
                        }
                        Some(c)
                    }
                    None => {
                        warn!(article = %c.key, "graph-required article missing from validation database");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn enforce_whitelist(
        &self,
        query: &str,
        topic: Option<&str>,
        results: &mut Vec<RetrievalCandidate>,
    ) -> Vec<WhitelistInsertion> {
        self.validator.enforce_whitelist(query, topic, results)
    }

    pub fn validate(&self, query: &str, citations: &[Citation], topic: Option<&str>) -> ValidationReport {
        self.validator.validate(query, citations, topic)
    }

    /// Retrieval, graph enhancement, whitelist enforcement, and validation
    /// in one pass.
    pub async fn cite(&self, request: CiteRequest) -> Result<CiteOutcome, EngineError> {
        let query = request.query.as_str();
        let topic = request
            .topic
            .clone()
            .or_else(|| self.topics.resolve(query).map(|m| m.topic_id));
        let top_k = request.top_k.unwrap_or(self.config.fusion.top_k);

        let candidates = match request.plan {
            Some(plan) => {
                self.retrieve_with_plan(query, Some(plan), request.rewritten.as_deref(), top_k, request.use_rerank)
                    .await?
                    .candidates
            }
            None => {
                let rewritten = request
                    .rewritten
                    .clone()
                    .unwrap_or_else(|| self.rewriter.rewrite(query));
                let mut opts = self.options().top_k(top_k).rerank(request.use_rerank);
                opts.topic = topic.clone();
                self.retrieve(&rewritten, &opts).await?
            }
        };

        let mut candidates = self.enhance_citations(query, &candidates);
        let insertions = self.enforce_whitelist(query, topic.as_deref(), &mut candidates);
        // Whitelist insertions lead the list and always survive the cut.
        let before = candidates.len();
        candidates.retain(|c| !is_blocked_score(c.score));
        if candidates.len() < before {
            debug!(dropped = before - candidates.len(), "dropped blocked-law candidates");
        }
        candidates.truncate(top_k.max(insertions.len()).max(1));

        let citations: Vec<Citation> = candidates.iter().map(Citation::from).collect();
        let report = self.validate(query, &citations, topic.as_deref());
        if let Some(rejection) = report.rejection() {
            return Ok(CiteOutcome::Rejected { rejection, report });
        }

        let keys: Vec<ArticleKey> = candidates.iter().map(|c| c.key.clone()).collect();
        let advisory = self.topics.consistency(query, &keys);
        let (reasoning, common_errors) = match &self.graph {
            Some(g) => (
                g.scenario_reasoning(query).map(str::to_string),
                g.common_errors(query),
            ),
            None => (None, Vec::new()),
        };

        Ok(CiteOutcome::Accepted(Box::new(Cited {
            topic,
            candidates,
            report,
            insertions,
            advisory,
            reasoning,
            common_errors,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{candidate, engine_config};
    use crate::validator::Action;
    use lexcite_core::{Importance, SubIssue};
    use tempfile::TempDir;

    fn engine(tmp: &TempDir) -> Engine {
        Engine::open(engine_config(tmp.path())).unwrap()
    }

    fn keys(items: &[RetrievalCandidate]) -> Vec<String> {
        items.iter().map(|c| c.key.to_string()).collect()
    }

    #[test]
    fn open_reports_counts() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);
        let info = e.info();
        assert_eq!(info.chunks, 17);
        assert_eq!(info.validated_articles, 17);
        assert!(info.topics >= 10);
        assert!(info.graph_entities > 0);
        assert!(!info.semantic);
        e.close();
    }

    #[test]
    fn missing_topic_guides_refuse_to_open() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = engine_config(tmp.path());
        cfg.topic_guides = tmp.path().join("absent.toml");
        let err = Engine::open(cfg).err().unwrap();
        assert!(matches!(err, EngineError::MissingConfig(_)), "{err}");
    }

    #[test]
    fn missing_validation_db_refuses_to_open() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = engine_config(tmp.path());
        cfg.validation_db = tmp.path().join("absent.json");
        assert!(matches!(Engine::open(cfg), Err(EngineError::Store(_))));
    }

    #[test]
    fn missing_graph_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = engine_config(tmp.path());
        cfg.knowledge_graph = Some(tmp.path().join("absent.json"));
        let e = Engine::open(cfg).unwrap();
        assert!(e.graph().is_none());
        let items = vec![candidate("勞動基準法", "22", 1.0)];
        assert_eq!(e.enhance_citations("員工曠職三天，薪水怎麼算？", &items), items);
    }

    #[test]
    fn graph_enhancement_fills_text() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);
        let items = vec![candidate("勞動基準法", "22", 1.0)];
        let out = e.enhance_citations("員工曠職三天，薪水怎麼算？", &items);
        assert_eq!(keys(&out), vec!["勞動基準法#22", "勞動基準法#26", "勞動基準法#12"]);
        assert!(out[1..].iter().all(|c| !c.text.is_empty()));
    }

    #[tokio::test]
    async fn cite_wage_scenario() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);
        let outcome = e.cite(CiteRequest::new("員工曠職三天，薪水怎麼算？")).await.unwrap();
        let CiteOutcome::Accepted(cited) = outcome else {
            panic!("rejected");
        };
        assert_eq!(cited.topic.as_deref(), Some("wage_deduction"));
        let ks = keys(&cited.candidates);
        for want in ["勞動基準法#22", "勞動基準法#26", "勞動基準法#12"] {
            assert!(ks.contains(&want.to_string()), "{want} missing from {ks:?}");
        }
        assert_ne!(cited.report.action(), Action::Block);
        assert!(cited.reasoning.is_some());
    }

    #[tokio::test]
    async fn cite_drops_blocked_laws_and_respects_top_k() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);
        let query = "員工曠職三天，薪水怎麼算？僱用人受領勞務遲延 請求報酬";

        // The fused list itself keeps the blocked civil-law article at the bottom.
        let mut opts = e.options().top_k(17);
        opts.topic = Some("wage_deduction".into());
        let fused = e.retrieve(query, &opts).await.unwrap();
        assert!(fused.iter().any(|c| c.law() == "民法" && is_blocked_score(c.score)));

        for top_k in [3, 17] {
            let mut request = CiteRequest::new(query);
            request.topic = Some("wage_deduction".into());
            request.top_k = Some(top_k);
            let CiteOutcome::Accepted(cited) = e.cite(request).await.unwrap() else {
                panic!("rejected");
            };
            assert!(cited.candidates.len() <= top_k, "{:?}", keys(&cited.candidates));
            assert!(cited.candidates.iter().all(|c| c.law() != "民法"));
            assert!(!cited.report.warnings().iter().any(|w| w.contains("[CONFLICT]")));
        }
    }

    #[tokio::test]
    async fn cite_retrieves_with_rewritten_query() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);

        let raw = e.cite(CiteRequest::new("qq")).await.unwrap();
        assert!(matches!(raw, CiteOutcome::Rejected { .. }));

        let mut request = CiteRequest::new("qq");
        request.rewritten = Some("雇主資遣員工 列冊通報".into());
        let CiteOutcome::Accepted(cited) = e.cite(request).await.unwrap() else {
            panic!("rewritten query retrieved nothing");
        };
        assert!(!cited.candidates.is_empty());
    }

    #[tokio::test]
    async fn cite_with_plan_harmonizes_and_merges() {
        let tmp = TempDir::new().unwrap();
        let e = engine(&tmp);
        let plan = QueryPlan {
            main_issue: "資遣".into(),
            sub_issues: vec![SubIssue {
                issue: "預告期間".into(),
                importance: Importance::High,
                suggested_articles: vec!["勞動基準法第16條".into()],
                keywords: vec!["預告期間".into()],
            }],
            required_laws: vec!["勞動基準法".into()],
            suggested_keywords: vec!["資遣".into(), "預告".into()],
            estimated_difficulty: "medium".into(),
            reasoning: String::new(),
        };
        let planned = e
            .retrieve_with_plan("公司資遣我要預告嗎", Some(plan), None, 5, false)
            .await
            .unwrap();
        assert_eq!(planned.harmonized.label.as_deref(), Some("資遣費計算與預告期工資"));
        assert!(planned.candidates.len() <= 5);
        assert!(keys(&planned.candidates).contains(&"勞動基準法#16".to_string()));
        assert_eq!(planned.plan.main_issue, "資遣費計算與預告期工資");
    }

    #[tokio::test]
    async fn cite_rejects_what_cannot_be_validated() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = engine_config(tmp.path());
        // A database that knows none of the corpus.
        let db = tmp.path().join("empty.json");
        std::fs::write(&db, r#"{"validated_articles": {}}"#).unwrap();
        cfg.validation_db = db;
        let e = Engine::open(cfg).unwrap();
        let outcome = e.cite(CiteRequest::new("加班費怎麼算")).await.unwrap();
        let CiteOutcome::Rejected { rejection, report } = outcome else {
            panic!("accepted citations that do not exist");
        };
        assert!(report.is_blocked());
        assert!(!rejection.errors.is_empty());
    }
}

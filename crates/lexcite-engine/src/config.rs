//! Engine configuration and the external rule book.
//!
//! Everything an auditor may want to change without a rebuild lives in TOML:
//! file locations and fusion weights in `lexcite.toml`, the whitelist,
//! conflict table, multi-path weighting and canonical issues in `rules.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lexcite_core::ArticleKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Read and parse a TOML file. A missing file is a [`EngineError::MissingConfig`].
pub(crate) fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    if !path.exists() {
        return Err(EngineError::MissingConfig(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| EngineError::InvalidConfig {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ── EngineConfig ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// JSON chunk index written by the corpus builder.
    pub corpus: PathBuf,
    pub validation_db: PathBuf,
    pub topic_guides: PathBuf,
    pub rules: PathBuf,
    /// Scenario graph. Optional; without it graph enhancement is skipped.
    pub knowledge_graph: Option<PathBuf>,
    /// Parquet passage embeddings. Optional; without it retrieval is lexical only.
    pub embeddings: Option<PathBuf>,
    pub embedding_model: String,
    pub fusion: FusionConfig,
    pub collaborators: CollaboratorConfig,
    pub multipath: MultiPathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub w_vec: f64,
    pub w_lex: f64,
    pub rerank_window: usize,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiPathConfig {
    /// Concurrent retrieval passes.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_data_dir(Path::new("data"))
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            w_vec: 0.6,
            w_lex: 0.4,
            rerank_window: 20,
            top_k: 5,
        }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl Default for MultiPathConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    /// The standard layout under one data directory.
    pub fn with_data_dir(dir: &Path) -> Self {
        Self {
            corpus: dir.join("index").join("index.json"),
            validation_db: dir.join("citation_validation.json"),
            topic_guides: dir.join("topic_guides.toml"),
            rules: dir.join("rules.toml"),
            knowledge_graph: Some(dir.join("knowledge_graph.json")),
            embeddings: None,
            embedding_model: "BAAI/bge-large-zh-v1.5".into(),
            fusion: FusionConfig::default(),
            collaborators: CollaboratorConfig::default(),
            multipath: MultiPathConfig::default(),
        }
    }

    /// Load from a TOML file. Relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let mut cfg: EngineConfig = load_toml(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        cfg.resolve_relative(base);
        Ok(cfg)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.corpus);
        fix(&mut self.validation_db);
        fix(&mut self.topic_guides);
        fix(&mut self.rules);
        if let Some(p) = self.knowledge_graph.as_mut() {
            fix(p);
        }
        if let Some(p) = self.embeddings.as_mut() {
            fix(p);
        }
    }
}

// ── RuleBook ──

/// Hand-authored rule tables. Reproduced verbatim from the legal team's review;
/// treat as data, not logic.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleBook {
    /// Law used when a topic names no preferred law.
    pub default_law: String,
    #[serde(default)]
    pub civil_law: CivilLawRule,
    #[serde(default)]
    pub whitelist: Vec<WhitelistRule>,
    #[serde(default)]
    pub conflicts: Vec<ConflictRule>,
    pub multipath: MultiPathRules,
    #[serde(default)]
    pub canonical_issues: Vec<CanonicalIssue>,
    #[serde(default)]
    pub rewrites: Vec<RewriteRule>,
}

/// Generic civil-law statutes are penalised unless the query asks for them.
#[derive(Debug, Clone, Deserialize)]
pub struct CivilLawRule {
    pub marker: String,
    pub triggers: Vec<String>,
    pub penalty: f64,
}

impl Default for CivilLawRule {
    fn default() -> Self {
        Self {
            marker: "民法".into(),
            triggers: ["民法", "債編", "僱傭", "債務", "侵權"]
                .map(String::from)
                .to_vec(),
            penalty: 0.5,
        }
    }
}

/// Articles that must accompany any answer on a high-risk topic.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistRule {
    pub topic: String,
    pub articles: Vec<ArticleKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictRule {
    pub law: String,
    pub article: String,
    /// Laws that must not be cited alongside this article.
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    /// Articles that must be cited alongside this one.
    #[serde(default)]
    pub requires: Vec<ArticleKey>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiPathRules {
    pub priority: PathPriority,
    pub suggested_boost: f64,
    pub non_core_factor: f64,
    pub global_keyword_limit: usize,
    #[serde(default)]
    pub extra_boosts: Vec<ExtraBoost>,
    /// Evaluated in order; the first rule whose condition holds applies.
    #[serde(default)]
    pub penalties: Vec<IssuePenalty>,
    #[serde(default)]
    pub auto_supplements: Vec<AutoSupplement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathPriority {
    pub suggested_article: f64,
    pub auto_supplemented: f64,
    pub sub_issue_high: f64,
    pub sub_issue_medium: f64,
    pub global_keywords: f64,
    pub rewritten_query: f64,
}

/// Further multiplier for an LLM-suggested article.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraBoost {
    pub laws: Vec<String>,
    pub article: String,
    pub factor: f64,
}

/// Down-weight an article that contaminates a different main issue.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePenalty {
    /// Main issue must contain one of these (ignored when empty).
    #[serde(default)]
    pub issue_any: Vec<String>,
    /// Main issue must contain none of these (ignored when empty).
    #[serde(default)]
    pub issue_none: Vec<String>,
    pub law: String,
    pub articles: Vec<String>,
    pub factor: f64,
}

impl IssuePenalty {
    pub fn applies(&self, main_issue: &str, law: &str, article: &str) -> bool {
        (self.issue_any.is_empty() || self.issue_any.iter().any(|k| main_issue.contains(k.as_str())))
            && !self.issue_none.iter().any(|k| main_issue.contains(k.as_str()))
            && self.law == law
            && self.articles.iter().any(|a| a == article)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    MainIssue,
    MainIssueOrQuery,
}

/// Key article added when the issue matches and the plan did not suggest it.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSupplement {
    pub triggers: Vec<String>,
    pub scope: TriggerScope,
    /// Tried in order; the first one present in the corpus is used.
    pub candidates: Vec<ArticleKey>,
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalIssue {
    pub label: String,
    /// All must be present for a match.
    pub keywords: Vec<String>,
    #[serde(default)]
    pub required_laws: Vec<String>,
    #[serde(default)]
    pub forced_articles: Vec<ArticleKey>,
    #[serde(default)]
    pub force_complex: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replacement: String,
}

impl RuleBook {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let book: RuleBook = load_toml(path)?;
        book.validate(path)?;
        Ok(book)
    }

    fn validate(&self, path: &Path) -> Result<(), EngineError> {
        let invalid = |message: String| EngineError::InvalidConfig {
            path: path.to_path_buf(),
            message,
        };
        if self.default_law.trim().is_empty() {
            return Err(invalid("default_law is empty".into()));
        }
        for rule in &self.rewrites {
            regex::Regex::new(&rule.pattern)
                .map_err(|e| invalid(format!("rewrite pattern {:?}: {e}", rule.pattern)))?;
        }
        for rule in &self.conflicts {
            if rule.law.trim().is_empty() || rule.article.trim().is_empty() {
                return Err(invalid("conflict rule with empty law or article".into()));
            }
        }
        Ok(())
    }

    /// Mandatory articles for a topic, empty if the topic has no whitelist.
    pub fn whitelist_for(&self, topic: &str) -> &[ArticleKey] {
        self.whitelist
            .iter()
            .find(|w| w.topic == topic)
            .map(|w| w.articles.as_slice())
            .unwrap_or(&[])
    }
}

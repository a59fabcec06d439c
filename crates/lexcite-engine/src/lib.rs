//! Hybrid statute retrieval and citation validation.
//!
//! Lexical, semantic, and heading signals are fused under topic routing
//! rules; an optional query plan fans out into a multi-path merge; the final
//! citation set passes a four-layer validator before release.

mod config;
mod engine;
mod error;
mod fusion;
mod graph;
mod multipath;
mod query;
mod semantic;
mod topics;
mod validator;

#[cfg(test)]
mod testutil;

pub use config::{
    AutoSupplement, CanonicalIssue, CivilLawRule, CollaboratorConfig, ConflictRule, EngineConfig,
    ExtraBoost, FusionConfig, IssuePenalty, MultiPathConfig, MultiPathRules, PathPriority,
    RewriteRule, RuleBook, TriggerScope, WhitelistRule,
};
pub use engine::{Cited, CiteOutcome, CiteRequest, Collaborators, Engine, EngineInfo, PlannedRetrieval};
pub use error::{EngineError, RetrievalError};
pub use fusion::{
    FORCED_SCORE, HybridRetriever, RetrieveOptions, extract_article_hint, extract_chapter_token,
    extract_keywords,
};
pub use graph::{GraphEntity, GraphRelation, KnowledgeGraph, Scenario};
pub use multipath::MultiPathRetriever;
pub use query::{Harmonized, QueryRewriter, harmonize_plan};
pub use semantic::SemanticIndex;
pub use topics::{Category, CoreEntry, TopicAdvisory, TopicGuide, TopicMatch, TopicTable};
pub use validator::{
    Action, CheckKind, CheckResult, CitationValidator, Rejection, Status, ValidationReport,
    WhitelistInsertion,
};

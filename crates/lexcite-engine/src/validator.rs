//! Four-layer citation validation.
//!
//! Layer 1 runs right after retrieval and forces mandatory articles for a
//! recognised topic into the candidate list. Layers 2 to 4 run over the final
//! citation list: existence in the validation database (fatal), textual
//! fidelity against the canonical checksum (advisory), and the conflict
//! table (advisory).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexcite_core::{
    ArticleKey, Citation, Provenance, RetrievalCandidate, canonical_law_name, normalize_article,
};
use lexcite_store::{ArticleRecord, ValidationDatabase, checksum};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RuleBook;
use crate::fusion::FORCED_SCORE;

const REJECTION_SUGGESTION: &str = "One or more cited articles do not exist. Check the law names and \
     article numbers against the retrieved statutes and cite only articles present there.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Approve,
    Warn,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Existence,
    Content,
}

/// Outcome of one layer for one citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// `law#article` as cited.
    pub citation: String,
    pub check: CheckKind,
    pub passed: bool,
    pub message: String,
}

/// Immutable verdict for one citation list.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    status: Status,
    action: Action,
    checks: Vec<CheckResult>,
    errors: Vec<String>,
    warnings: Vec<String>,
    query: String,
    topic: Option<String>,
    created_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }

    /// The structured rejection a caller must return instead of an answer.
    pub fn rejection(&self) -> Option<Rejection> {
        self.is_blocked().then(|| Rejection {
            errors: self.errors.clone(),
            suggestion: REJECTION_SUGGESTION.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub errors: Vec<String>,
    pub suggestion: String,
}

/// Audit entry for an article forced in by the topic whitelist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhitelistInsertion {
    pub key: ArticleKey,
    pub topic: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

/// (canonical law, normalised article): the identity used for every
/// presence check in this module.
fn slot(law: &str, article: &str) -> (String, String) {
    (canonical_law_name(law), normalize_article(article))
}

pub struct CitationValidator {
    db: Arc<ValidationDatabase>,
    rules: Arc<RuleBook>,
}

impl CitationValidator {
    pub fn new(db: Arc<ValidationDatabase>, rules: Arc<RuleBook>) -> Self {
        Self { db, rules }
    }

    /// Layer 1. Put every whitelisted article for `topic` that `results`
    /// lacks at the front, in whitelist order, with a score above everything
    /// already present.
    ///
    /// Articles missing from the validation database cannot be inserted and
    /// are logged instead.
    pub fn enforce_whitelist(
        &self,
        query: &str,
        topic: Option<&str>,
        results: &mut Vec<RetrievalCandidate>,
    ) -> Vec<WhitelistInsertion> {
        let Some(topic) = topic else {
            return Vec::new();
        };
        let required = self.rules.whitelist_for(topic);
        if required.is_empty() {
            return Vec::new();
        }

        let present: Vec<(String, String)> = results.iter().map(|c| slot(c.law(), c.article())).collect();
        let score = results
            .iter()
            .map(|c| c.score)
            .fold(FORCED_SCORE, f64::max)
            + 1.0;

        let mut forced = Vec::new();
        let mut insertions = Vec::new();
        for key in required {
            if present.contains(&slot(key.law(), key.article())) {
                continue;
            }
            let Some((article, record)) = self.db.lookup(key.law(), key.article()) else {
                warn!(%topic, article = %key, "whitelisted article missing from validation database");
                continue;
            };
            info!(%topic, article = %key, query, "whitelist insertion");
            forced.push(RetrievalCandidate {
                key: key.clone(),
                chunk_id: None,
                heading: if record.heading.is_empty() {
                    format!("第 {article} 條")
                } else {
                    record.heading.clone()
                },
                chapter: String::new(),
                text: record.text.clone(),
                score,
                provenance: Provenance::EnforcedWhitelist,
                boosted_for: None,
            });
            insertions.push(WhitelistInsertion {
                key: key.clone(),
                topic: topic.to_string(),
                query: query.to_string(),
                timestamp: Utc::now(),
            });
        }
        results.splice(0..0, forced);
        insertions
    }

    /// Layers 2 to 4 over `citations`, aggregated into one report.
    pub fn validate(&self, query: &str, citations: &[Citation], topic: Option<&str>) -> ValidationReport {
        let mut checks = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if citations.is_empty() {
            errors.push("[ERROR] No citations provided".to_string());
        }

        let mut missing = 0usize;
        for citation in citations {
            let id = citation.key.to_string();
            let record = match self.existence(citation) {
                Ok(record) => {
                    checks.push(CheckResult {
                        citation: id.clone(),
                        check: CheckKind::Existence,
                        passed: true,
                        message: "[OK] Citation exists".into(),
                    });
                    record
                }
                Err(message) => {
                    missing += 1;
                    errors.push(message.clone());
                    checks.push(CheckResult {
                        citation: id,
                        check: CheckKind::Existence,
                        passed: false,
                        message,
                    });
                    continue;
                }
            };

            let (passed, message) = content_check(&citation.text, record);
            if !passed || message.starts_with("[WARN]") {
                warnings.push(format!("[Content Validation] {message}"));
            }
            checks.push(CheckResult {
                citation: id,
                check: CheckKind::Content,
                passed,
                message,
            });
        }

        warnings.extend(self.conflicts(citations));

        let (status, action) = if !errors.is_empty() {
            (Status::Fail, Action::Block)
        } else if !warnings.is_empty() {
            (Status::Warning, Action::Warn)
        } else {
            (Status::Pass, Action::Approve)
        };

        if action == Action::Block {
            warn!(query, citations = citations.len(), missing, "citations blocked");
        } else {
            debug!(query, citations = citations.len(), warnings = warnings.len(), ?status, "citations validated");
        }

        ValidationReport {
            status,
            action,
            checks,
            errors,
            warnings,
            query: query.to_string(),
            topic: topic.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    /// Layer 2.
    fn existence(&self, citation: &Citation) -> Result<&ArticleRecord, String> {
        let law = citation.key.law();
        let article = citation.key.article();
        if !self.db.has_law(law) {
            return Err(format!("[ERROR] Law '{law}' not found in validation DB"));
        }
        self.db.lookup(law, article).map(|(_, record)| record).ok_or_else(|| {
            format!(
                "[ERROR] Article No. '{article}' (normalized: {}) not found in {law}",
                normalize_article(article)
            )
        })
    }

    /// Layer 4.
    fn conflicts(&self, citations: &[Citation]) -> Vec<String> {
        let mut out = Vec::new();
        for citation in citations {
            let cited = slot(citation.key.law(), citation.key.article());
            let Some(rule) = self
                .rules
                .conflicts
                .iter()
                .find(|r| slot(&r.law, &r.article) == cited)
            else {
                continue;
            };

            for marker in &rule.conflicts_with {
                for other in citations.iter().filter(|c| c.key.law().contains(marker.as_str())) {
                    out.push(format!(
                        "[CONFLICT] {} with {} (Reason: {})",
                        citation.key,
                        other.key.law(),
                        rule.reason
                    ));
                }
            }
            for req in &rule.requires {
                let want = normalize_article(req.article());
                let found = citations.iter().any(|c| {
                    canonical_law_name(c.key.law()).contains(req.law()) && normalize_article(c.key.article()) == want
                });
                if !found {
                    out.push(format!(
                        "[INCOMPLETE] {} requires {} (Reason: {})",
                        citation.key, req, rule.reason
                    ));
                }
            }
        }
        out
    }
}

/// Layer 3. Strict checksum, then whitespace-free comparison, then key-phrase
/// containment. Returns whether the citation passes and the message.
fn content_check(cited: &str, record: &ArticleRecord) -> (bool, String) {
    let canonical = if record.checksum.is_empty() {
        checksum(&record.text)
    } else {
        record.checksum.clone()
    };
    if checksum(cited) == canonical {
        return (true, "[OK] Content matches checksum".into());
    }

    let squeeze = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    if !record.text.is_empty() && squeeze(cited) == squeeze(&record.text) {
        return (true, "[OK] Content matches checksum with loose normalization".into());
    }

    let phrases = &record.key_phrases;
    if phrases.is_empty() {
        return (true, "[WARN] Content checksum mismatch (no key phrases to validate)".into());
    }
    let matched = phrases.iter().filter(|p| cited.contains(p.as_str())).count();
    let total = phrases.len();
    if matched * 2 >= total {
        (
            true,
            format!("[WARN] Checksum mismatch but {matched}/{total} key phrases present (formatting difference)"),
        )
    } else if matched > 0 {
        (true, format!("[WARN] Partial key phrase match: {matched}/{total}"))
    } else {
        let expected: Vec<&str> = phrases.iter().take(3).map(String::as_str).collect();
        (
            false,
            format!("[ERROR] No key phrase matched (expected: {}...)", expected.join(", ")),
        )
    }
}

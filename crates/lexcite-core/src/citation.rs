//! Citation and candidate records shared by retrieval and validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::article::normalize_article;
use crate::chunk::StatuteChunk;
use crate::error::CoreError;
use crate::law::canonical_law_name;

/// A (law, article) pair. Both components are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawArticleKey")]
pub struct ArticleKey {
    law: String,
    article: String,
}

#[derive(Deserialize)]
struct RawArticleKey {
    #[serde(alias = "law_id", alias = "law_name")]
    law: String,
    #[serde(alias = "article_no")]
    article: String,
}

impl TryFrom<RawArticleKey> for ArticleKey {
    type Error = CoreError;

    fn try_from(raw: RawArticleKey) -> Result<Self, Self::Error> {
        ArticleKey::new(raw.law, raw.article)
    }
}

impl ArticleKey {
    pub fn new(law: impl Into<String>, article: impl Into<String>) -> Result<Self, CoreError> {
        let law = law.into().trim().to_string();
        let article = article.into().trim().to_string();
        if law.is_empty() {
            return Err(CoreError::EmptyLaw);
        }
        if article.is_empty() {
            return Err(CoreError::EmptyArticle { law });
        }
        Ok(Self { law, article })
    }

    pub fn law(&self) -> &str {
        &self.law
    }

    pub fn article(&self) -> &str {
        &self.article
    }

    /// Canonical law title and arabic article number.
    pub fn normalized(&self) -> Self {
        Self {
            law: canonical_law_name(&self.law),
            article: normalize_article(&self.article),
        }
    }

    /// Identifier used by the knowledge graph, e.g. `勞動基準法第22條`.
    pub fn graph_id(&self) -> String {
        format!("{}第{}條", self.law, self.article)
    }

    /// Parse a `勞動基準法第16條` style reference.
    pub fn parse_reference(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let (law, rest) = s
            .split_once('第')
            .ok_or_else(|| CoreError::BadArticleRef(s.to_string()))?;
        let article = rest
            .split_once('條')
            .map(|(a, _)| a)
            .ok_or_else(|| CoreError::BadArticleRef(s.to_string()))?;
        let article = article.trim();
        if article.is_empty() || !article.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(CoreError::BadArticleRef(s.to_string()));
        }
        ArticleKey::new(law, article)
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.law, self.article)
    }
}

/// A proposed citation: which article, plus the text claimed to be its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCitation")]
pub struct Citation {
    #[serde(flatten)]
    pub key: ArticleKey,
    pub heading: String,
    pub text: String,
}

#[derive(Deserialize)]
struct RawCitation {
    #[serde(alias = "law_id", alias = "law_name")]
    law: String,
    #[serde(alias = "article_no")]
    article: String,
    #[serde(default)]
    heading: String,
    #[serde(default)]
    text: String,
}

impl TryFrom<RawCitation> for Citation {
    type Error = CoreError;

    fn try_from(raw: RawCitation) -> Result<Self, Self::Error> {
        Ok(Citation {
            key: ArticleKey::new(raw.law, raw.article)?,
            heading: raw.heading,
            text: raw.text,
        })
    }
}

impl Citation {
    pub fn new(key: ArticleKey, heading: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key,
            heading: heading.into(),
            text: text.into(),
        }
    }
}

impl From<&RetrievalCandidate> for Citation {
    fn from(c: &RetrievalCandidate) -> Self {
        Citation::new(c.key.clone(), c.heading.clone(), c.text.clone())
    }
}

/// Which retrieval path contributed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Weighted lexical + semantic fusion.
    Hybrid,
    /// Exact article-number or heading-keyword hit.
    HeadingMatch,
    /// Forced in because a prior article was missing.
    PriorArticle,
    Reranked,
    EnforcedWhitelist,
    GraphEnforced,
    GlobalKeywords,
    SubIssueHigh,
    SubIssueMedium,
    SuggestedArticle,
    AutoSupplemented,
    RewrittenQuery,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hybrid => "HYBRID",
            Self::HeadingMatch => "HEADING_MATCH",
            Self::PriorArticle => "PRIOR_ARTICLE",
            Self::Reranked => "RERANKED",
            Self::EnforcedWhitelist => "ENFORCED_WHITELIST",
            Self::GraphEnforced => "GRAPH_ENFORCED",
            Self::GlobalKeywords => "GLOBAL_KEYWORDS",
            Self::SubIssueHigh => "SUB_ISSUE_HIGH",
            Self::SubIssueMedium => "SUB_ISSUE_MEDIUM",
            Self::SuggestedArticle => "SUGGESTED_ARTICLE",
            Self::AutoSupplemented => "AUTO_SUPPLEMENTED",
            Self::RewrittenQuery => "REWRITTEN_QUERY",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored candidate produced during one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalCandidate {
    #[serde(flatten)]
    pub key: ArticleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub heading: String,
    pub chapter: String,
    pub text: String,
    pub score: f64,
    pub provenance: Provenance,
    /// Topic whose guide boost has already been applied to `score`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boosted_for: Option<String>,
}

impl RetrievalCandidate {
    pub fn from_chunk(chunk: &StatuteChunk, score: f64, provenance: Provenance) -> Self {
        Self {
            key: chunk.key.clone(),
            chunk_id: Some(chunk.id.clone()),
            heading: chunk.heading.clone(),
            chapter: chunk.chapter.clone(),
            text: chunk.text.clone(),
            score,
            provenance,
            boosted_for: None,
        }
    }

    pub fn law(&self) -> &str {
        self.key.law()
    }

    pub fn article(&self) -> &str {
        self.key.article()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_components_rejected() {
        assert_eq!(ArticleKey::new("", "22"), Err(CoreError::EmptyLaw));
        assert_eq!(
            ArticleKey::new("勞動基準法", "  "),
            Err(CoreError::EmptyArticle {
                law: "勞動基準法".into()
            })
        );
    }

    #[test]
    fn citation_json_aliases() {
        let json = r#"{"law_name": "勞動基準法", "article_no": "22", "text": "工資應全額直接給付勞工。"}"#;
        let c: Citation = serde_json::from_str(json).unwrap();
        assert_eq!(c.key.law(), "勞動基準法");
        assert_eq!(c.key.article(), "22");
        assert!(c.heading.is_empty());
    }

    #[test]
    fn citation_json_rejects_blank_article() {
        let json = r#"{"law": "勞動基準法", "article": ""}"#;
        let err = serde_json::from_str::<Citation>(json).unwrap_err();
        assert!(err.to_string().contains("empty article"), "{err}");
    }

    #[test]
    fn citation_serializes_flat() {
        let c = Citation::new(ArticleKey::new("民法", "487").unwrap(), "", "text");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["law"], "民法");
        assert_eq!(v["article"], "487");
    }

    #[test]
    fn parse_reference_forms() {
        let k = ArticleKey::parse_reference("勞動基準法第16條").unwrap();
        assert_eq!((k.law(), k.article()), ("勞動基準法", "16"));
        let k = ArticleKey::parse_reference("就業保險法第 19-1 條").unwrap();
        assert_eq!(k.article(), "19-1");
        assert!(ArticleKey::parse_reference("勞動基準法").is_err());
        assert!(ArticleKey::parse_reference("勞動基準法第二十條").is_err());
    }

    #[test]
    fn normalized_key() {
        let k = ArticleKey::new("勞基法", "第二十二條").unwrap().normalized();
        assert_eq!(k.to_string(), "勞動基準法#22");
        assert_eq!(k.graph_id(), "勞動基準法第22條");
    }

    #[test]
    fn provenance_wire_names() {
        let v = serde_json::to_value(Provenance::EnforcedWhitelist).unwrap();
        assert_eq!(v, "ENFORCED_WHITELIST");
        assert_eq!(Provenance::GraphEnforced.to_string(), "GRAPH_ENFORCED");
    }
}

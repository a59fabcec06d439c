//! Read-only reference table of canonical statute text for citation checks.
//!
//! Built offline alongside the corpus. Each article carries the SHA-256 of its
//! whitespace-normalised text so cited passages can be compared byte-for-byte
//! without shipping the comparison logic to the builder.

use std::collections::BTreeMap;
use std::path::Path;

use lexcite_core::{canonical_law_name, normalize_article};
use ring::digest;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub full_title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub key_phrases: Vec<String>,
    #[serde(default)]
    pub related_articles: Vec<String>,
}

impl ArticleRecord {
    /// A record whose checksum is derived from `text`.
    pub fn new(heading: impl Into<String>, text: impl Into<String>, key_phrases: Vec<String>) -> Self {
        let text = text.into();
        Self {
            heading: heading.into(),
            full_title: String::new(),
            checksum: checksum(&text),
            text,
            key_phrases,
            related_articles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LawRecord {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub articles: BTreeMap<String, ArticleRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDatabase {
    #[serde(rename = "validated_articles")]
    laws: BTreeMap<String, LawRecord>,
}

impl ValidationDatabase {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let db: ValidationDatabase = serde_json::from_slice(&std::fs::read(path)?)?;
        info!(
            laws = db.laws.len(),
            articles = db.article_count(),
            path = %path.display(),
            "loaded validation database"
        );
        Ok(db)
    }

    pub fn from_laws(laws: BTreeMap<String, LawRecord>) -> Self {
        Self { laws }
    }

    pub fn article_count(&self) -> usize {
        self.laws.values().map(|l| l.articles.len()).sum()
    }

    /// The record for a law, matching its exact name or canonical title.
    pub fn law(&self, law: &str) -> Option<&LawRecord> {
        self.laws
            .get(law.trim())
            .or_else(|| self.laws.get(&canonical_law_name(law)))
    }

    pub fn has_law(&self, law: &str) -> bool {
        self.law(law).is_some()
    }

    /// Resolve an article under a law.
    ///
    /// Tries the normalised number first, then the first sub-article of it, so
    /// "22" resolves to "22-1" when only sub-articles are recorded. Returns the
    /// stored article number alongside the record.
    pub fn lookup(&self, law: &str, article: &str) -> Option<(&str, &ArticleRecord)> {
        let record = self.law(law)?;
        let norm = normalize_article(article);
        if let Some((k, v)) = record.articles.get_key_value(&norm) {
            return Some((k.as_str(), v));
        }
        let prefix = format!("{norm}-");
        record
            .articles
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .min_by_key(|(k, _)| lexcite_core::article_sort_key(k))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn laws(&self) -> impl Iterator<Item = (&str, &LawRecord)> {
        self.laws.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Trim, then collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of the whitespace-normalised text.
pub fn checksum(text: &str) -> String {
    let d = digest::digest(&digest::SHA256, normalize_whitespace(text).as_bytes());
    hex::encode(d.as_ref())
}

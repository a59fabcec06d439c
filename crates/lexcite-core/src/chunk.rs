//! The indexed unit of statute text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::citation::ArticleKey;

/// One addressable article of law text, as built by the offline indexer.
///
/// Immutable once loaded; the corpus hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteChunk {
    pub id: String,
    #[serde(flatten)]
    pub key: ArticleKey,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub text: String,
    /// Law title or source file name, when the indexer recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Term frequencies over the lexical tokenizer's vocabulary.
    #[serde(default)]
    pub tf: BTreeMap<String, u32>,
}

impl StatuteChunk {
    pub fn law(&self) -> &str {
        self.key.law()
    }

    pub fn article(&self) -> &str {
        self.key.article()
    }

    /// True if `needle` appears in the law name or the recorded title.
    pub fn law_matches(&self, needle: &str) -> bool {
        !needle.is_empty()
            && (self.law().contains(needle)
                || self.title.as_deref().is_some_and(|t| t.contains(needle)))
    }
}

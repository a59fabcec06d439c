//! Topic guide table: keyword routing from a query to preferred laws,
//! blocked laws, and priority articles.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use lexcite_core::{ArticleKey, RetrievalCandidate, normalize_article, normalize_law_key};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::EngineError;
use crate::config::load_toml;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Definition,
    Procedure,
    Right,
    Penalty,
    #[default]
    General,
}

impl Category {
    pub fn weight(self) -> f64 {
        match self {
            Category::Definition => 1.5,
            Category::Right => 1.3,
            Category::Procedure => 1.2,
            Category::Penalty | Category::General => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Definition => "definition",
            Category::Procedure => "procedure",
            Category::Right => "right",
            Category::Penalty => "penalty",
            Category::General => "general",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEntry {
    pub law: String,
    /// Empty means every article of the law.
    #[serde(default)]
    pub articles: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default)]
    pub category: Category,
}

fn default_priority() -> f64 {
    1.0
}

impl CoreEntry {
    fn covers(&self, law: &str, article: &str) -> bool {
        if self.law.is_empty() || !law.contains(self.law.as_str()) {
            return false;
        }
        self.articles.is_empty() || {
            let norm = normalize_article(article);
            self.articles.iter().any(|a| a == article || normalize_article(a) == norm)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicGuide {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    /// Overrides the category derived from the core entries.
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub core_articles: Vec<CoreEntry>,
    #[serde(default)]
    pub blocked_laws: Vec<String>,
    /// Candidates mentioning none of these are down-weighted during fusion.
    #[serde(default)]
    pub required_phrases: Vec<String>,
}

impl TopicGuide {
    pub fn max_priority(&self) -> f64 {
        self.core_articles
            .iter()
            .map(|e| e.priority)
            .fold(None, |m: Option<f64>, p| Some(m.map_or(p, |m| m.max(p))))
            .unwrap_or(1.0)
    }

    /// Explicit category, else that of the highest-priority core entry.
    pub fn category(&self) -> Category {
        if let Some(c) = self.category {
            return c;
        }
        let mut best: Option<&CoreEntry> = None;
        for e in &self.core_articles {
            if best.is_none_or(|b| e.priority > b.priority) {
                best = Some(e);
            }
        }
        best.map(|e| e.category).unwrap_or_default()
    }

    fn keyword_hits(&self, query_lower: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty() && query_lower.contains(&k.to_lowercase()))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicMatch {
    pub topic_id: String,
    pub name: String,
    pub score: f64,
    pub hits: usize,
    pub category: Category,
}

/// Result of comparing a citation set against the topics a query matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicAdvisory {
    /// The best topic's core articles are all absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<String>,
    /// Definition articles the best (definition-type) topic expects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_definition: Option<String>,
}

impl TopicAdvisory {
    pub fn is_empty(&self) -> bool {
        self.mismatch.is_none() && self.missing_definition.is_none()
    }

    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(m) = &self.mismatch {
            out.push(m.clone());
        }
        if let Some(d) = &self.missing_definition {
            out.push(format!("查詢涉及定義性問題，建議補充：{d}"));
        }
        out
    }
}

#[derive(Deserialize)]
struct GuideFile {
    #[serde(default)]
    version: String,
    topics: Vec<TopicGuide>,
}

/// Ordered, read-only table of topic guides.
pub struct TopicTable {
    version: String,
    topics: Vec<TopicGuide>,
}

impl TopicTable {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let file: GuideFile = load_toml(path)?;
        let table = Self::from_guides(file.version, file.topics).map_err(|message| {
            EngineError::InvalidConfig {
                path: path.to_path_buf(),
                message,
            }
        })?;
        info!(
            topics = table.topics.len(),
            version = %table.version,
            path = %path.display(),
            "loaded topic guides"
        );
        Ok(table)
    }

    pub fn from_guides(version: String, topics: Vec<TopicGuide>) -> Result<Self, String> {
        let mut ids = HashSet::new();
        for t in &topics {
            if t.id.trim().is_empty() {
                return Err("topic with empty id".into());
            }
            if !ids.insert(t.id.as_str()) {
                return Err(format!("duplicate topic id {:?}", t.id));
            }
        }
        Ok(Self { version, topics })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn guide(&self, topic: &str) -> Option<&TopicGuide> {
        self.topics.iter().find(|t| t.id == topic)
    }

    pub fn guides(&self) -> &[TopicGuide] {
        &self.topics
    }

    /// Score every topic against the query and return the best `max`.
    ///
    /// `score = hits × max core priority × category weight`. Ties keep table order.
    pub fn match_topics(&self, query: &str, max: usize) -> Vec<TopicMatch> {
        let q = query.to_lowercase();
        let mut matches: Vec<TopicMatch> = self
            .topics
            .iter()
            .filter_map(|t| {
                let hits = t.keyword_hits(&q);
                if hits == 0 {
                    return None;
                }
                let category = t.category();
                Some(TopicMatch {
                    topic_id: t.id.clone(),
                    name: t.name.clone(),
                    score: hits as f64 * t.max_priority() * category.weight(),
                    hits,
                    category,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(max);
        matches
    }

    /// The single best topic for a query.
    pub fn resolve(&self, query: &str) -> Option<TopicMatch> {
        self.match_topics(query, 1).into_iter().next()
    }

    /// Laws named by the topic's core entries, in entry order.
    pub fn preferred_laws(&self, topic: &str) -> Vec<String> {
        let Some(g) = self.guide(topic) else {
            return vec![];
        };
        let mut out: Vec<String> = Vec::new();
        for e in &g.core_articles {
            if !e.law.is_empty() && !out.contains(&e.law) {
                out.push(e.law.clone());
            }
        }
        out
    }

    pub fn blocked_laws(&self, topic: &str) -> Vec<String> {
        self.guide(topic)
            .map(|g| g.blocked_laws.clone())
            .unwrap_or_default()
    }

    /// Every article number named by the topic's core entries.
    pub fn prior_articles(&self, topic: &str) -> Vec<String> {
        let Some(g) = self.guide(topic) else {
            return vec![];
        };
        let mut out: Vec<String> = Vec::new();
        for a in g.core_articles.iter().flat_map(|e| &e.articles) {
            if !out.contains(a) {
                out.push(a.clone());
            }
        }
        out
    }

    pub fn required_phrases(&self, topic: &str) -> Vec<String> {
        self.guide(topic)
            .map(|g| g.required_phrases.clone())
            .unwrap_or_default()
    }

    /// Prior articles of every matched topic, best topic first.
    pub fn merged_prior_articles(&self, query: &str, max_topics: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in self.match_topics(query, max_topics) {
            for a in self.prior_articles(&m.topic_id) {
                if !out.contains(&a) {
                    out.push(a);
                }
            }
        }
        out
    }

    /// Multiply each candidate covered by a core entry of `topic` by that
    /// entry's priority, then re-sort descending.
    ///
    /// Candidates already boosted for `topic` are left alone, so applying the
    /// boost twice yields the same scores and order as applying it once.
    pub fn boost_results(&self, items: &mut [RetrievalCandidate], topic: &str) {
        let Some(g) = self.guide(topic) else {
            return;
        };
        if g.core_articles.is_empty() {
            return;
        }
        for c in items.iter_mut() {
            if c.boosted_for.as_deref() == Some(topic) {
                continue;
            }
            if let Some(e) = g.core_articles.iter().find(|e| e.covers(c.law(), c.article())) {
                c.score *= e.priority;
            }
            c.boosted_for = Some(topic.to_string());
        }
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    /// Compare cited articles against the core articles of the matched topics.
    pub fn consistency(&self, query: &str, cited: &[ArticleKey]) -> TopicAdvisory {
        let matched = self.match_topics(query, 3);
        let Some(best) = matched.first() else {
            return TopicAdvisory::default();
        };
        let cited: HashSet<(String, String)> = cited.iter().map(slot).collect();

        let mut advisory = TopicAdvisory::default();
        let best_articles = self.core_slots(&best.topic_id);
        if !best_articles.is_empty() && best_articles.is_disjoint(&cited) {
            advisory.mismatch = Some(format!(
                "查詢主題為「{}」，但引用條文未包含相關核心條文",
                best.name
            ));
        }

        if best.category == Category::Definition {
            let missing: Vec<String> = matched
                .iter()
                .filter(|m| m.category == Category::Definition)
                .filter_map(|m| self.guide(&m.topic_id))
                .flat_map(|g| &g.core_articles)
                .flat_map(|e| e.articles.iter().map(move |a| (e.law.as_str(), a.as_str())))
                .filter(|(law, a)| !cited.contains(&(normalize_law_key(law), a.trim().to_string())))
                .map(|(law, a)| format!("{law}第{a}條"))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .take(2)
                .collect();
            if !missing.is_empty() {
                advisory.missing_definition = Some(missing.join("、"));
            }
        }
        advisory
    }

    fn core_slots(&self, topic: &str) -> HashSet<(String, String)> {
        self.guide(topic)
            .map(|g| {
                g.core_articles
                    .iter()
                    .flat_map(|e| {
                        e.articles
                            .iter()
                            .map(|a| (normalize_law_key(&e.law), a.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn slot(k: &ArticleKey) -> (String, String) {
    (normalize_law_key(k.law()), k.article().trim().to_string())
}

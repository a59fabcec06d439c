//! Structured query plans produced by an external planner.
//!
//! The engine never generates a plan; it only consumes one, harmonises it
//! against the canonical-issue table, and fans it out into retrieval paths.

use serde::{Deserialize, Serialize};

use crate::citation::ArticleKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubIssue {
    pub issue: String,
    #[serde(default)]
    pub importance: Importance,
    /// References like `勞動基準法第16條`.
    #[serde(default)]
    pub suggested_articles: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub main_issue: String,
    #[serde(default)]
    pub sub_issues: Vec<SubIssue>,
    #[serde(default)]
    pub required_laws: Vec<String>,
    #[serde(default)]
    pub suggested_keywords: Vec<String>,
    #[serde(default = "default_difficulty", alias = "difficulty")]
    pub estimated_difficulty: String,
    #[serde(default)]
    pub reasoning: String,
}

fn default_difficulty() -> String {
    "medium".into()
}

impl QueryPlan {
    /// Minimal plan used when no planner output is available.
    pub fn fallback(query: &str, default_law: &str) -> Self {
        QueryPlan {
            main_issue: "勞動法律諮詢".into(),
            sub_issues: vec![SubIssue {
                issue: "法律規定查詢".into(),
                importance: Importance::High,
                suggested_articles: vec![],
                keywords: vec![query.chars().take(20).collect()],
            }],
            required_laws: vec![default_law.to_string()],
            suggested_keywords: vec![query.chars().take(30).collect()],
            estimated_difficulty: default_difficulty(),
            reasoning: String::new(),
        }
    }

    /// Every parseable suggested article across all sub-issues, in plan order.
    pub fn suggested_keys(&self) -> Vec<ArticleKey> {
        let mut keys: Vec<ArticleKey> = Vec::new();
        for issue in &self.sub_issues {
            for s in &issue.suggested_articles {
                match ArticleKey::parse_reference(s) {
                    Ok(k) if !keys.contains(&k) => keys.push(k),
                    _ => {}
                }
            }
        }
        keys
    }

    /// Ensure some sub-issue suggests `key`, adding a high-importance one if not.
    pub fn ensure_suggestion(&mut self, key: &ArticleKey) {
        let target = key.graph_id();
        if self
            .sub_issues
            .iter()
            .any(|si| si.suggested_articles.contains(&target))
        {
            return;
        }
        self.sub_issues.push(SubIssue {
            issue: format!("{target}補強"),
            importance: Importance::High,
            suggested_articles: vec![target],
            keywords: vec![key.law().to_string(), key.article().to_string()],
        });
    }
}

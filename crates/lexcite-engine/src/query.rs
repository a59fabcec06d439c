//! Query-side preprocessing: colloquial rewrites and plan harmonisation.

use lexcite_core::{ArticleKey, QueryPlan};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::{CanonicalIssue, RewriteRule};

/// Ordered, case-insensitive rewrite rules for colloquial terms.
pub struct QueryRewriter {
    rules: Vec<(Regex, String)>,
}

impl QueryRewriter {
    pub fn new(rules: &[RewriteRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|r| {
                RegexBuilder::new(&r.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, r.replacement.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Apply every rule in order to the trimmed query.
    pub fn rewrite(&self, query: &str) -> String {
        let mut s = query.trim().to_string();
        for (re, rep) in &self.rules {
            s = re.replace_all(&s, rep.as_str()).into_owned();
        }
        s
    }
}

/// Outcome of matching a plan against the canonical-issue table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Harmonized {
    pub label: Option<String>,
    pub forced_articles: Vec<ArticleKey>,
}

/// Rename the plan's main issue to its canonical label and fill in the laws
/// and suggested articles that label requires.
///
/// An issue whose keywords all appear in the user's query beats one whose
/// keywords only appear in the plan's own wording. Ties keep table order.
pub fn harmonize_plan(plan: &mut QueryPlan, query: &str, issues: &[CanonicalIssue]) -> Harmonized {
    let user_text = query.to_lowercase();
    let plan_text = {
        let mut parts = vec![plan.main_issue.clone()];
        parts.extend(plan.sub_issues.iter().map(|s| s.issue.clone()));
        parts.push(query.to_string());
        parts.join(" ").to_lowercase()
    };

    let contains_all = |text: &str, keywords: &[String]| {
        keywords.iter().all(|k| text.contains(&k.to_lowercase()))
    };

    let mut best: Option<(u8, &CanonicalIssue)> = None;
    for issue in issues {
        let score = if contains_all(&user_text, &issue.keywords) {
            2
        } else if contains_all(&plan_text, &issue.keywords) {
            1
        } else {
            continue;
        };
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, issue));
        }
    }

    let Some((_, issue)) = best else {
        return Harmonized::default();
    };

    debug!(label = %issue.label, previous = %plan.main_issue, "harmonized query plan");
    plan.main_issue = issue.label.clone();
    for law in &issue.required_laws {
        if !plan.required_laws.contains(law) {
            plan.required_laws.push(law.clone());
        }
    }
    for key in &issue.forced_articles {
        plan.ensure_suggestion(key);
    }
    if issue.force_complex {
        plan.estimated_difficulty = "complex".into();
    }
    Harmonized {
        label: Some(issue.label.clone()),
        forced_articles: issue.forced_articles.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleBook;
    use crate::testutil::data_dir;
    use lexcite_core::{Importance, SubIssue};

    fn rules() -> RuleBook {
        RuleBook::load(&data_dir().join("rules.toml")).unwrap()
    }

    #[test]
    fn rewrites_colloquial_terms() {
        let rw = QueryRewriter::new(&rules().rewrites).unwrap();
        assert_eq!(rw.rewrite("  OT計算方式"), "加班費 延長工時 計算方式");
        assert_eq!(rw.rewrite("ot 薪資怎麼給"), "加班費 工資怎麼給");
        assert_eq!(rw.rewrite("公司 OT 太多"), "公司 加班 延長工時 太多");
        assert_eq!(rw.rewrite("薪資 扣款合法嗎"), "工資 扣除合法嗎");
        assert_eq!(rw.rewrite("特休計算"), "特別休假 計算");
        assert_eq!(rw.rewrite("產假幾天"), "產假幾天");
    }

    #[test]
    fn user_text_match_beats_plan_match() {
        let book = rules();
        let mut plan = QueryPlan::fallback("公司資遣我要預告嗎", "勞動基準法");
        plan.main_issue = "資遣流程".into();
        let h = harmonize_plan(&mut plan, "公司資遣我要預告嗎", &book.canonical_issues);
        // "資遣"+"流程" only via the plan text; "資遣"+"預告" via the user's words.
        assert_eq!(h.label.as_deref(), Some("資遣費計算與預告期工資"));
        assert_eq!(plan.main_issue, "資遣費計算與預告期工資");
        let suggested: Vec<String> = plan.suggested_keys().iter().map(|k| k.to_string()).collect();
        assert!(suggested.contains(&"勞動基準法#16".to_string()));
        assert!(suggested.contains(&"勞動基準法#17".to_string()));
    }

    #[test]
    fn force_complex_and_required_laws() {
        let book = rules();
        let mut plan = QueryPlan {
            main_issue: "懷孕被調職".into(),
            sub_issues: vec![SubIssue {
                issue: "調職合法性".into(),
                importance: Importance::High,
                suggested_articles: vec!["勞動基準法第10-1條".into()],
                keywords: vec!["調職".into()],
            }],
            required_laws: vec!["勞動基準法".into()],
            suggested_keywords: vec![],
            estimated_difficulty: "medium".into(),
            reasoning: String::new(),
        };
        let h = harmonize_plan(&mut plan, "懷孕後被主管歧視並調職", &book.canonical_issues);
        assert_eq!(h.forced_articles.len(), 3);
        assert_eq!(plan.estimated_difficulty, "complex");
        assert_eq!(plan.required_laws, vec!["勞動基準法", "性別平等工作法"]);
        assert_eq!(plan.sub_issues.len(), 4);
        assert_eq!(plan.sub_issues[1].issue, "性別平等工作法第11條補強");
    }

    #[test]
    fn no_canonical_issue_leaves_plan_untouched() {
        let book = rules();
        let mut plan = QueryPlan::fallback("產假幾天", "勞動基準法");
        let before = plan.clone();
        let h = harmonize_plan(&mut plan, "產假幾天", &book.canonical_issues);
        assert_eq!(h, Harmonized::default());
        assert_eq!(plan, before);
    }
}

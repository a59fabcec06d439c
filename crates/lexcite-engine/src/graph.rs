//! Statute knowledge graph: article entities, typed relations, and
//! predefined scenarios with their required articles.
//!
//! Articles are identified as `{law}第{article}條`, the same form
//! [`ArticleKey::graph_id`] produces.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use lexcite_core::{ArticleKey, Provenance, RetrievalCandidate};
use lexcite_store::is_cjk;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    pub law: String,
    pub article: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelation {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Match triggers. When empty, tokens derived from `name` are used.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub required_articles: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub common_errors: Vec<String>,
}

impl Scenario {
    fn triggers(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            name_tokens(&self.name)
        } else {
            self.keywords.clone()
        }
    }

    fn matches(&self, query: &str) -> bool {
        self.triggers()
            .iter()
            .any(|t| !t.is_empty() && query.contains(t.as_str()))
    }
}

/// CJK bigrams of a scenario name plus its ASCII words.
fn name_tokens(name: &str) -> Vec<String> {
    let cjk: Vec<char> = name.chars().filter(|c| is_cjk(*c)).collect();
    let mut out: Vec<String> = cjk.windows(2).map(|w| w.iter().collect()).collect();
    if cjk.len() == 1 {
        out.push(cjk[0].to_string());
    }
    out.extend(
        name.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() >= 2)
            .map(str::to_string),
    );
    out
}

#[derive(Deserialize)]
struct GraphFile {
    #[serde(default)]
    entities: HashMap<String, GraphEntity>,
    #[serde(default)]
    relations: Vec<GraphRelation>,
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// Read-only article graph. Edges point from the referring article.
pub struct KnowledgeGraph {
    graph: DiGraph<String, GraphRelation>,
    nodes: HashMap<String, NodeIndex>,
    entities: HashMap<String, GraphEntity>,
    /// Sorted ids, for deterministic keyword search.
    order: Vec<String>,
    scenarios: Vec<Scenario>,
}

impl KnowledgeGraph {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::MissingConfig(path.to_path_buf()));
        }
        let file: GraphFile =
            serde_json::from_slice(&std::fs::read(path)?).map_err(|e| EngineError::InvalidConfig {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let kg = Self::new(file.entities, file.relations, file.scenarios);
        info!(
            entities = kg.entities.len(),
            relations = kg.graph.edge_count(),
            scenarios = kg.scenarios.len(),
            path = %path.display(),
            "loaded knowledge graph"
        );
        Ok(kg)
    }

    /// Build from parts. Relations touching unknown entities are dropped.
    pub fn new(
        entities: HashMap<String, GraphEntity>,
        relations: Vec<GraphRelation>,
        scenarios: Vec<Scenario>,
    ) -> Self {
        let mut order: Vec<String> = entities.keys().cloned().collect();
        order.sort();

        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for id in &order {
            nodes.insert(id.clone(), graph.add_node(id.clone()));
        }

        let mut dropped = 0usize;
        for rel in relations {
            match (nodes.get(&rel.from), nodes.get(&rel.to)) {
                (Some(&a), Some(&b)) if a != b => {
                    graph.add_edge(a, b, rel);
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(dropped, "ignored relations with unknown endpoints");
        }

        Self {
            graph,
            nodes,
            entities,
            order,
            scenarios,
        }
    }

    pub fn entity(&self, id: &str) -> Option<&GraphEntity> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Breadth-first walk from `id` up to `max_depth` hops.
    ///
    /// Returns `(id, depth, entity)` in visit order, excluding the origin. With
    /// `relation_types`, only edges of those kinds are followed.
    pub fn related_articles(
        &self,
        id: &str,
        max_depth: usize,
        relation_types: Option<&[&str]>,
    ) -> Vec<(String, usize, &GraphEntity)> {
        let Some(&start) = self.nodes.get(id) else {
            return vec![];
        };

        let mut out = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            // petgraph yields newest edges first; walk in insertion order.
            let mut edges: Vec<_> = self.graph.edges_directed(node, Direction::Outgoing).collect();
            edges.reverse();
            for edge in edges {
                let allowed = relation_types.is_none_or(|types| types.contains(&edge.weight().kind.as_str()));
                let next = edge.target();
                if !allowed || !visited.insert(next) {
                    continue;
                }
                let next_id = &self.graph[next];
                if let Some(entity) = self.entities.get(next_id) {
                    out.push((next_id.clone(), depth + 1, entity));
                }
                queue.push_back((next, depth + 1));
            }
        }
        out
    }

    /// First scenario, in file order, with a trigger contained in the query.
    pub fn match_scenario(&self, query: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.matches(query))
    }

    pub fn required_articles(&self, query: &str) -> Vec<String> {
        self.match_scenario(query)
            .map(|s| s.required_articles.clone())
            .unwrap_or_default()
    }

    pub fn scenario_reasoning(&self, query: &str) -> Option<&str> {
        self.match_scenario(query).map(|s| s.reasoning.as_str())
    }

    pub fn common_errors(&self, query: &str) -> Vec<String> {
        self.match_scenario(query)
            .map(|s| s.common_errors.clone())
            .unwrap_or_default()
    }

    /// Entities whose title, keywords, or topics contain `keyword`.
    pub fn search_by_keyword(&self, keyword: &str, limit: usize) -> Vec<(&str, &GraphEntity)> {
        if keyword.is_empty() {
            return vec![];
        }
        self.order
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.as_str(), e)))
            .filter(|(_, e)| {
                e.title.contains(keyword)
                    || e.keywords.iter().any(|k| k.contains(keyword))
                    || e.topics.iter().any(|t| t.contains(keyword))
            })
            .take(limit)
            .collect()
    }

    /// Append every scenario-required article missing from `citations`.
    ///
    /// Appended candidates carry the entity title as heading, no text, and
    /// [`Provenance::GraphEnforced`]; callers fill text from the validation
    /// database.
    pub fn enhance_citations(
        &self,
        citations: &[RetrievalCandidate],
        query: &str,
    ) -> Vec<RetrievalCandidate> {
        let mut enhanced = citations.to_vec();
        let Some(scenario) = self.match_scenario(query) else {
            return enhanced;
        };

        let mut cited: HashSet<String> = citations
            .iter()
            .map(|c| c.key.normalized().graph_id())
            .collect();
        for req in &scenario.required_articles {
            let Some(entity) = self.entities.get(req) else {
                debug!(article = %req, scenario = %scenario.id, "required article not in graph");
                continue;
            };
            let key = match ArticleKey::new(entity.law.clone(), entity.article.clone()) {
                Ok(k) => k,
                Err(e) => {
                    warn!(article = %req, error = %e, "skipping malformed graph entity");
                    continue;
                }
            };
            if !cited.insert(key.normalized().graph_id()) {
                continue;
            }
            enhanced.push(RetrievalCandidate {
                key,
                chunk_id: None,
                heading: entity.title.clone(),
                chapter: String::new(),
                text: String::new(),
                score: 0.0,
                provenance: Provenance::GraphEnforced,
                boosted_for: None,
            });
        }
        if enhanced.len() > citations.len() {
            info!(
                scenario = %scenario.id,
                added = enhanced.len() - citations.len(),
                "graph enforced scenario articles"
            );
        }
        enhanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{candidate, data_dir};

    fn kg() -> KnowledgeGraph {
        KnowledgeGraph::load(&data_dir().join("knowledge_graph.json")).unwrap()
    }

    fn entity(law: &str, article: &str) -> GraphEntity {
        GraphEntity {
            law: law.into(),
            article: article.into(),
            title: String::new(),
            keywords: vec![],
            topics: vec![],
        }
    }

    fn rel(from: &str, to: &str, kind: &str) -> GraphRelation {
        GraphRelation {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            description: String::new(),
        }
    }

    fn chain() -> KnowledgeGraph {
        let entities = HashMap::from([
            ("A".to_string(), entity("L", "1")),
            ("B".to_string(), entity("L", "2")),
            ("C".to_string(), entity("L", "3")),
            ("D".to_string(), entity("L", "4")),
        ]);
        KnowledgeGraph::new(
            entities,
            vec![
                rel("A", "B", "參照"),
                rel("B", "C", "補充說明"),
                rel("C", "D", "參照"),
                rel("C", "A", "參照"),
                rel("A", "X", "參照"),
            ],
            vec![],
        )
    }

    #[test]
    fn bfs_respects_depth_and_excludes_origin() {
        let g = chain();
        assert_eq!(g.relation_count(), 4);
        let ids = |v: Vec<(String, usize, &GraphEntity)>| -> Vec<(String, usize)> {
            v.into_iter().map(|(id, d, _)| (id, d)).collect()
        };
        assert_eq!(ids(g.related_articles("A", 1, None)), vec![("B".into(), 1)]);
        assert_eq!(
            ids(g.related_articles("A", 3, None)),
            vec![("B".into(), 1), ("C".into(), 2), ("D".into(), 3)]
        );
        assert!(g.related_articles("A", 0, None).is_empty());
        assert!(g.related_articles("nope", 2, None).is_empty());
    }

    #[test]
    fn bfs_relation_filter() {
        let g = chain();
        let hits = g.related_articles("A", 3, Some(&["參照"]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "B");
    }

    #[test]
    fn shipped_graph_expert_relations() {
        let g = kg();
        let related = g.related_articles("勞動基準法第22條", 1, Some(&["補充說明"]));
        assert!(related.iter().any(|(id, _, _)| id == "勞動基準法第26條"));
    }

    #[test]
    fn scenario_first_match_wins() {
        let g = kg();
        let s = g.match_scenario("員工曠職三天，薪水怎麼算？").unwrap();
        assert_eq!(s.id, "wage_deduction");
        assert!(g.required_articles("員工曠職三天").contains(&"勞動基準法第22條".to_string()));
        assert!(g.scenario_reasoning("曠職").unwrap().contains("第22"));
        assert!(!g.common_errors("曠職").is_empty());
        assert!(g.match_scenario("今天天氣如何").is_none());
        assert!(g.required_articles("今天天氣如何").is_empty());
    }

    #[test]
    fn name_tokens_fallback() {
        assert_eq!(name_tokens("遲到扣款"), vec!["遲到", "到扣", "扣款"]);
        let s = Scenario {
            id: "t".into(),
            name: "遲到扣款".into(),
            description: String::new(),
            keywords: vec![],
            required_articles: vec![],
            reasoning: String::new(),
            common_errors: vec![],
        };
        assert!(s.matches("上班遲到會被扣錢嗎"));
        assert!(!s.matches("上班晚到"));
    }

    #[test]
    fn enhance_appends_missing_required() {
        let g = kg();
        let cited = vec![candidate("勞動基準法", "22", 0.9)];
        let out = g.enhance_citations(&cited, "員工曠職三天，薪水怎麼算？");
        let keys: Vec<String> = out.iter().map(|c| c.key.to_string()).collect();
        assert_eq!(keys, vec!["勞動基準法#22", "勞動基準法#26", "勞動基準法#12"]);
        assert!(out[1..].iter().all(|c| c.provenance == Provenance::GraphEnforced));
        assert_eq!(out[0].provenance, Provenance::Hybrid);
    }

    #[test]
    fn enhance_without_scenario_is_identity() {
        let g = kg();
        let cited = vec![candidate("勞動基準法", "22", 0.9)];
        assert_eq!(g.enhance_citations(&cited, "今天天氣如何"), cited);
    }

    #[test]
    fn keyword_search_is_sorted_and_capped() {
        let g = kg();
        let hits = g.search_by_keyword("工資", 2);
        assert!(hits.len() <= 2);
        assert!(!hits.is_empty());
        assert!(g.search_by_keyword("", 5).is_empty());
    }
}

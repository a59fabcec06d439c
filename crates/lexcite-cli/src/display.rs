//! Terminal rendering for candidates, validation reports, and engine info.
//!
//! Cards are grouped into sections with left-aligned labels, the same layout
//! for every record type.

use lexcite_core::RetrievalCandidate;
use lexcite_engine::{Cited, EngineInfo, GraphEntity, Rejection, TopicMatch, ValidationReport};

const LABEL_WIDTH: usize = 22;
const SNIPPET_CHARS: usize = 80;

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<LABEL_WIDTH$} {value}");
}

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        s.push('…');
    }
    s
}

pub fn print_info(info: &EngineInfo) {
    println!("=== lexcite v{} ===", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Corpus");
    field("chunks", info.chunks);
    field("embeddings", info.embeddings);
    println!("Routing");
    field("topics", format!("{} (v{})", info.topics, info.topic_version));
    field("graph entities", info.graph_entities);
    field("scenarios", info.scenarios);
    println!("Validation");
    field("laws", info.laws);
    field("articles", info.validated_articles);
    println!("Collaborators");
    field("semantic search", if info.semantic { "on" } else { "off" });
    field("rerank", if info.rerank { "on" } else { "off" });
}

pub fn print_candidates(items: &[RetrievalCandidate]) {
    if items.is_empty() {
        println!("(no results)");
        return;
    }
    for (rank, c) in items.iter().enumerate() {
        println!("{:>2}. {}  [{}]  {:.4}", rank + 1, c.key, c.provenance, c.score);
        if !c.heading.is_empty() {
            println!("    {}", c.heading);
        }
        if !c.text.is_empty() {
            println!("    {}", snippet(&c.text));
        }
    }
}

pub fn print_report(report: &ValidationReport) {
    println!("Validation");
    field("status", format!("{:?}", report.status()).to_uppercase());
    field("action", format!("{:?}", report.action()).to_uppercase());
    if let Some(topic) = report.topic() {
        field("topic", topic);
    }
    field("checked at", report.created_at().format("%Y-%m-%d %H:%M:%S UTC"));
    for check in report.checks() {
        field(&format!("{} ({:?})", check.citation, check.check).to_lowercase(), &check.message);
    }
    print_list("Errors", report.errors());
    print_list("Warnings", report.warnings());
}

pub fn print_cited(cited: &Cited) {
    if let Some(topic) = &cited.topic {
        println!("Topic: {topic}");
        println!();
    }
    print_candidates(&cited.candidates);
    println!();
    if !cited.insertions.is_empty() {
        println!("Whitelist insertions");
        for ins in &cited.insertions {
            field(&ins.key.to_string(), &ins.topic);
        }
    }
    print_report(&cited.report);
    print_list("Topic advisory", &cited.advisory.messages());
    if let Some(reasoning) = &cited.reasoning {
        println!("Reasoning");
        println!("  {reasoning}");
    }
    print_list("Common errors", &cited.common_errors);
}

pub fn print_rejection(rejection: &Rejection) {
    println!("=== BLOCKED ===");
    print_list("Errors", &rejection.errors);
    println!();
    println!("{}", rejection.suggestion);
}

pub fn print_topics(matches: &[TopicMatch]) {
    if matches.is_empty() {
        println!("(no topic matched)");
        return;
    }
    for m in matches {
        println!("{}  {}", m.topic_id, m.name);
        field("score", format!("{:.2}", m.score));
        field("keyword hits", m.hits);
        field("category", m.category.as_str());
    }
}

pub fn print_related(origin: &str, related: &[(String, usize, &GraphEntity)]) {
    println!("=== {origin} ===");
    if related.is_empty() {
        println!("(no related articles)");
        return;
    }
    for (id, depth, entity) in related {
        field(&format!("{id} (depth {depth})"), &entity.title);
    }
}

fn print_list(header: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{header}");
    for item in items {
        println!("  - {item}");
    }
}

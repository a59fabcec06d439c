pub mod article;
pub mod chunk;
pub mod citation;
pub mod error;
pub mod law;
pub mod plan;
pub mod schema;

pub use article::{article_sort_key, cjk_numeral_value, normalize_article};
pub use chunk::StatuteChunk;
pub use citation::{ArticleKey, Citation, Provenance, RetrievalCandidate};
pub use error::CoreError;
pub use law::{canonical_law_name, normalize_law_key};
pub use plan::{Importance, QueryPlan, SubIssue};
pub use schema::embeddings;

//! Storage layer: statute corpus, TF-IDF and heading indexes, Parquet embedding
//! store, and the read-only citation validation database.

mod corpus;
mod error;
mod heading;
mod lexical;
mod validation_db;
mod vectors;

pub use corpus::Corpus;
pub use error::StoreError;
pub use heading::HeadingIndex;
pub use lexical::{LexicalIndex, is_cjk, tokenize};
pub use validation_db::{ArticleRecord, LawRecord, ValidationDatabase, checksum, normalize_whitespace};
pub use vectors::{VectorStore, read_parquet, write_embeddings};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("citation has an empty law name")]
    EmptyLaw,

    #[error("citation for {law} has an empty article number")]
    EmptyArticle { law: String },

    #[error("unparseable article reference: {0}")]
    BadArticleRef(String),
}

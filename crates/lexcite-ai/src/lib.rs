//! Inference collaborators: query encoders for the semantic index and
//! cross-encoders for reranking. Local ONNX Runtime or remote HTTP.

mod encoder;
mod error;
mod rerank;

pub use encoder::{QueryEncoder, format_query_for_model};
pub use error::{AiError, with_timeout};
pub use rerank::CrossEncoder;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEncoder;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{HttpCrossEncoder, HttpEncoder};

//! ONNX Runtime query encoder for sentence-embedding models.
//!
//! Mean-pooled, L2-normalised embeddings from a local model directory
//! containing `model.onnx` and `tokenizer.json` (e.g. bge-base-zh-v1.5).

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::{AiError, QueryEncoder};

/// Statute queries are short; 512 covers the longest article headings.
const MAX_TOKENS: usize = 512;

struct Model {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
    wants_token_types: bool,
}

/// Local sentence encoder. Inference runs on the blocking pool.
pub struct OnnxEncoder {
    model: Arc<Mutex<Model>>,
    name: String,
    dim: usize,
}

impl OnnxEncoder {
    /// Load from a directory containing `model.onnx` and `tokenizer.json`.
    ///
    /// `name` is the model identifier used for query prefixing.
    pub fn load(model_dir: &Path, name: impl Into<String>) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(768);
        let wants_token_types = session
            .inputs()
            .iter()
            .any(|i| i.name() == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        let name = name.into();
        info!(dim, model = %name, path = %model_path.display(), "loaded query encoder");
        Ok(Self {
            model: Arc::new(Mutex::new(Model {
                session,
                tokenizer,
                dim,
                wants_token_types,
            })),
            name,
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

#[async_trait]
impl QueryEncoder for OnnxEncoder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| AiError::Model(format!("encoder mutex poisoned: {e}")))?;
            model.embed(&text).map_err(|e| AiError::Model(e.to_string()))
        })
        .await
        .map_err(|e| AiError::Model(format!("encoder task failed: {e}")))?
    }
}

impl Model {
    fn embed(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let seq_len = encoding.get_ids().len();
        let shape = [1i64, seq_len as i64];

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();

        let ids_tensor = Tensor::from_array((shape, ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, mask.clone().into_boxed_slice()))?;

        let outputs = if self.wants_token_types {
            let types: Vec<i64> = encoding.get_type_ids().iter().map(|&x| x as i64).collect();
            let type_tensor = Tensor::from_array((shape, types.into_boxed_slice()))?;
            self.session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])?
        } else {
            self.session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])?
        };

        // Token embeddings: [1, seq_len, dim].
        let (output_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [1, {seq_len}, {}]",
            self.dim
        );
        let actual_seq_len = dims[1] as usize;

        // Mean pooling with attention mask.
        let mut pooled = vec![0.0f32; self.dim];
        let mut count = 0.0f32;
        for (j, &m) in mask.iter().enumerate().take(actual_seq_len) {
            if m > 0 {
                let offset = j * self.dim;
                for (d, p) in pooled.iter_mut().enumerate() {
                    *p += data[offset + d];
                }
                count += 1.0;
            }
        }
        if count > 0.0 {
            for p in &mut pooled {
                *p /= count;
            }
        }
        normalize(&mut pooled);
        Ok(pooled)
    }
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Last dimension of the model's first output, if static.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("bge-base-zh-v1.5")
    }

    fn require_model() -> PathBuf {
        let dir = model_dir();
        if !dir.join("model.onnx").exists() {
            panic!(
                "Model not found. Export BAAI/bge-base-zh-v1.5 to ONNX:\n  \
                 optimum-cli export onnx --model BAAI/bge-base-zh-v1.5 models/bge-base-zh-v1.5"
            );
        }
        dir
    }

    #[tokio::test]
    #[ignore = "requires local ONNX model"]
    async fn encode_unit_norm() {
        let enc = OnnxEncoder::load(&require_model(), "bge-base-zh-v1.5").unwrap();
        let v = enc.encode("雇主可以扣曠職員工的薪水嗎").await.unwrap();
        assert_eq!(v.len(), enc.dim());
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[tokio::test]
    #[ignore = "requires local ONNX model"]
    async fn related_queries_closer() {
        let enc = OnnxEncoder::load(&require_model(), "bge-base-zh-v1.5").unwrap();
        let wage = enc.encode("工資全額直接給付").await.unwrap();
        let deduction = enc.encode("雇主預扣工資").await.unwrap();
        let leave = enc.encode("產假天數").await.unwrap();
        let sim = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(sim(&wage, &deduction) > sim(&wage, &leave));
    }
}

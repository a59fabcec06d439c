//! Embedding pipeline: reads the chunk index, encodes each passage with the
//! local ONNX model, writes `(chunk_id, embedding)` rows to Parquet.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use lexcite_ai::{OnnxEncoder, QueryEncoder};
use lexcite_store::{Corpus, write_embeddings};

pub struct EmbedStats {
    pub total_rows: usize,
    pub dim: usize,
    pub elapsed_secs: f64,
}

/// Passages are embedded as heading plus body, without the query prefix.
fn passage(heading: &str, text: &str) -> String {
    if heading.is_empty() {
        text.to_string()
    } else {
        format!("{heading}\n{text}")
    }
}

pub async fn run_embed_pipeline(
    corpus_path: &Path,
    encoder: &OnnxEncoder,
    out_path: &Path,
) -> anyhow::Result<EmbedStats> {
    let start = Instant::now();

    let corpus = Corpus::load(corpus_path)
        .with_context(|| format!("reading chunk index {}", corpus_path.display()))?;
    let total = corpus.len();
    eprintln!("  Read {total} chunks from {}", corpus_path.display());

    let mut rows = Vec::with_capacity(total);
    for (i, chunk) in corpus.chunks().iter().enumerate() {
        let vector = encoder
            .encode(&passage(&chunk.heading, &chunk.text))
            .await
            .with_context(|| format!("embedding chunk {}", chunk.id))?;
        rows.push((chunk.id.clone(), vector));

        let done = i + 1;
        if done % 50 == 0 || done == total {
            eprint!("\r  Embedded {done}/{total}");
        }
    }
    eprintln!();

    write_embeddings(out_path, &rows)
        .with_context(|| format!("writing {}", out_path.display()))?;

    Ok(EmbedStats {
        total_rows: rows.len(),
        dim: encoder.dim(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passage_joins_heading_and_body() {
        assert_eq!(passage("第 16 條", "雇主依第十一條"), "第 16 條\n雇主依第十一條");
        assert_eq!(passage("", "雇主依第十一條"), "雇主依第十一條");
    }
}

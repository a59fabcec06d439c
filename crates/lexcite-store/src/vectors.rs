//! Passage-embedding store backed by a Parquet file.
//!
//! Rows are `(chunk_id, embedding)`; search is exhaustive cosine distance,
//! which is plenty for a corpus of a few thousand articles.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, FixedSizeListBuilder, Float32Array, Float32Builder, ListArray,
    StringArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use lexcite_core::embeddings::{CHUNK_ID, EMBEDDING, embedding_schema};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::info;

use crate::StoreError;

pub struct VectorStore {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl VectorStore {
    /// Load every row of an embedding Parquet file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let mut rows = Vec::new();
        for batch in read_parquet(path)? {
            rows.extend(rows_from_batch(&batch)?);
        }
        let store = Self::from_rows(rows)?;
        info!(rows = store.len(), dim = store.dim, path = %path.display(), "loaded embedding store");
        Ok(store)
    }

    /// Build from in-memory rows. Vectors are L2-normalised; all must share one dimension.
    pub fn from_rows(rows: Vec<(String, Vec<f32>)>) -> Result<Self, StoreError> {
        let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for (id, mut v) in rows {
            if v.len() != dim {
                return Err(StoreError::Other(format!(
                    "embedding for {id} has dimension {}, expected {dim}",
                    v.len()
                )));
            }
            normalize(&mut v);
            ids.push(id);
            vectors.push(v);
        }
        Ok(Self { ids, vectors, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Nearest `k` chunk ids with their cosine distance, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, StoreError> {
        if query.len() != self.dim {
            return Err(StoreError::Other(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                self.dim
            )));
        }
        let mut q = query.to_vec();
        normalize(&mut q);

        let mut dists: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (1.0 - dot(&q, v), i))
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        dists.truncate(k);
        Ok(dists
            .into_iter()
            .map(|(d, i)| (self.ids[i].clone(), d))
            .collect())
    }
}

fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
    let ids = batch
        .column_by_name(CHUNK_ID)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other(format!("missing Utf8 column {CHUNK_ID}")))?;
    let emb = batch
        .column_by_name(EMBEDDING)
        .ok_or_else(|| StoreError::Other(format!("missing column {EMBEDDING}")))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if ids.is_null(i) || emb.is_null(i) {
            continue;
        }
        let values = match emb.data_type() {
            DataType::FixedSizeList(_, _) => emb
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .map(|l| l.value(i)),
            DataType::List(_) => emb.as_any().downcast_ref::<ListArray>().map(|l| l.value(i)),
            other => {
                return Err(StoreError::Other(format!(
                    "unsupported embedding type {other:?}"
                )));
            }
        };
        let floats = values
            .as_ref()
            .and_then(|v| v.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| StoreError::Other("embedding items must be Float32".into()))?;
        rows.push((ids.value(i).to_string(), floats.values().to_vec()));
    }
    Ok(rows)
}

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

/// Write `(chunk_id, embedding)` rows to a Parquet file.
pub fn write_embeddings(path: &Path, rows: &[(String, Vec<f32>)]) -> Result<(), StoreError> {
    let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
    let schema = Arc::new(embedding_schema(dim as i32));

    let mut list = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for (id, v) in rows {
        if v.len() != dim {
            return Err(StoreError::Other(format!("embedding for {id} has wrong dimension")));
        }
        list.values().append_slice(v);
        list.append(true);
    }
    let ids = StringArray::from_iter_values(rows.iter().map(|(id, _)| id.as_str()));
    let batch = RecordBatch::try_new(Arc::clone(&schema), vec![Arc::new(ids), Arc::new(list.finish())])?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    info!(rows = rows.len(), dim, path = %path.display(), "wrote embedding store");
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
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

/// Arrow schema for the passage-embedding store.
pub mod embeddings {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const CHUNK_ID: &str = "chunk_id";
    pub const EMBEDDING: &str = "embedding";

    /// `chunk_id: Utf8`, `embedding: FixedSizeList<Float32>[dim]`.
    pub fn embedding_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new(CHUNK_ID, DataType::Utf8, false),
            Field::new(
                EMBEDDING,
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                false,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::embeddings;
    use arrow::datatypes::DataType;

    #[test]
    fn embedding_schema_has_expected_fields() {
        let schema = embeddings::embedding_schema(768);
        assert_eq!(schema.fields().len(), 2);
        assert!(schema.field_with_name(embeddings::CHUNK_ID).is_ok());
        match schema.field_with_name(embeddings::EMBEDDING).unwrap().data_type() {
            DataType::FixedSizeList(_, n) => assert_eq!(*n, 768),
            other => panic!("unexpected type {other:?}"),
        }
    }
}

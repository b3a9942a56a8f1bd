//! Per-record transforms applied between range slicing and chunking

use crate::error::BoxError;
use crate::record::Record;
use serde_json::Value;

/// Replaces a record before it enters a chunk.
pub trait RecordTransform: Send + Sync {
    fn apply(&self, record: Record) -> Result<Record, BoxError>;
}

impl<F> RecordTransform for F
where
    F: Fn(Record) -> Result<Record, BoxError> + Send + Sync,
{
    fn apply(&self, record: Record) -> Result<Record, BoxError> {
        self(record)
    }
}

/// Opaque text embedding model.
pub trait Embedder: Send + Sync {
    /// Length of every vector this model returns.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError>;
}

/// Adds a vector embedding of one text field to each record.
///
/// Missing, null or empty text produces a null embedding rather than a call
/// into the model.
pub struct EmbeddingTransform<E> {
    embedder: E,
    text_field: String,
    output_field: String,
    keep_fields: Option<Vec<String>>,
    normalize: bool,
}

impl<E: Embedder> EmbeddingTransform<E> {
    pub fn new(embedder: E, text_field: impl Into<String>) -> Self {
        Self {
            embedder,
            text_field: text_field.into(),
            output_field: "embedding".to_string(),
            keep_fields: None,
            normalize: false,
        }
    }

    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = field.into();
        self
    }

    /// Keep only these fields (plus the output field, which is always last).
    pub fn with_keep_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// L2-normalize vectors before storing them.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn embed_value(&self, text: Option<&Value>) -> Result<Value, BoxError> {
        let text = match text {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            Some(Value::String(_)) | Some(Value::Null) | None => return Ok(Value::Null),
            Some(other) => {
                return Err(format!(
                    "field '{}' must be a string, found {}",
                    self.text_field,
                    value_kind(other)
                )
                .into())
            }
        };

        let mut vector = self.embedder.embed(text)?;
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                expected
            )
            .into());
        }
        if self.normalize {
            l2_normalize(&mut vector);
        }
        Ok(Value::Array(vector.into_iter().map(Value::from).collect()))
    }
}

impl<E: Embedder> RecordTransform for EmbeddingTransform<E> {
    fn apply(&self, mut record: Record) -> Result<Record, BoxError> {
        let embedding = self.embed_value(record.get(&self.text_field))?;

        let mut out = match &self.keep_fields {
            Some(keep) => keep
                .iter()
                .filter_map(|name| record.remove(name).map(|v| (name.clone(), v)))
                .collect(),
            None => record,
        };
        out.insert(self.output_field.clone(), embedding);
        Ok(out)
    }
}

/// Keeps the named fields, in the given order; absent fields are skipped.
#[derive(Debug, Clone)]
pub struct FieldProjection {
    fields: Vec<String>,
}

impl FieldProjection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordTransform for FieldProjection {
    fn apply(&self, mut record: Record) -> Result<Record, BoxError> {
        Ok(self
            .fields
            .iter()
            .filter_map(|name| record.remove(name).map(|v| (name.clone(), v)))
            .collect())
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LengthEmbedder {
        calls: AtomicUsize,
        dimension: usize,
    }

    impl LengthEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dimension,
            }
        }
    }

    impl Embedder for LengthEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 0.0])
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn embeds_and_projects() {
        let transform = EmbeddingTransform::new(LengthEmbedder::new(2), "text")
            .with_keep_fields(["parent_asin"])
            .with_normalize(true);

        let out = transform
            .apply(record(json!({"rating": 5, "text": "abcd", "parent_asin": "B01"})))
            .unwrap();

        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["parent_asin", "embedding"]);
        assert_eq!(out["embedding"], json!([1.0, 0.0]));
    }

    #[test]
    fn empty_text_skips_the_model() {
        let transform = EmbeddingTransform::new(LengthEmbedder::new(2), "text");
        for input in [json!({"text": ""}), json!({"text": null}), json!({})] {
            let out = transform.apply(record(input)).unwrap();
            assert_eq!(out["embedding"], Value::Null);
        }
        assert_eq!(transform.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dimension_mismatch_and_bad_type_fail() {
        let transform = EmbeddingTransform::new(LengthEmbedder::new(3), "text");
        assert!(transform.apply(record(json!({"text": "abc"}))).is_err());

        let transform = EmbeddingTransform::new(LengthEmbedder::new(2), "text");
        let err = transform.apply(record(json!({"text": 42}))).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn projection_keeps_requested_order() {
        let projection = FieldProjection::new(["b", "missing", "a"]);
        let out = projection
            .apply(record(json!({"a": 1, "b": 2, "c": 3})))
            .unwrap();
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn closures_are_transforms() {
        let mark = |mut r: Record| -> Result<Record, BoxError> {
            r.insert("seen".to_string(), json!(true));
            Ok(r)
        };
        let out = mark.apply(record(json!({"id": 1}))).unwrap();
        assert_eq!(out["seen"], json!(true));
    }
}

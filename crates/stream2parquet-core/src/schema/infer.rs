// Schema inference from sampled records
//
// Arrow's JSON inference does the heavy lifting; on top of it, fields that
// were only ever null (or empty arrays) in the sample are widened to Utf8 so
// that later non-null values remain coercible instead of hitting a Null
// column that can hold nothing.

use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::error::ArrowError;
use arrow::json::reader::infer_json_schema_from_iterator;
use serde_json::Value;
use std::sync::Arc;

/// Infer a schema from a sample of JSON object rows.
pub fn infer_schema<'a, I>(rows: I) -> Result<Schema, ArrowError>
where
    I: IntoIterator<Item = &'a Value>,
{
    let inferred = infer_json_schema_from_iterator(rows.into_iter().map(Ok::<_, ArrowError>))?;
    Ok(widen_null_fields(&inferred))
}

/// Replace `Null` types with `Utf8`, recursing through lists and structs.
pub fn widen_null_fields(schema: &Schema) -> Schema {
    let fields: Vec<Field> = schema.fields().iter().map(|f| widen_field(f)).collect();
    Schema::new_with_metadata(fields, schema.metadata().clone())
}

fn widen_field(field: &Field) -> Field {
    field.clone().with_data_type(widen_type(field.data_type()))
}

fn widen_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Null => DataType::Utf8,
        DataType::List(item) => DataType::List(Arc::new(widen_field(item))),
        DataType::LargeList(item) => DataType::LargeList(Arc::new(widen_field(item))),
        DataType::Struct(fields) => {
            DataType::Struct(fields.iter().map(|f| widen_field(f)).collect::<Fields>())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_scalar_and_nested_types() {
        let rows = vec![
            json!({"rating": 4.0, "title": "ok", "helpful_vote": 3, "verified": true,
                   "images": [{"url": "a"}], "tags": ["x", "y"]}),
            json!({"rating": 5.0, "title": "great", "helpful_vote": 0, "verified": false,
                   "images": [], "tags": []}),
        ];
        let schema = infer_schema(&rows).unwrap();

        assert_eq!(
            schema.field_with_name("rating").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(
            schema.field_with_name("helpful_vote").unwrap().data_type(),
            &DataType::Int64
        );
        assert_eq!(
            schema.field_with_name("verified").unwrap().data_type(),
            &DataType::Boolean
        );
        match schema.field_with_name("tags").unwrap().data_type() {
            DataType::List(item) => assert_eq!(item.data_type(), &DataType::Utf8),
            other => panic!("expected list, got {other:?}"),
        }
        match schema.field_with_name("images").unwrap().data_type() {
            DataType::List(item) => assert!(matches!(item.data_type(), DataType::Struct(_))),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn null_only_fields_widen_to_utf8() {
        let rows = vec![
            json!({"id": 1, "store": null, "videos": []}),
            json!({"id": 2, "store": null, "videos": []}),
        ];
        let schema = infer_schema(&rows).unwrap();

        assert_eq!(
            schema.field_with_name("store").unwrap().data_type(),
            &DataType::Utf8
        );
        match schema.field_with_name("videos").unwrap().data_type() {
            DataType::List(item) => assert_eq!(item.data_type(), &DataType::Utf8),
            other => panic!("expected list, got {other:?}"),
        }
    }
}

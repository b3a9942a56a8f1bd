//! Schema locking and record coercion
//!
//! A run either starts with a supplied schema or infers one from its first
//! chunk. Once locked, every chunk is decoded against it with Arrow's JSON
//! decoder; a chunk that fails to decode is re-scanned record by record so the
//! error carries the exact stream offset of the first offending record.

pub mod file;
pub mod infer;

pub use file::{
    parse_schema_descriptor, parse_schema_file, parse_type, DescriptorFormat, FieldSpec,
    SchemaFileError, SchemaSpec,
};
pub use infer::{infer_schema, widen_null_fields};

use crate::error::{ExportError, Result};
use crate::source::{RecordSource, RecordStream};
use arrow::array::RecordBatch;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::error::ArrowError;
use arrow::json::ReaderBuilder;
use serde_json::Value;
use std::sync::Arc;

/// The schema of one export run, fixed at the first flush.
#[derive(Debug)]
pub(crate) struct SchemaLock {
    schema: Option<SchemaRef>,
    inferred: bool,
}

impl SchemaLock {
    pub(crate) fn new(supplied: Option<SchemaRef>) -> Self {
        Self {
            schema: supplied,
            inferred: false,
        }
    }

    pub(crate) fn get(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    pub(crate) fn was_inferred(&self) -> bool {
        self.inferred
    }

    /// Return the locked schema, inferring it from `rows` on first use.
    pub(crate) fn lock_from(&mut self, rows: &[Value], first_offset: u64) -> Result<SchemaRef> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }

        let schema = Arc::new(infer_schema(rows).map_err(|e| ExportError::SchemaMismatch {
            offset: first_offset,
            reason: format!("schema inference failed: {e}"),
        })?);
        tracing::debug!(
            fields = schema.fields().len(),
            rows = rows.len(),
            "Locked schema inferred from first chunk"
        );
        self.schema = Some(schema.clone());
        self.inferred = true;
        Ok(schema)
    }
}

/// Decode JSON object rows into a RecordBatch bound to `schema`.
///
/// `first_offset` is the stream offset of `rows[0]` and is only used for
/// error reporting.
pub fn coerce_rows(
    schema: &SchemaRef,
    rows: &[Value],
    strict_fields: bool,
    first_offset: u64,
) -> Result<RecordBatch> {
    // The JSON decoder truncates fractional numbers in integer columns, so
    // those are caught before decoding.
    let first_fractional = rows
        .iter()
        .enumerate()
        .find_map(|(index, row)| check_integers(schema, row).err().map(|reason| (index, reason)));

    let Some((index, reason)) = first_fractional else {
        return match decode_rows(schema, rows, strict_fields) {
            Ok(batch) => Ok(batch),
            Err(err) => Err(locate_mismatch(schema, rows, strict_fields, first_offset, err)),
        };
    };

    // An earlier record may still fail to decode for another reason
    let head = &rows[..index];
    if !head.is_empty() {
        if let Err(err) = decode_rows(schema, head, strict_fields) {
            return Err(locate_mismatch(schema, head, strict_fields, first_offset, err));
        }
    }
    Err(ExportError::SchemaMismatch {
        offset: first_offset + index as u64,
        reason,
    })
}

/// Reject values that the decoder would silently truncate into an integer
/// column: non-integral numbers and strings that are not integer literals.
fn check_integers(schema: &SchemaRef, row: &Value) -> std::result::Result<(), String> {
    let Value::Object(map) = row else {
        return Ok(());
    };
    for field in schema.fields() {
        if let Some(value) = map.get(field.name()) {
            check_integer_value(field.data_type(), value, field.name())?;
        }
    }
    Ok(())
}

fn check_integer_value(
    data_type: &DataType,
    value: &Value,
    path: &str,
) -> std::result::Result<(), String> {
    match (data_type, value) {
        (_, Value::Null) => Ok(()),
        (dt, Value::Number(n)) if dt.is_integer() => {
            if n.is_i64() || n.is_u64() {
                Ok(())
            } else {
                Err(format!(
                    "field '{path}': {n} is not an integer (column type {dt})"
                ))
            }
        }
        (dt, Value::String(s)) if dt.is_integer() => {
            let s = s.trim();
            if s.parse::<i64>().is_ok() || s.parse::<u64>().is_ok() {
                Ok(())
            } else {
                Err(format!(
                    "field '{path}': \"{s}\" is not an integer (column type {dt})"
                ))
            }
        }
        (
            DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _),
            Value::Array(values),
        ) => {
            for (i, v) in values.iter().enumerate() {
                check_integer_value(item.data_type(), v, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        (DataType::Struct(fields), Value::Object(map)) => {
            for field in fields {
                if let Some(v) = map.get(field.name()) {
                    check_integer_value(field.data_type(), v, &format!("{path}.{}", field.name()))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn decode_rows(
    schema: &SchemaRef,
    rows: &[Value],
    strict_fields: bool,
) -> std::result::Result<RecordBatch, ArrowError> {
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(rows.len().max(1))
        .with_strict_mode(strict_fields)
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(rows)?;
    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema.clone())))
}

fn locate_mismatch(
    schema: &SchemaRef,
    rows: &[Value],
    strict_fields: bool,
    first_offset: u64,
    chunk_error: ArrowError,
) -> ExportError {
    for (index, row) in rows.iter().enumerate() {
        if let Err(err) = decode_rows(schema, std::slice::from_ref(row), strict_fields) {
            return ExportError::SchemaMismatch {
                offset: first_offset + index as u64,
                reason: err.to_string(),
            };
        }
    }
    ExportError::SchemaMismatch {
        offset: first_offset,
        reason: chunk_error.to_string(),
    }
}

/// Infer a schema from the first `sample_size` records of `source`.
///
/// Mirrors a representative-sample pass: the caller typically opens a fresh
/// source for the real export afterwards.
pub fn sample_schema<S>(source: &mut S, sample_size: usize) -> Result<SchemaRef>
where
    S: RecordSource + ?Sized,
{
    let mut stream = RecordStream::new(source);
    let mut rows = Vec::with_capacity(sample_size.min(1 << 16));
    while rows.len() < sample_size {
        match stream.next_record()? {
            Some(record) => rows.push(Value::Object(record)),
            None => break,
        }
    }
    if rows.is_empty() {
        return Err(ExportError::NoSchema);
    }

    let schema = infer_schema(&rows).map_err(|e| ExportError::SchemaMismatch {
        offset: 0,
        reason: format!("schema inference failed: {e}"),
    })?;
    tracing::info!(
        sampled = rows.len(),
        fields = schema.fields().len(),
        "Schema extracted from sample"
    );
    Ok(Arc::new(schema))
}

// Read-back of finished artifacts
//
// Used to spot-check what landed in the sink: the first rows, or the footer
// summary (row counts, row groups, embedded metadata).

use crate::error::Result;
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::errors::ParquetError;

const READ_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub num_rows: u64,
    pub num_row_groups: usize,
    pub schema: SchemaRef,
    pub key_value_metadata: Vec<(String, String)>,
}

/// First `rows` rows of an artifact.
pub fn preview(bytes: Bytes, rows: usize) -> Result<Vec<RecordBatch>> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?
        .with_batch_size(rows.min(READ_BATCH_SIZE))
        .with_limit(rows)
        .build()?;
    collect(reader)
}

pub fn read_all(bytes: Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?
        .with_batch_size(READ_BATCH_SIZE)
        .build()?;
    collect(reader)
}

pub fn summarize(bytes: Bytes) -> Result<ArtifactSummary> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let metadata = builder.metadata();
    let file = metadata.file_metadata();

    let key_value_metadata = file
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .map(|kv| (kv.key.clone(), kv.value.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    Ok(ArtifactSummary {
        num_rows: file.num_rows().max(0) as u64,
        num_row_groups: metadata.num_row_groups(),
        schema: builder.schema().clone(),
        key_value_metadata,
    })
}

fn collect(reader: ParquetRecordBatchReader) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.map_err(ParquetError::from)?);
    }
    Ok(batches)
}

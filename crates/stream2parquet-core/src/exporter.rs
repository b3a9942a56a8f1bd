//! Streaming record-to-Parquet exporter
//!
//! One call to [`Exporter::export`] is one run: records are pulled from the
//! source, sliced to the requested range, buffered into chunks of
//! `chunk_size`, and each full chunk is coerced and encoded into the run's
//! buffer before the next record is accepted. Memory therefore stays bounded
//! by one chunk plus the compressed output.
//!
//! Phases of a run:
//!
//! ```text
//! NotStarted -> Accumulating <-> Flushing -> Finalized -> Delivered
//!                     \______________\__________\_______-> Failed
//! ```

use crate::encoding::{writer_properties, ChunkWriter, EncodedArtifact};
use crate::error::{ExportError, Result};
use crate::options::ExportOptions;
use crate::record::OutputRange;
use crate::schema::{coerce_rows, SchemaLock};
use crate::sink::Sink;
use crate::source::{RecordSource, RecordStream};
use crate::transform::RecordTransform;
use arrow::datatypes::SchemaRef;
use parquet::file::properties::WriterProperties;
use serde_json::Value;

/// Upper bound on the capacity reserved up front for a chunk.
const MAX_CHUNK_PREALLOC: usize = 1 << 16;

/// Outcome of a delivered export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub key: String,
    /// Size of the artifact handed to the sink
    pub bytes_written: u64,
    pub record_count: u64,
    /// Number of flushes, including the final partial chunk
    pub chunk_count: u64,
    pub schema: SchemaRef,
    /// blake3 hex digest of the artifact
    pub content_hash: String,
    pub range: Option<OutputRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    NotStarted,
    Accumulating,
    Flushing,
    Finalized,
    Delivered,
    Failed,
}

impl ExportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Accumulating => "accumulating",
            Self::Flushing => "flushing",
            Self::Finalized => "finalized",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reusable export configuration. Holds no per-run state, so one exporter
/// can serve concurrent runs over disjoint ranges.
pub struct Exporter {
    options: ExportOptions,
    transform: Option<Box<dyn RecordTransform>>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("options", &self.options)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportOptions::default())
    }
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            transform: None,
        }
    }

    /// Apply `transform` to every in-range record before it is buffered.
    pub fn with_transform<T>(mut self, transform: T) -> Self
    where
        T: RecordTransform + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export `range` of `source` (the whole stream when `None`) as one
    /// Parquet artifact stored under `key`.
    ///
    /// The sink is called at most once, and only after the artifact is
    /// complete; any error leaves the sink untouched except for
    /// [`ExportError::SinkWrite`], which reports the sink's own failure.
    pub fn export<S, K>(
        &self,
        source: &mut S,
        range: Option<OutputRange>,
        schema: Option<SchemaRef>,
        sink: &K,
        key: &str,
    ) -> Result<ExportResult>
    where
        S: RecordSource + ?Sized,
        K: Sink + ?Sized,
    {
        let mut run = ExportRun::new(&self.options, key, schema);
        match run.execute(self.transform.as_deref(), source, range, sink) {
            Ok(result) => Ok(result),
            Err(err) => {
                run.enter(ExportPhase::Failed);
                tracing::warn!(
                    key,
                    code = %err.code(),
                    error = %err,
                    "Export failed"
                );
                Err(err)
            }
        }
    }
}

/// Export with default options and the given `chunk_size`.
pub fn export<S, K>(
    source: &mut S,
    range: Option<OutputRange>,
    schema: Option<SchemaRef>,
    chunk_size: usize,
    sink: &K,
    key: &str,
) -> Result<ExportResult>
where
    S: RecordSource + ?Sized,
    K: Sink + ?Sized,
{
    Exporter::new(ExportOptions::default().with_chunk_size(chunk_size))
        .export(source, range, schema, sink, key)
}

/// State owned by a single run; dropped (with its buffer) when the run ends.
struct ExportRun<'a> {
    options: &'a ExportOptions,
    key: &'a str,
    phase: ExportPhase,
    lock: SchemaLock,
    properties: Option<WriterProperties>,
    writer: Option<ChunkWriter>,
    chunk: Vec<Value>,
    chunk_start: u64,
    chunk_count: u64,
}

impl<'a> ExportRun<'a> {
    fn new(options: &'a ExportOptions, key: &'a str, schema: Option<SchemaRef>) -> Self {
        Self {
            options,
            key,
            phase: ExportPhase::NotStarted,
            lock: SchemaLock::new(schema),
            properties: None,
            writer: None,
            chunk: Vec::new(),
            chunk_start: 0,
            chunk_count: 0,
        }
    }

    fn enter(&mut self, phase: ExportPhase) {
        if self.phase != phase {
            tracing::debug!(key = self.key, from = %self.phase, to = %phase, "Export phase");
            self.phase = phase;
        }
    }

    fn execute<S, K>(
        &mut self,
        transform: Option<&dyn RecordTransform>,
        source: &mut S,
        range: Option<OutputRange>,
        sink: &K,
    ) -> Result<ExportResult>
    where
        S: RecordSource + ?Sized,
        K: Sink + ?Sized,
    {
        if let Some(r) = range {
            if r.is_empty() {
                return Err(ExportError::EmptyRange {
                    start: r.start,
                    end: r.end,
                });
            }
        }
        self.options.validate()?;
        self.properties = Some(writer_properties(self.options)?);

        let start = range.map_or(0, |r| r.start);
        let limit = range.map(|r| r.len());
        let mut stream = RecordStream::new(source);

        if start > 0 {
            let skipped = stream.skip(start)?;
            if skipped < start {
                return Err(ExportError::SourceExhaustedEarly {
                    expected: limit.unwrap_or(0),
                    observed: 0,
                });
            }
            tracing::debug!(key = self.key, skipped, "Skipped to range start");
        }

        self.chunk = Vec::with_capacity(self.options.chunk_size.min(MAX_CHUNK_PREALLOC));
        self.chunk_start = start;
        self.enter(ExportPhase::Accumulating);

        let mut record_count = 0u64;
        loop {
            if limit.is_some_and(|limit| record_count >= limit) {
                break;
            }
            let Some(record) = stream.next_record()? else {
                break;
            };
            let offset = start + record_count;
            let record = match transform {
                Some(t) => t
                    .apply(record)
                    .map_err(|source| ExportError::Transform { offset, source })?,
                None => record,
            };

            self.chunk.push(Value::Object(record));
            record_count += 1;
            if self.chunk.len() >= self.options.chunk_size {
                self.flush_chunk()?;
            }
        }

        if let Some(expected) = limit {
            if record_count < expected {
                return Err(ExportError::SourceExhaustedEarly {
                    expected,
                    observed: record_count,
                });
            }
        }
        if !self.chunk.is_empty() {
            self.flush_chunk()?;
        }

        let (schema, artifact) = self.finalize()?;
        self.enter(ExportPhase::Finalized);

        let EncodedArtifact {
            bytes,
            content_hash,
        } = artifact;
        let bytes_written = bytes.len() as u64;
        sink.put(self.key, bytes)
            .map_err(|source| ExportError::SinkWrite {
                key: self.key.to_string(),
                source,
            })?;
        self.enter(ExportPhase::Delivered);

        tracing::info!(
            key = self.key,
            records = record_count,
            chunks = self.chunk_count,
            bytes = bytes_written,
            hash = %content_hash,
            "Export delivered"
        );

        Ok(ExportResult {
            key: self.key.to_string(),
            bytes_written,
            record_count,
            chunk_count: self.chunk_count,
            schema,
            content_hash,
            range,
        })
    }

    /// Coerce and encode the buffered chunk, then clear it.
    fn flush_chunk(&mut self) -> Result<()> {
        self.enter(ExportPhase::Flushing);

        let schema = self.lock.lock_from(&self.chunk, self.chunk_start)?;
        let batch = coerce_rows(
            &schema,
            &self.chunk,
            self.options.strict_fields,
            self.chunk_start,
        )?;

        let writer = self.open_writer(schema)?;
        writer.write_chunk(&batch)?;
        let bytes = writer.bytes_written();

        let rows = self.chunk.len() as u64;
        self.chunk_count += 1;
        tracing::info!(
            key = self.key,
            chunk = self.chunk_count,
            rows,
            offset = self.chunk_start,
            bytes,
            "Flushed chunk"
        );

        self.chunk_start += rows;
        self.chunk.clear();
        self.enter(ExportPhase::Accumulating);
        Ok(())
    }

    fn open_writer(&mut self, schema: SchemaRef) -> Result<&mut ChunkWriter> {
        if self.writer.is_none() {
            let properties = self.properties.take().ok_or_else(|| {
                ExportError::InvalidOptions("writer properties already consumed".to_string())
            })?;
            if self.lock.was_inferred() {
                tracing::debug!(
                    key = self.key,
                    fields = schema.fields().len(),
                    "Opening writer on inferred schema"
                );
            }
            self.writer = Some(ChunkWriter::open(schema, properties)?);
        }
        self.writer.as_mut().ok_or_else(|| {
            ExportError::InvalidOptions("writer unavailable".to_string())
        })
    }

    /// Write the footer. A run that saw no records still produces a valid
    /// zero-row file when a schema was supplied.
    fn finalize(&mut self) -> Result<(SchemaRef, EncodedArtifact)> {
        let schema = self.lock.get().cloned().ok_or(ExportError::NoSchema)?;
        if self.writer.is_none() {
            self.open_writer(schema.clone())?;
        }
        let writer = self
            .writer
            .take()
            .ok_or_else(|| ExportError::InvalidOptions("writer unavailable".to_string()))?;
        Ok((schema, writer.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::source::IterSource;
    use crate::record::Record;
    use serde_json::json;

    fn records(n: u64) -> impl Iterator<Item = Record> {
        (0..n).map(|i| match json!({"id": i, "name": format!("r{i}")}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
    }

    #[test]
    fn chunk_count_includes_partial_flush() {
        let sink = MemorySink::new();
        let mut source = IterSource::new(records(25)).with_batch_size(4);
        let result = export(&mut source, None, None, 10, &sink, "out.parquet").unwrap();

        assert_eq!(result.record_count, 25);
        assert_eq!(result.chunk_count, 3);
        assert_eq!(result.bytes_written as usize, sink.object("out.parquet").unwrap().len());
        assert_eq!(sink.put_count(), 1);
    }

    #[test]
    fn exact_multiple_has_no_extra_flush() {
        let sink = MemorySink::new();
        let mut source = IterSource::new(records(20));
        let result = export(&mut source, None, None, 10, &sink, "k").unwrap();
        assert_eq!(result.chunk_count, 2);
    }

    #[test]
    fn empty_range_fails_before_reading() {
        struct Untouchable;
        impl RecordSource for Untouchable {
            fn next_batch(
                &mut self,
            ) -> std::result::Result<Option<Vec<Record>>, crate::source::SourceError> {
                panic!("source must not be read");
            }
        }

        let sink = MemorySink::new();
        let err = export(
            &mut Untouchable,
            Some(OutputRange::new(5, 5)),
            None,
            10,
            &sink,
            "k",
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::EmptyRange { start: 5, end: 5 }));
        assert_eq!(sink.put_count(), 0);
    }

    #[test]
    fn invalid_options_are_reported() {
        let sink = MemorySink::new();
        let mut source = IterSource::new(records(3));
        let err = export(&mut source, None, None, 0, &sink, "k").unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(_)));
    }

    #[test]
    fn phase_names() {
        assert_eq!(ExportPhase::Accumulating.to_string(), "accumulating");
        assert_eq!(ExportPhase::Failed.as_str(), "failed");
    }
}

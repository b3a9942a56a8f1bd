// Parquet encoding for export runs
//
// Each flushed chunk becomes exactly one row group; pages inside it are
// ZSTD-compressed as they are produced, so the buffer only ever holds
// finished, compressed bytes plus the row group currently being encoded.

use crate::error::{ExportError, Result};
use crate::options::ExportOptions;
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;
use std::io::{self, Write};

pub const VERSION_METADATA_KEY: &str = "stream2parquet.version";
pub const CHUNK_SIZE_METADATA_KEY: &str = "stream2parquet.chunk_size";

/// Growable export buffer that hashes bytes as the writer emits them.
pub(crate) struct HashingBuffer {
    buffer: Vec<u8>,
    hasher: blake3::Hasher,
}

impl HashingBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::new(),
            hasher: blake3::Hasher::new(),
        }
    }

    fn finish(self) -> (Vec<u8>, blake3::Hash) {
        (self.buffer, self.hasher.finalize())
    }
}

impl Write for HashingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Build writer properties for one run.
///
/// - ZSTD at the configured level
/// - Dictionary encoding enabled
/// - Page-level statistics
/// - One row group per chunk
/// - Version and chunk size embedded in the footer (nothing time-dependent,
///   so identical inputs give identical files)
pub(crate) fn writer_properties(options: &ExportOptions) -> Result<WriterProperties> {
    let level = ZstdLevel::try_new(options.compression_level).map_err(|e| {
        ExportError::InvalidOptions(format!(
            "compression_level {}: {}",
            options.compression_level, e
        ))
    })?;

    let mut metadata = vec![
        KeyValue {
            key: VERSION_METADATA_KEY.to_string(),
            value: Some(env!("CARGO_PKG_VERSION").to_string()),
        },
        KeyValue {
            key: CHUNK_SIZE_METADATA_KEY.to_string(),
            value: Some(options.chunk_size.to_string()),
        },
    ];
    metadata.extend(options.metadata.iter().map(|(key, value)| KeyValue {
        key: key.clone(),
        value: Some(value.clone()),
    }));

    Ok(WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(Compression::ZSTD(level))
        .set_data_page_size_limit(options.page_size)
        .set_max_row_group_size(options.chunk_size)
        .set_key_value_metadata(Some(metadata))
        .build())
}

/// Finished artifact, ready for hand-off to a sink.
pub(crate) struct EncodedArtifact {
    pub bytes: Bytes,
    pub content_hash: String,
}

/// Arrow writer bound to the locked schema of one run.
pub(crate) struct ChunkWriter {
    writer: ArrowWriter<HashingBuffer>,
}

impl ChunkWriter {
    pub(crate) fn open(schema: SchemaRef, properties: WriterProperties) -> Result<Self> {
        let writer = ArrowWriter::try_new(HashingBuffer::new(), schema, Some(properties))?;
        Ok(Self { writer })
    }

    /// Encode one chunk and close its row group.
    pub(crate) fn write_chunk(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Bytes already emitted into the export buffer.
    pub(crate) fn bytes_written(&self) -> usize {
        self.writer.bytes_written()
    }

    /// Write the footer and release the buffer.
    pub(crate) fn finish(self) -> Result<EncodedArtifact> {
        let buffer = self.writer.into_inner()?;
        let (bytes, hash) = buffer.finish();
        Ok(EncodedArtifact {
            bytes: Bytes::from(bytes),
            content_hash: hash.to_hex().to_string(),
        })
    }
}

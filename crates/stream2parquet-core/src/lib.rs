// stream2parquet-core - Bounded-memory record stream to Parquet conversion
//
// Pure, synchronous conversion logic. The only I/O is what the caller hands
// in through the two capabilities:
// - RecordSource: pull-based producer of records
// - Sink: durable destination for the finished artifact
//
// Memory held by one run is one chunk of records plus the compressed output
// produced so far.

pub mod encoding;
pub mod error;
pub mod exporter;
pub mod options;
pub mod preview;
pub mod record;
pub mod schema;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export commonly used types
pub use error::{BoxError, ErrorCode, ExportError, Result};
pub use exporter::{export, ExportPhase, ExportResult, Exporter};
pub use options::{ExportOptions, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL, DEFAULT_PAGE_SIZE};
pub use preview::{preview, read_all, summarize, ArtifactSummary};
pub use record::{OutputRange, Record};
pub use schema::{coerce_rows, infer_schema, parse_schema_descriptor, parse_schema_file, sample_schema};
pub use sink::{ArtifactReader, MemorySink, Sink};
pub use source::{IterSource, JsonLinesSource, RecordSource, SourceError};
pub use transform::{Embedder, EmbeddingTransform, FieldProjection, RecordTransform};

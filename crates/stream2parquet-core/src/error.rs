//! Error types for the export pipeline

use crate::source::SourceError;
use thiserror::Error;

/// Boxed error returned by external collaborators (sinks, transforms, embedders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E101: Record does not fit the locked schema
    E101SchemaMismatch,
    /// E102: Requested range is empty or inverted
    E102EmptyRange,
    /// E103: Source ended before the requested range was filled
    E103SourceExhaustedEarly,
    /// E104: Sink rejected the finished artifact
    E104SinkWrite,
    /// E105: Source failed while producing records
    E105SourceRead,
    /// E106: Per-record transform failed
    E106Transform,
    /// E107: Parquet encoding failed
    E107Encode,
    /// E108: Nothing to infer a schema from
    E108NoSchema,
    /// E109: Export options are invalid
    E109InvalidOptions,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E101SchemaMismatch => "E101",
            Self::E102EmptyRange => "E102",
            Self::E103SourceExhaustedEarly => "E103",
            Self::E104SinkWrite => "E104",
            Self::E105SourceRead => "E105",
            Self::E106Transform => "E106",
            Self::E107Encode => "E107",
            Self::E108NoSchema => "E108",
            Self::E109InvalidOptions => "E109",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort an export run.
///
/// Every variant is terminal for the call that produced it: the in-memory
/// buffer and writer are dropped and no partial artifact reaches the sink.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A record cannot be coerced to the schema locked for this run
    #[error("[E101] Record at offset {offset} does not match the locked schema: {reason}")]
    SchemaMismatch { offset: u64, reason: String },

    /// `range.start >= range.end`
    #[error("[E102] Empty range [{start}, {end})")]
    EmptyRange { start: u64, end: u64 },

    /// The source ended before `range.end`
    #[error("[E103] Source exhausted early: expected {expected} records, observed {observed}")]
    SourceExhaustedEarly { expected: u64, observed: u64 },

    /// The sink failed to store the finished artifact
    #[error("[E104] Sink write failed for key '{key}': {source}")]
    SinkWrite {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The source failed while producing records
    #[error("[E105] Source read failed: {0}")]
    Source(#[from] SourceError),

    /// A per-record transform rejected a record
    #[error("[E106] Transform failed at offset {offset}: {source}")]
    Transform {
        offset: u64,
        #[source]
        source: BoxError,
    },

    /// Parquet encoding failed
    #[error("[E107] Parquet encoding failed: {0}")]
    Encode(#[from] parquet::errors::ParquetError),

    /// No schema was supplied and the stream produced no records to infer one from
    #[error("[E108] No schema supplied and no records to infer one from")]
    NoSchema,

    /// Export options are out of bounds
    #[error("[E109] Invalid export options: {0}")]
    InvalidOptions(String),
}

impl ExportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemaMismatch { .. } => ErrorCode::E101SchemaMismatch,
            Self::EmptyRange { .. } => ErrorCode::E102EmptyRange,
            Self::SourceExhaustedEarly { .. } => ErrorCode::E103SourceExhaustedEarly,
            Self::SinkWrite { .. } => ErrorCode::E104SinkWrite,
            Self::Source(_) => ErrorCode::E105SourceRead,
            Self::Transform { .. } => ErrorCode::E106Transform,
            Self::Encode(_) => ErrorCode::E107Encode,
            Self::NoSchema => ErrorCode::E108NoSchema,
            Self::InvalidOptions(_) => ErrorCode::E109InvalidOptions,
        }
    }
}

/// Result type alias for ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_embedded_in_messages() {
        let err = ExportError::EmptyRange { start: 5, end: 5 };
        assert_eq!(err.code(), ErrorCode::E102EmptyRange);
        assert!(err.to_string().starts_with("[E102]"));

        let err = ExportError::SinkWrite {
            key: "out.parquet".to_string(),
            source: "bucket gone".into(),
        };
        assert_eq!(err.code().as_str(), "E104");
        assert!(err.to_string().contains("out.parquet"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

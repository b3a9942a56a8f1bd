use crate::error::{ExportError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 5;
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// Per-run knobs for the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Records buffered before each serialization flush
    pub chunk_size: usize,
    /// ZSTD level applied to every data page
    pub compression_level: i32,
    /// Upper bound for a data page in bytes
    pub page_size: usize,
    /// Reject record fields that the locked schema does not declare
    pub strict_fields: bool,
    /// Extra key/value pairs embedded in the file footer
    pub metadata: Vec<(String, String)>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            page_size: DEFAULT_PAGE_SIZE,
            strict_fields: true,
            metadata: Vec::new(),
        }
    }
}

impl ExportOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ExportError::InvalidOptions(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ExportError::InvalidOptions(
                "page_size must be greater than 0".to_string(),
            ));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ExportError::InvalidOptions(format!(
                "compression_level must be between 1 and 22, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

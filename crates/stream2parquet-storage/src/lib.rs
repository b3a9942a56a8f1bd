// stream2parquet-storage - OpenDAL-based sink
//
// Unified storage abstraction for finished artifacts:
// - S3 (and S3-compatible endpoints)
// - Filesystem
// - Memory (tests, dry runs)
//
// The core Sink contract is synchronous; the sink owns a small tokio runtime
// and blocks on OpenDAL's async operations. Callers must not invoke it from
// inside another tokio runtime.

mod error;

pub use error::{ErrorCode, StorageError};

use bytes::Bytes;
use opendal::{services, ErrorKind, Operator};
use std::sync::Arc;
use stream2parquet_config::{S3Config, StorageBackend, StorageConfig};
use stream2parquet_core::{ArtifactReader, BoxError, Sink};
use tokio::runtime::{Builder, Runtime};

const RUNTIME_WORKERS: usize = 2;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Clone)]
pub struct OpendalSink {
    operator: Operator,
    backend: StorageBackend,
    prefix: Option<String>,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for OpendalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpendalSink")
            .field("backend", &self.backend)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl OpendalSink {
    /// Build a sink for the configured backend.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let sink = match config.backend {
            StorageBackend::Fs => {
                let fs = config.fs.as_ref().ok_or_else(|| {
                    StorageError::InvalidConfig(
                        "fs storage backend requires 'fs' configuration".to_string(),
                    )
                })?;
                Self::new_fs(&fs.path)?
            }
            StorageBackend::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| {
                    StorageError::InvalidConfig(
                        "s3 storage backend requires 's3' configuration".to_string(),
                    )
                })?;
                Self::new_s3(s3)?
            }
            StorageBackend::Memory => Self::new_memory()?,
        };
        Ok(sink.with_prefix(config.prefix.as_deref()))
    }

    /// Create a sink for S3 (including S3-compatible endpoints)
    pub fn new_s3(config: &S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::InvalidConfig(
                "storage.s3.bucket must not be empty".to_string(),
            ));
        }

        let mut builder = services::S3::default()
            .bucket(&config.bucket)
            .region(&config.region);

        if let Some(ep) = &config.endpoint {
            builder = builder.endpoint(ep);
        }

        if let Some(key) = &config.access_key_id {
            builder = builder.access_key_id(key);
        }

        if let Some(secret) = &config.secret_access_key {
            builder = builder.secret_access_key(secret);
        }

        let operator = Operator::new(builder)?.finish();
        tracing::debug!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint,
            "Created S3 sink"
        );
        Self::with_operator(operator, StorageBackend::S3)
    }

    /// Create a sink rooted at a local directory
    pub fn new_fs(root: &str) -> Result<Self> {
        if root.is_empty() {
            return Err(StorageError::InvalidConfig(
                "storage.fs.path must not be empty".to_string(),
            ));
        }
        let operator = Operator::new(services::Fs::default().root(root))?.finish();
        tracing::debug!(root, "Created filesystem sink");
        Self::with_operator(operator, StorageBackend::Fs)
    }

    /// Create a sink backed by a private in-memory store
    pub fn new_memory() -> Result<Self> {
        let operator = Operator::new(services::Memory::default())?.finish();
        Self::with_operator(operator, StorageBackend::Memory)
    }

    fn with_operator(operator: Operator, backend: StorageBackend) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKERS)
            .thread_name("stream2parquet-storage")
            .enable_all()
            .build()
            .map_err(StorageError::Runtime)?;
        Ok(Self {
            operator,
            backend,
            prefix: None,
            runtime: Arc::new(runtime),
        })
    }

    /// Prepend `prefix` to every key; normalized to end with '/'
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.and_then(normalize_prefix);
        self
    }

    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    /// Full object path for `key`
    pub fn path_for(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    pub fn write(&self, key: &str, bytes: Bytes) -> Result<()> {
        let path = self.path_for(key);
        let size = bytes.len();
        self.runtime.block_on(self.operator.write(&path, bytes))?;
        tracing::info!(backend = %self.backend, path = %path, bytes = size, "Stored artifact");
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key);
        let buffer = self.runtime.block_on(self.operator.read(&path))?;
        Ok(buffer.to_bytes())
    }

    /// Check if key exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        match self.runtime.block_on(self.operator.stat(&path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Sink for OpendalSink {
    fn put(&self, key: &str, bytes: Bytes) -> std::result::Result<(), BoxError> {
        self.write(key, bytes).map_err(Into::into)
    }
}

impl ArtifactReader for OpendalSink {
    fn get(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
        self.read(key).map_err(Into::into)
    }
}

fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        None
    } else if trimmed.ends_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("{}/", trimmed))
    }
}

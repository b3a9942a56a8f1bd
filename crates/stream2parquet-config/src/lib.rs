// stream2parquet-config - Runtime configuration
//
// Supports configuration from multiple sources:
// 1. CLI flags (applied by the binary, highest priority)
// 2. Environment variables (STREAM2PARQUET_* plus the raw AWS_* / S3_BUCKET_NAME set)
// 3. Config file from --config, STREAM2PARQUET_CONFIG or STREAM2PARQUET_CONFIG_CONTENT
// 4. Default config file location (./stream2parquet.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};
pub use sources::StdEnvSource;

pub const DEFAULT_KEY_TEMPLATE: &str = "data/part_{start}_{end}.parquet";

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-run export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub chunk_size: usize,
    pub compression_level: i32,
    pub page_size: usize,
    /// Reject record fields missing from the schema
    pub strict_fields: bool,
    /// Infer the schema from this many leading records instead of the first chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_sample: Option<usize>,
    /// TOML/JSON schema descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            compression_level: 5,
            page_size: 1024 * 1024,
            strict_fields: true,
            schema_sample: None,
            schema_file: None,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Prepended to every key; normalized to end with '/'
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            prefix: None,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Fs,
    S3,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!(
                "Unsupported storage backend: {}. Supported: fs, s3, memory",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

/// Fixed-size partitioning of one stream into several files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Records per file
    pub file_size: u64,
    pub num_files: u64,
    /// Rendered with {start}, {end} and {index}
    pub key_template: String,
    /// Exports running at once
    pub parallelism: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            file_size: 7_000_000,
            num_files: 3,
            key_template: DEFAULT_KEY_TEMPLATE.to_string(),
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config(None, &StdEnvSource)
    }

    /// Load configuration starting from an explicit file (CLI --config flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_config(Some(path.as_ref()), &StdEnvSource)
    }

    /// Load with a custom environment source (useful for testing)
    pub fn load_with_env<E: EnvSource>(path: Option<&Path>, env: &E) -> Result<Self> {
        sources::load_config(path, env)
    }

    /// Like `load`, but a missing or unreadable config file falls back to defaults
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default(&StdEnvSource)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        sources::parse_config(content, "inline config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Partition section, created with defaults when absent
    pub fn partition_mut(&mut self) -> &mut PartitionConfig {
        self.partition.get_or_insert_with(PartitionConfig::default)
    }

    /// S3 section, created with defaults when absent
    pub fn s3_mut(&mut self) -> &mut S3Config {
        self.storage.s3.get_or_insert_with(|| S3Config {
            region: default_region(),
            ..S3Config::default()
        })
    }

    /// Filesystem section, created with defaults when absent
    pub fn fs_mut(&mut self) -> &mut FsConfig {
        self.storage.fs.get_or_insert_with(FsConfig::default)
    }
}

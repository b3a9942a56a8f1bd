// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_export_config(&config.export)?;
    validate_storage_config(&config.storage)?;

    if let Some(ref partition) = config.partition {
        validate_partition_config(partition)?;
    }

    Ok(())
}

fn validate_export_config(config: &ExportConfig) -> Result<()> {
    if config.chunk_size == 0 {
        bail!("export.chunk_size must be greater than 0");
    }

    if !(1..=22).contains(&config.compression_level) {
        bail!(
            "export.compression_level must be between 1 and 22, got {}",
            config.compression_level
        );
    }

    if config.page_size == 0 {
        bail!("export.page_size must be greater than 0");
    }

    if config.schema_sample == Some(0) {
        bail!("export.schema_sample must be greater than 0");
    }

    // Warn about very large chunks
    if config.chunk_size > 10_000_000 {
        warn!(
            chunk_size = config.chunk_size,
            "export.chunk_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!("storage.fs.path must not be empty");
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!("storage.s3.bucket is required for S3 backend");
            }

            if s3.region.is_empty() {
                bail!("storage.s3.region is required for S3 backend");
            }

            if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                warn!("only one of access_key_id / secret_access_key is set; falling back to ambient credentials");
            }
        }
        StorageBackend::Memory => {}
    }

    Ok(())
}

fn validate_partition_config(config: &PartitionConfig) -> Result<()> {
    if config.file_size == 0 {
        bail!("partition.file_size must be greater than 0");
    }

    if config.num_files == 0 {
        bail!("partition.num_files must be greater than 0");
    }

    if config.file_size.checked_mul(config.num_files).is_none() {
        bail!(
            "partition.file_size ({}) x partition.num_files ({}) overflows the record offset",
            config.file_size,
            config.num_files
        );
    }

    if config.parallelism == 0 {
        bail!("partition.parallelism must be at least 1");
    }

    if config.key_template.is_empty() {
        bail!("partition.key_template must not be empty");
    }

    let distinct = ["{start}", "{end}", "{index}"]
        .iter()
        .any(|p| config.key_template.contains(p));
    if config.num_files > 1 && !distinct {
        bail!(
            "partition.key_template '{}' must contain {{start}}, {{end}} or {{index}} when num_files > 1",
            config.key_template
        );
    }

    if config.parallelism as u64 > config.num_files {
        warn!(
            parallelism = config.parallelism,
            num_files = config.num_files,
            "partition.parallelism exceeds num_files; extra workers will idle"
        );
    }

    Ok(())
}

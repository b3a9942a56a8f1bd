use super::{LogFormat, RuntimeConfig, StorageBackend};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "STREAM2PARQUET_";

/// Abstraction over environment-variable lookups so tests can inject a map.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the STREAM2PARQUET_ prefix
    /// Used for AWS standard variables (AWS_ACCESS_KEY_ID, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides to the runtime config.
///
/// Raw AWS variables are applied first so that a prefixed variable for the
/// same setting wins.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Export configuration
    if let Some(val) = get_env_usize(env, "CHUNK_SIZE")? {
        config.export.chunk_size = val;
    }
    if let Some(val) = get_env_i32(env, "COMPRESSION_LEVEL")? {
        config.export.compression_level = val;
    }
    if let Some(val) = get_env_usize(env, "PAGE_SIZE")? {
        config.export.page_size = val;
    }
    if let Some(val) = get_env_bool(env, "STRICT_FIELDS")? {
        config.export.strict_fields = val;
    }
    if let Some(val) = get_env_usize(env, "SCHEMA_SAMPLE")? {
        config.export.schema_sample = Some(val);
    }
    if let Some(path) = get_env_string(env, "SCHEMA_FILE")? {
        config.export.schema_file = Some(path);
    }

    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND")? {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid STREAM2PARQUET_STORAGE_BACKEND value")?;
    }
    if let Some(prefix) = get_env_string(env, "STORAGE_PREFIX")? {
        config.storage.prefix = if prefix.is_empty() { None } else { Some(prefix) };
    }

    // Filesystem storage
    if let Some(path) = get_env_string(env, "STORAGE_PATH")? {
        config.fs_mut().path = path;
    }

    // AWS standard variables (without STREAM2PARQUET_ prefix for compatibility)
    if let Some(bucket) = get_raw_env_string(env, "S3_BUCKET_NAME")? {
        config.s3_mut().bucket = bucket;
    }
    if let Some(region) = get_raw_env_string(env, "AWS_REGION")? {
        config.s3_mut().region = region;
    }
    if let Some(access_key_id) = get_raw_env_string(env, "AWS_ACCESS_KEY_ID")? {
        config.s3_mut().access_key_id = Some(access_key_id);
    }
    if let Some(secret_access_key) = get_raw_env_string(env, "AWS_SECRET_ACCESS_KEY")? {
        config.s3_mut().secret_access_key = Some(secret_access_key);
    }
    if let Some(endpoint) = get_raw_env_string(env, "AWS_ENDPOINT_URL")? {
        config.s3_mut().endpoint = Some(endpoint);
    }

    // S3 storage
    if let Some(bucket) = get_env_string(env, "S3_BUCKET")? {
        config.s3_mut().bucket = bucket;
    }
    if let Some(region) = get_env_string(env, "S3_REGION")? {
        config.s3_mut().region = region;
    }
    if let Some(endpoint) = get_env_string(env, "S3_ENDPOINT")? {
        config.s3_mut().endpoint = Some(endpoint);
    }

    // Partitioning
    if let Some(val) = get_env_u64(env, "PARTITION_FILE_SIZE")? {
        config.partition_mut().file_size = val;
    }
    if let Some(val) = get_env_u64(env, "PARTITION_NUM_FILES")? {
        config.partition_mut().num_files = val;
    }
    if let Some(template) = get_env_string(env, "PARTITION_KEY_TEMPLATE")? {
        config.partition_mut().key_template = template;
    }
    if let Some(val) = get_env_usize(env, "PARTITION_PARALLELISM")? {
        config.partition_mut().parallelism = val;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

/// Get a raw environment variable without the STREAM2PARQUET_ prefix
fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get_raw(key))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_i32<E: EnvSource>(env: &E, key: &str) -> Result<Option<i32>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<i32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

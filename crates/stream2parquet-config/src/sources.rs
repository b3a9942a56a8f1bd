// Configuration source loading.
//
// Priority order:
// 1. Environment variables (STREAM2PARQUET_* prefix, raw AWS_* names)
// 2. Explicit config file path (CLI --config)
// 3. Config file path from STREAM2PARQUET_CONFIG
// 4. Inline config content from STREAM2PARQUET_CONFIG_CONTENT
// 5. Default config file (./stream2parquet.toml)
// 6. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "./stream2parquet.toml";

pub(crate) fn load_config<E: EnvSource>(path: Option<&Path>, env: &E) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => load_from_file(env)?.unwrap_or_default(),
    };

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Tries the standard sources, returns defaults if none can be read.
pub(crate) fn load_or_default<E: EnvSource>(env: &E) -> Result<RuntimeConfig> {
    let mut config = match load_from_file(env) {
        Ok(Some(file_config)) => file_config,
        Ok(None) => RuntimeConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable config file, using defaults");
            RuntimeConfig::default()
        }
    };

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn parse_config(content: &str, origin: &str) -> Result<RuntimeConfig> {
    toml::from_str(content).with_context(|| format!("Failed to parse {}", origin))
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config = parse_config(
            &content,
            &format!("inline config from {}CONFIG_CONTENT", ENV_PREFIX),
        )?;
        return Ok(Some(config));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_config_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, &format!("config file: {}", path.display()))
}

/// Process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_overrides::tests::MapEnv;
    use crate::StorageBackend;
    use std::io::Write;

    #[test]
    fn explicit_file_then_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[export]\nchunk_size = 2000\n\n[storage]\nbackend = \"memory\""
        )
        .unwrap();

        let env = MapEnv::default().with("STREAM2PARQUET_CHUNK_SIZE", "3000");
        let config = load_config(Some(file.path()), &env).unwrap();
        assert_eq!(config.export.chunk_size, 3_000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn config_path_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let env = MapEnv::default().with("STREAM2PARQUET_CONFIG", &path);
        let config = load_config(None, &env).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn inline_content_from_env() {
        let env = MapEnv::default().with(
            "STREAM2PARQUET_CONFIG_CONTENT",
            "[partition]\nfile_size = 10\nnum_files = 2\nkey_template = \"k_{index}.parquet\"",
        );
        let config = load_config(None, &env).unwrap();
        let partition = config.partition.unwrap();
        assert_eq!(partition.file_size, 10);
        assert_eq!(partition.key_template, "k_{index}.parquet");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let env = MapEnv::default();
        let err = load_config(Some(Path::new("/nonexistent/stream2parquet.toml")), &env)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[export]\ncompression_level = 30").unwrap();
        assert!(load_config(Some(file.path()), &MapEnv::default()).is_err());
    }

    #[test]
    fn unparseable_inline_content_falls_back_in_lenient_mode() {
        let env = MapEnv::default().with("STREAM2PARQUET_CONFIG_CONTENT", "not = [valid");
        assert!(load_config(None, &env).is_err());
        let config = load_or_default(&env).unwrap();
        assert_eq!(config.export.chunk_size, 100_000);
    }
}

// stream2parquet - driver layer
//
// Glue between the pure export core and the outside world:
// - input: opening stdin, files and URLs as record sources
// - plan: cutting one stream into fixed-size partitions and running them
// - init: tracing setup from RuntimeConfig
// - schema resolution from config (descriptor file or sample pass)

use anyhow::{bail, Context, Result};
use arrow::datatypes::SchemaRef;
use stream2parquet_config::{ExportConfig, RuntimeConfig};
use stream2parquet_core::{parse_schema_file, sample_schema, ExportOptions};

mod init;
pub mod input;
pub mod plan;

pub use init::init_tracing;
pub use input::InputSpec;
pub use plan::{render_key, run_partitions, Partition, PartitionPlan};

/// Exporter options from the `[export]` section.
pub fn export_options(config: &ExportConfig) -> ExportOptions {
    ExportOptions::default()
        .with_chunk_size(config.chunk_size)
        .with_compression_level(config.compression_level)
        .with_page_size(config.page_size)
        .with_strict_fields(config.strict_fields)
}

/// Resolve the run schema: a descriptor file wins over a sample pass; with
/// neither, the exporter infers from the first chunk.
pub fn resolve_schema(config: &RuntimeConfig, input: &InputSpec) -> Result<Option<SchemaRef>> {
    if let Some(path) = &config.export.schema_file {
        let schema = parse_schema_file(path)
            .with_context(|| format!("Failed to load schema descriptor {}", path))?;
        tracing::info!(path = %path, fields = schema.fields().len(), "Loaded schema descriptor");
        return Ok(Some(schema));
    }

    if let Some(sample) = config.export.schema_sample {
        if !input.is_reopenable() {
            bail!(
                "schema sampling reads the input twice, which '{}' does not allow; \
                 pass a schema descriptor or read from a file or URL",
                input
            );
        }
        let mut source = input.open_source()?;
        let schema = sample_schema(&mut source, sample)
            .with_context(|| format!("Failed to sample schema from {}", input))?;
        return Ok(Some(schema));
    }

    Ok(None)
}

/// Every partition after the first reopens the input and skips to its
/// start, so stdin can only feed a single-file plan.
pub fn check_partition_input(input: &InputSpec, plan: &PartitionPlan) -> Result<()> {
    if !input.is_reopenable() && plan.num_files > 1 {
        bail!(
            "a {}-file partition plan reopens the input for each file, which '{}' does not allow; \
             read from a file or URL, or export one range per invocation",
            plan.num_files,
            input
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn options_follow_export_section() {
        let config = ExportConfig {
            chunk_size: 10,
            compression_level: 3,
            page_size: 4096,
            strict_fields: false,
            ..ExportConfig::default()
        };
        let options = export_options(&config);
        assert_eq!(options.chunk_size, 10);
        assert_eq!(options.compression_level, 3);
        assert_eq!(options.page_size, 4096);
        assert!(!options.strict_fields);
    }

    #[test]
    fn descriptor_wins_over_sample() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.toml");
        std::fs::write(&schema_path, "[[fields]]\nname = \"id\"\ntype = \"int64\"\n").unwrap();
        let input_path = dir.path().join("in.jsonl");
        let mut input = std::fs::File::create(&input_path).unwrap();
        writeln!(input, "{{\"id\": 1, \"name\": \"x\"}}").unwrap();

        let mut config = RuntimeConfig::default();
        config.export.schema_sample = Some(10);
        let spec = InputSpec::Path(input_path);

        let sampled = resolve_schema(&config, &spec).unwrap().unwrap();
        assert_eq!(sampled.fields().len(), 2);

        config.export.schema_file = Some(schema_path.to_string_lossy().to_string());
        let described = resolve_schema(&config, &spec).unwrap().unwrap();
        assert_eq!(described.fields().len(), 1);

        assert!(resolve_schema(&RuntimeConfig::default(), &spec)
            .unwrap()
            .is_none());
    }

    #[test]
    fn stdin_cannot_be_sampled_or_partitioned() {
        let mut config = RuntimeConfig::default();
        config.export.schema_sample = Some(3);
        let err = resolve_schema(&config, &InputSpec::Stdin).unwrap_err();
        assert!(err.to_string().contains("reads the input twice"), "{err}");

        let two = PartitionPlan::new(5, 2, "p{index}.parquet");
        assert!(check_partition_input(&InputSpec::Stdin, &two).is_err());
        let one = PartitionPlan::new(5, 1, "only.parquet");
        assert!(check_partition_input(&InputSpec::Stdin, &one).is_ok());
        let path = InputSpec::Path("reviews.jsonl".into());
        assert!(check_partition_input(&path, &two).is_ok());
    }
}

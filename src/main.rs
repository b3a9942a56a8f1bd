use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stream2parquet::{
    check_partition_input, export_options, init_tracing, resolve_schema, run_partitions,
    InputSpec, PartitionPlan,
};
use stream2parquet_config::{RuntimeConfig, StorageBackend};
use stream2parquet_core::{preview, summarize, ExportResult, Exporter, OutputRange};
use stream2parquet_storage::OpendalSink;
use tracing::info;

/// Stream record datasets into compressed Parquet files on object storage
#[derive(Parser)]
#[command(name = "stream2parquet")]
#[command(version)]
#[command(about = "Stream record datasets into compressed Parquet files on object storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one range of the input as a single Parquet file
    Export(ExportArgs),
    /// Cut the input into fixed-size ranges, one Parquet file each
    Partition(PartitionArgs),
    /// Print the first rows and footer summary of a stored artifact
    Preview(PreviewArgs),
}

/// Options shared by every command that writes artifacts
#[derive(Args)]
struct SchemaArgs {
    /// TOML/JSON schema descriptor (overrides config)
    #[arg(long, value_name = "FILE")]
    schema: Option<String>,

    /// Infer the schema from the first N records of a separate pass
    #[arg(long, value_name = "N")]
    schema_sample: Option<usize>,

    /// Records per chunk
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// ZSTD level (1-22)
    #[arg(long, value_name = "LEVEL")]
    compression_level: Option<i32>,

    /// Data page size limit in bytes
    #[arg(long, value_name = "BYTES")]
    page_size: Option<usize>,

    /// Drop record fields that are missing from the schema instead of failing
    #[arg(long)]
    allow_extra_fields: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Input: '-' for stdin, an http(s) URL or a path; '.gz' is decompressed
    #[arg(short, long, value_name = "INPUT")]
    input: InputSpec,

    /// Destination key in the configured storage
    #[arg(short, long)]
    key: String,

    /// First record offset (inclusive)
    #[arg(long, requires = "end")]
    start: Option<u64>,

    /// Last record offset (exclusive)
    #[arg(long)]
    end: Option<u64>,

    #[command(flatten)]
    schema: SchemaArgs,
}

#[derive(Args)]
struct PartitionArgs {
    /// Input: '-' for stdin, an http(s) URL or a path; '.gz' is decompressed
    #[arg(short, long, value_name = "INPUT")]
    input: InputSpec,

    /// Records per file
    #[arg(long, value_name = "N")]
    file_size: Option<u64>,

    /// Number of files
    #[arg(long, value_name = "N")]
    num_files: Option<u64>,

    /// Key template with {start}, {end} and {index}
    #[arg(long, value_name = "TEMPLATE")]
    key_template: Option<String>,

    /// Partitions exported at once
    #[arg(long, value_name = "N")]
    parallelism: Option<usize>,

    #[command(flatten)]
    schema: SchemaArgs,
}

#[derive(Args)]
struct PreviewArgs {
    /// Key of the artifact to read
    #[arg(short, long)]
    key: String,

    /// Rows to print
    #[arg(long, default_value_t = 10)]
    rows: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli);

    // Step 3: Initialize tracing, then validate so warnings are visible
    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Export(args) => run_export(&config, args),
        Commands::Partition(args) => run_partition(&config, args),
        Commands::Preview(args) => run_preview(&config, args),
    }
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    let schema = match &cli.command {
        Commands::Export(args) => &args.schema,
        Commands::Partition(args) => {
            let partition = config.partition_mut();
            if let Some(file_size) = args.file_size {
                partition.file_size = file_size;
            }
            if let Some(num_files) = args.num_files {
                partition.num_files = num_files;
            }
            if let Some(template) = &args.key_template {
                partition.key_template = template.clone();
            }
            if let Some(parallelism) = args.parallelism {
                partition.parallelism = parallelism;
            }
            &args.schema
        }
        Commands::Preview(_) => return,
    };

    let export = &mut config.export;
    if let Some(path) = &schema.schema {
        export.schema_file = Some(path.clone());
    }
    if let Some(sample) = schema.schema_sample {
        export.schema_sample = Some(sample);
    }
    if let Some(chunk_size) = schema.chunk_size {
        export.chunk_size = chunk_size;
    }
    if let Some(level) = schema.compression_level {
        export.compression_level = level;
    }
    if let Some(page_size) = schema.page_size {
        export.page_size = page_size;
    }
    if schema.allow_extra_fields {
        export.strict_fields = false;
    }
}

fn open_sink(config: &RuntimeConfig) -> Result<OpendalSink> {
    if config.storage.backend == StorageBackend::Memory {
        tracing::warn!("Memory storage backend selected; artifacts are discarded on exit");
    }
    OpendalSink::from_config(&config.storage).context("Failed to initialize storage")
}

fn run_export(config: &RuntimeConfig, args: ExportArgs) -> Result<()> {
    let range = match (args.start, args.end) {
        (Some(start), Some(end)) => Some(OutputRange::new(start, end)),
        (None, Some(end)) => Some(OutputRange::new(0, end)),
        _ => None,
    };

    let sink = open_sink(config)?;
    let schema = resolve_schema(config, &args.input)?;
    let exporter = Exporter::new(export_options(&config.export));

    info!(input = %args.input, key = %args.key, range = ?range, "Starting export");
    let mut source = args.input.open_source()?;
    let result = exporter.export(&mut source, range, schema, &sink, &args.key)?;
    print_result(&result);
    Ok(())
}

fn run_partition(config: &RuntimeConfig, args: PartitionArgs) -> Result<()> {
    let partition = config.partition.clone().unwrap_or_default();
    let plan = PartitionPlan::from_config(&partition);
    check_partition_input(&args.input, &plan)?;

    let sink = open_sink(config)?;
    let schema = resolve_schema(config, &args.input)?;
    let exporter = Exporter::new(export_options(&config.export));

    let results = run_partitions(
        &plan,
        |_| args.input.open_source(),
        &exporter,
        schema,
        &sink,
        partition.parallelism,
    )?;

    for result in &results {
        print_result(result);
    }
    info!(files = results.len(), "Partition plan complete");
    Ok(())
}

fn run_preview(config: &RuntimeConfig, args: PreviewArgs) -> Result<()> {
    let sink = open_sink(config)?;
    let bytes = sink
        .read(&args.key)
        .with_context(|| format!("Failed to read {}", args.key))?;

    let summary = summarize(bytes.clone())?;
    let batches = preview(bytes, args.rows)?;

    println!("{}", pretty_format_batches(&batches)?);
    println!("rows: {}", summary.num_rows);
    println!("row groups: {}", summary.num_row_groups);
    println!("columns: {}", summary.schema.fields().len());
    for (key, value) in &summary.key_value_metadata {
        println!("{}: {}", key, value);
    }
    Ok(())
}

fn print_result(result: &ExportResult) {
    let range = result
        .range
        .map(|r| r.to_string())
        .unwrap_or_else(|| "all".to_string());
    println!(
        "{}\trange={}\trecords={}\tchunks={}\tbytes={}\tblake3={}",
        result.key,
        range,
        result.record_count,
        result.chunk_count,
        result.bytes_written,
        result.content_hash
    );
}

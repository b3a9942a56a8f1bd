// Partition planning and execution
//
// A plan cuts one logical stream into contiguous, disjoint ranges of
// `file_size` records and names each resulting file from a key template.
// Every partition is exported from a freshly opened source, so partitions can
// run concurrently without sharing any mutable state.

use anyhow::{anyhow, Context, Result};
use arrow::datatypes::SchemaRef;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stream2parquet_config::PartitionConfig;
use stream2parquet_core::{ExportResult, Exporter, OutputRange, RecordSource, Sink};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub file_size: u64,
    pub num_files: u64,
    /// Rendered with {start}, {end} and {index}
    pub key_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: u64,
    pub range: OutputRange,
    pub key: String,
}

impl PartitionPlan {
    pub fn new(file_size: u64, num_files: u64, key_template: impl Into<String>) -> Self {
        Self {
            file_size,
            num_files,
            key_template: key_template.into(),
        }
    }

    pub fn from_config(config: &PartitionConfig) -> Self {
        Self::new(config.file_size, config.num_files, config.key_template.clone())
    }

    /// Fails when the last range would end past `u64::MAX`.
    pub fn partitions(&self) -> Result<Vec<Partition>> {
        self.file_size
            .checked_mul(self.num_files)
            .ok_or_else(|| {
                anyhow!(
                    "partition plan of {} files x {} records overflows the record offset",
                    self.num_files,
                    self.file_size
                )
            })?;
        Ok((0..self.num_files)
            .map(|index| {
                // Bounded by the product checked above
                let start = index * self.file_size;
                let range = OutputRange::new(start, start + self.file_size);
                Partition {
                    index,
                    key: render_key(&self.key_template, index, range),
                    range,
                }
            })
            .collect())
    }
}

/// Substitute {start}, {end} and {index} in `template`.
pub fn render_key(template: &str, index: u64, range: OutputRange) -> String {
    template
        .replace("{start}", &range.start.to_string())
        .replace("{end}", &range.end.to_string())
        .replace("{index}", &index.to_string())
}

/// Export every partition of `plan` and return the results in plan order.
///
/// `open_source` is called once per partition. A supplied `schema` is shared
/// by every partition so all files agree on types. With `parallelism > 1` up to
/// that many partitions run at once on scoped threads. No new partition is
/// started after the first failure; the failure with the lowest plan index is
/// reported.
pub fn run_partitions<S, F, K>(
    plan: &PartitionPlan,
    open_source: F,
    exporter: &Exporter,
    schema: Option<SchemaRef>,
    sink: &K,
    parallelism: usize,
) -> Result<Vec<ExportResult>>
where
    S: RecordSource,
    F: Fn(&Partition) -> Result<S> + Sync,
    K: Sink + ?Sized,
{
    let partitions = plan.partitions()?;
    let workers = parallelism.clamp(1, partitions.len().max(1));
    info!(
        partitions = partitions.len(),
        workers,
        file_size = plan.file_size,
        "Running partition plan"
    );

    let run_one = |partition: &Partition| -> Result<ExportResult> {
        let mut source = open_source(partition)
            .with_context(|| format!("Failed to open source for partition {}", partition.index))?;
        exporter
            .export(
                &mut source,
                Some(partition.range),
                schema.clone(),
                sink,
                &partition.key,
            )
            .with_context(|| {
                format!(
                    "Partition {} {} -> '{}' failed",
                    partition.index, partition.range, partition.key
                )
            })
    };

    if workers == 1 {
        return partitions.iter().map(run_one).collect();
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let mut slots: Vec<Option<Result<ExportResult>>> = Vec::new();
    slots.resize_with(partitions.len(), || None);

    std::thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    while !failed.load(Ordering::SeqCst) {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        let Some(partition) = partitions.get(i) else {
                            break;
                        };
                        let outcome = run_one(partition);
                        if outcome.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        done.push((i, outcome));
                    }
                    done
                })
            })
            .collect();

        for handle in handles {
            let done = handle
                .join()
                .map_err(|_| anyhow!("partition worker panicked"))?;
            for (i, outcome) in done {
                slots[i] = Some(outcome);
            }
        }
        Ok(())
    })?;

    let mut results = Vec::with_capacity(slots.len());
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(result)) => results.push(result),
            Some(Err(err)) => return Err(err),
            None => {
                warn!(index = i, "Partition skipped after earlier failure");
                return Err(anyhow!("partition {} was not run", i));
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_contiguous_and_disjoint() {
        let plan = PartitionPlan::new(
            7_000_000,
            3,
            "data/beauty_personal_care_{start}_{end}.parquet",
        );
        let parts = plan.partitions().unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].range, OutputRange::new(0, 7_000_000));
        assert_eq!(parts[2].range, OutputRange::new(14_000_000, 21_000_000));
        assert_eq!(parts[1].key, "data/beauty_personal_care_7000000_14000000.parquet");
        for pair in parts.windows(2) {
            assert_eq!(pair[0].range.end, pair[1].range.start);
        }
    }

    #[test]
    fn oversized_plan_is_rejected() {
        let plan = PartitionPlan::new(u64::MAX / 2, 3, "p{index}.parquet");
        let err = plan.partitions().unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");

        let edge = PartitionPlan::new(u64::MAX / 2, 2, "p{index}.parquet");
        let parts = edge.partitions().unwrap();
        assert_eq!(parts[1].range.end, (u64::MAX / 2) * 2);
    }

    #[test]
    fn render_key_substitutes_all_placeholders() {
        let key = render_key("p{index}/{start}-{end}.parquet", 4, OutputRange::new(40, 50));
        assert_eq!(key, "p4/40-50.parquet");
    }
}

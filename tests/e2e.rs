// End-to-end tests for stream2parquet
//
// These drive partition plans through the exporter into in-memory and
// filesystem storage and read the artifacts back.

use arrow::array::{Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use stream2parquet::{run_partitions, InputSpec, Partition, PartitionPlan};
use stream2parquet_core::{
    read_all, summarize, ErrorCode, ExportError, ExportOptions, Exporter, IterSource, MemorySink,
    Record, Sink,
};
use stream2parquet_storage::OpendalSink;

fn review(i: u64) -> Record {
    json!({"id": i, "text": format!("review {}", i), "rating": (i % 5) + 1})
        .as_object()
        .cloned()
        .unwrap()
}

fn small_exporter() -> Exporter {
    Exporter::new(ExportOptions::default().with_chunk_size(40))
}

fn ids(bytes: bytes::Bytes) -> Vec<i64> {
    read_all(bytes)
        .unwrap()
        .iter()
        .flat_map(|batch| {
            let col = batch
                .column_by_name("id")
                .unwrap()
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap()
                .clone();
            (0..col.len()).map(move |i| col.value(i))
        })
        .collect()
}

#[test]
fn test_sequential_plan_writes_one_file_per_range() {
    let plan = PartitionPlan::new(100, 3, "data/part_{start}_{end}.parquet");
    let sink = MemorySink::new();

    let results = run_partitions(
        &plan,
        |_| Ok(IterSource::new((0..300).map(review))),
        &small_exporter(),
        None,
        &sink,
        1,
    )
    .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(
        sink.keys(),
        vec![
            "data/part_0_100.parquet",
            "data/part_100_200.parquet",
            "data/part_200_300.parquet",
        ]
    );
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.record_count, 100);
        // 100 records at 40 per chunk
        assert_eq!(result.chunk_count, 3);
        let bytes = sink.object(&result.key).unwrap();
        let summary = summarize(bytes.clone()).unwrap();
        assert_eq!(summary.num_rows, 100);
        assert_eq!(summary.num_row_groups, 3);
        let expected: Vec<i64> = ((i as i64 * 100)..(i as i64 * 100 + 100)).collect();
        assert_eq!(ids(bytes), expected);
    }
}

#[test]
fn test_parallel_plan_matches_sequential() {
    let plan = PartitionPlan::new(50, 4, "p{index}.parquet");
    let open = |_: &Partition| Ok::<_, anyhow::Error>(IterSource::new((0..200).map(review)));

    let sequential_sink = MemorySink::new();
    let sequential =
        run_partitions(&plan, open, &small_exporter(), None, &sequential_sink, 1).unwrap();

    let parallel_sink = MemorySink::new();
    let parallel = run_partitions(&plan, open, &small_exporter(), None, &parallel_sink, 3).unwrap();

    assert_eq!(parallel.len(), 4);
    for (a, b) in sequential.iter().zip(parallel.iter()) {
        assert_eq!(a.key, b.key);
        assert_eq!(a.range, b.range);
        assert_eq!(a.content_hash, b.content_hash);
    }
    assert_eq!(parallel_sink.keys(), sequential_sink.keys());
}

#[test]
fn test_short_stream_fails_last_partition() {
    let plan = PartitionPlan::new(100, 3, "data/part_{start}_{end}.parquet");
    let sink = MemorySink::new();

    let err = run_partitions(
        &plan,
        |_| Ok(IterSource::new((0..250).map(review))),
        &small_exporter(),
        None,
        &sink,
        1,
    )
    .unwrap_err();

    let export_err = err.downcast_ref::<ExportError>().unwrap();
    assert_eq!(export_err.code(), ErrorCode::E103SourceExhaustedEarly);
    assert!(err.to_string().contains("Partition 2"));
    // The two complete partitions were delivered; the short one was not
    assert_eq!(sink.put_count(), 2);
    assert!(sink.object("data/part_200_300.parquet").is_none());
}

#[test]
fn test_parallel_failure_reports_lowest_index() {
    let plan = PartitionPlan::new(10, 5, "p{index}.parquet");
    let sink = MemorySink::new();

    let err = run_partitions(
        &plan,
        |partition| {
            if partition.index >= 1 {
                anyhow::bail!("cannot open partition {}", partition.index);
            }
            Ok(IterSource::new((0..50).map(review)))
        },
        &small_exporter(),
        None,
        &sink,
        5,
    )
    .unwrap_err();

    assert!(
        format!("{:#}", err).contains("partition 1"),
        "unexpected error: {:#}",
        err
    );
    assert!(sink.object("p1.parquet").is_none());
}

#[test]
fn test_supplied_schema_is_shared_by_partitions() {
    // The first partition never sees a rating, so inference alone would
    // give the files different schemas
    let record = |i: u64| -> Record {
        if i < 20 {
            json!({"id": i}).as_object().cloned().unwrap()
        } else {
            json!({"id": i, "rating": 4.5}).as_object().cloned().unwrap()
        }
    };
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("rating", DataType::Float64, true),
    ]));
    let plan = PartitionPlan::new(20, 2, "p{index}.parquet");
    let sink = MemorySink::new();

    let results = run_partitions(
        &plan,
        |_| Ok(IterSource::new((0..40).map(record))),
        &small_exporter(),
        Some(schema.clone()),
        &sink,
        2,
    )
    .unwrap();

    for result in &results {
        assert_eq!(result.schema.fields(), schema.fields());
        let summary = summarize(sink.object(&result.key).unwrap()).unwrap();
        assert_eq!(summary.schema.fields(), schema.fields());
    }
}

#[test]
fn test_filesystem_round_trip_from_jsonl_input() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("reviews.jsonl");
    let mut file = std::fs::File::create(&input_path).unwrap();
    for i in 0..120 {
        writeln!(file, "{}", serde_json::Value::Object(review(i))).unwrap();
    }
    drop(file);

    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    let sink = OpendalSink::new_fs(out.to_str().unwrap()).unwrap();
    let input = InputSpec::Path(input_path);
    let plan = PartitionPlan::new(60, 2, "data/part_{start}_{end}.parquet");

    let results = run_partitions(
        &plan,
        |_| input.open_source(),
        &small_exporter(),
        None,
        &sink,
        2,
    )
    .unwrap();

    assert_eq!(results.len(), 2);
    assert!(out.join("data/part_60_120.parquet").exists());

    let bytes = sink.read("data/part_60_120.parquet").unwrap();
    assert_eq!(blake3::hash(&bytes).to_hex().to_string(), results[1].content_hash);
    assert_eq!(ids(bytes), (60..120).collect::<Vec<i64>>());
}

#[test]
fn test_rerun_overwrites_with_identical_bytes() {
    let plan = PartitionPlan::new(30, 1, "only.parquet");
    let sink = MemorySink::new();
    let open = |_: &Partition| Ok::<_, anyhow::Error>(IterSource::new((0..30).map(review)));

    let first = run_partitions(&plan, open, &small_exporter(), None, &sink, 1).unwrap();
    let stored = sink.object("only.parquet").unwrap();
    let second = run_partitions(&plan, open, &small_exporter(), None, &sink, 1).unwrap();

    assert_eq!(first[0].content_hash, second[0].content_hash);
    assert_eq!(sink.object("only.parquet").unwrap(), stored);
    assert_eq!(sink.put_count(), 2);

    let dyn_sink: &dyn Sink = &sink;
    run_partitions(&plan, open, &small_exporter(), None, dyn_sink, 1).unwrap();
    assert_eq!(sink.put_count(), 3);
}

#[test]
fn test_stdin_refuses_multi_pass_use() {
    use stream2parquet::{check_partition_input, resolve_schema};
    use stream2parquet_config::RuntimeConfig;

    let mut config = RuntimeConfig::default();
    config.export.schema_sample = Some(3);
    // Fails before stdin is touched, so nothing is consumed
    assert!(resolve_schema(&config, &InputSpec::Stdin).is_err());

    let plan = PartitionPlan::new(5, 2, "part_{start}_{end}.parquet");
    let err = check_partition_input(&InputSpec::Stdin, &plan).unwrap_err();
    assert!(err.to_string().contains("reopens the input"), "{err}");

    // A file can be sampled and then partitioned from the start each time
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviews.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 0..20 {
        writeln!(file, "{}", serde_json::Value::Object(review(i))).unwrap();
    }
    drop(file);
    let input = InputSpec::Path(path);
    check_partition_input(&input, &plan).unwrap();
    let schema = resolve_schema(&config, &input).unwrap();

    let sink = MemorySink::new();
    let results = run_partitions(
        &plan,
        |_| input.open_source(),
        &small_exporter(),
        schema,
        &sink,
        1,
    )
    .unwrap();
    assert_eq!(results.iter().map(|r| r.record_count).sum::<u64>(), 10);
    assert_eq!(ids(sink.object("part_5_10.parquet").unwrap()), (5..10).collect::<Vec<i64>>());
}

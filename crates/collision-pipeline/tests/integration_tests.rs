//! Integration tests for the collision pipeline.
//!
//! These tests drive the fetch, normalize and clean stages end to end against
//! an in-memory record source serving the sample collisions in
//! `tests/fixtures`.

use chrono::{Local, TimeZone};
use collision_pipeline::{
    BatchWindow, Cleaner, DataFormat, Manifest, NormalizeOutcome, Normalizer, Pipeline,
    PipelineConfig, PipelineError, PipelineStage, RecordSource, RunContext, StageSelection,
    TableLoader,
};
use parking_lot::Mutex;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Number of records in each sample fixture.
const SAMPLE_RECORDS: usize = 8;

/// Rows of the sample that survive cleaning with the default date window.
const SAMPLE_CLEAN_ROWS: usize = 5;

enum Payload {
    Json(Vec<serde_json::Value>),
    Csv { header: String, rows: Vec<String> },
}

/// Serves windows of a fixture file, optionally failing some offsets.
struct FixtureSource {
    payload: Payload,
    failing_offsets: Vec<u64>,
}

impl FixtureSource {
    fn new(format: DataFormat) -> Self {
        let payload = match format {
            DataFormat::Json => {
                let text = fs::read_to_string(fixtures_path().join("collisions_sample.json"))
                    .expect("Failed to read JSON fixture");
                Payload::Json(serde_json::from_str(&text).expect("Invalid JSON fixture"))
            }
            DataFormat::Csv => {
                let text = fs::read_to_string(fixtures_path().join("collisions_sample.csv"))
                    .expect("Failed to read CSV fixture");
                let mut lines = text.lines().map(str::to_string);
                let header = lines.next().expect("CSV fixture has no header");
                Payload::Csv {
                    header,
                    rows: lines.filter(|l| !l.is_empty()).collect(),
                }
            }
        };
        Self {
            payload,
            failing_offsets: Vec::new(),
        }
    }

    fn failing_at(mut self, offset: u64) -> Self {
        self.failing_offsets.push(offset);
        self
    }

    fn len(&self) -> usize {
        match &self.payload {
            Payload::Json(records) => records.len(),
            Payload::Csv { rows, .. } => rows.len(),
        }
    }
}

impl RecordSource for FixtureSource {
    fn source_url(&self) -> &str {
        "memory://collisions"
    }

    fn count_records(&self) -> collision_pipeline::Result<u64> {
        Ok(self.len() as u64)
    }

    fn open_window(&self, window: &BatchWindow) -> collision_pipeline::Result<Box<dyn Read + Send>> {
        if self.failing_offsets.contains(&window.offset) {
            return Err(PipelineError::WindowFetch {
                index: window.index,
                offset: window.offset,
                reason: "connection reset".to_string(),
            });
        }

        let start = (window.offset as usize).min(self.len());
        let end = (window.end() as usize).min(self.len());
        let body = match &self.payload {
            Payload::Json(records) => serde_json::to_vec(&records[start..end])?,
            Payload::Csv { header, rows } => {
                let mut text = header.clone();
                for row in &rows[start..end] {
                    text.push('\n');
                    text.push_str(row);
                }
                text.push('\n');
                text.into_bytes()
            }
        };
        Ok(Box::new(Cursor::new(body)))
    }
}

fn config(dir: &Path, format: DataFormat) -> PipelineConfig {
    PipelineConfig::builder()
        .data_format(format)
        .data_dir(dir)
        .batch_size(3)
        .concurrency(2)
        .build()
        .unwrap()
}

fn fixed_context(config: &PipelineConfig) -> RunContext {
    let at = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    RunContext::with_clock(config, at)
}

fn run_pipeline(dir: &Path, format: DataFormat, source: FixtureSource) -> collision_pipeline::PipelineRunReport {
    let config = config(dir, format);
    let ctx = fixed_context(&config);
    Pipeline::builder()
        .config(config)
        .source(Arc::new(source))
        .run_context(ctx)
        .build()
        .unwrap()
        .run(StageSelection::all())
        .unwrap()
}

fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

fn minutes(df: &DataFrame) -> Vec<Option<i64>> {
    df.column("crash_time")
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

/// Checks shared by the JSON and CSV runs over the sample fixtures.
fn assert_sample_cleaned(df: &DataFrame) {
    assert_eq!(df.height(), SAMPLE_CLEAN_ROWS);

    for dropped in ["borough", "zip_code", "collision_id", "on_street_name"] {
        assert!(
            df.get_column_index(dropped).is_none(),
            "column '{}' should have been dropped",
            dropped
        );
    }

    assert_eq!(df.column("crash_date").unwrap().dtype(), &DataType::Date);
    assert_eq!(df.column("latitude").unwrap().dtype(), &DataType::Float32);
    assert_eq!(
        df.column("number_of_persons_injured").unwrap().dtype(),
        &DataType::Int64
    );

    assert_eq!(
        minutes(df),
        vec![Some(495), Some(1385), Some(1065), None, Some(360)]
    );
    assert_eq!(
        strings(df, "vehicle_type_code1"),
        vec![
            Some("sedan".to_string()),
            Some("station wagon/sport utility vehicle".to_string()),
            Some("undefined".to_string()),
            Some("taxi".to_string()),
            Some("bike".to_string()),
        ]
    );
    assert_eq!(
        strings(df, "contributing_factor_vehicle_1"),
        vec![
            Some("Driver Inattention/Distraction".to_string()),
            Some("Unspecified".to_string()),
            Some("Other".to_string()),
            Some("Other".to_string()),
            Some("Following Too Closely".to_string()),
        ]
    );
}

// ============================================================================
// End-to-End Runs
// ============================================================================

#[test]
fn test_full_pipeline_json() {
    let temp = tempfile::tempdir().unwrap();
    let report = run_pipeline(temp.path(), DataFormat::Json, FixtureSource::new(DataFormat::Json));

    let fetch = report.fetch.as_ref().unwrap();
    assert!(fetch.is_complete());
    assert_eq!(fetch.windows_total, 3);
    assert_eq!(fetch.manifest.total_records, SAMPLE_RECORDS as u64);

    let normalized = report.normalize.as_ref().unwrap().report().unwrap();
    assert_eq!(normalized.rows, SAMPLE_RECORDS);
    assert_eq!(normalized.files_decoded, 3);
    assert!(normalized.failures.is_empty());

    let clean = report.clean.as_ref().unwrap();
    assert_eq!(clean.rows_before, SAMPLE_RECORDS);
    assert_eq!(clean.rows_after, SAMPLE_CLEAN_ROWS);
    assert_eq!(clean.rows_outside_date_window, 2);
    assert_eq!(clean.rows_at_null_island, 1);
    assert_eq!(clean.unparsed_times, 1);

    let cleaned = TableLoader::open(clean.output_path.as_ref().unwrap()).unwrap();
    assert_sample_cleaned(&cleaned.all());
}

#[test]
fn test_full_pipeline_csv() {
    let temp = tempfile::tempdir().unwrap();
    let report = run_pipeline(temp.path(), DataFormat::Csv, FixtureSource::new(DataFormat::Csv));

    let fetch = report.fetch.as_ref().unwrap();
    assert_eq!(fetch.manifest.format, "csv");
    assert!(fetch.manifest.batch_files.iter().all(|f| f.ends_with(".csv")));

    let normalized = report.normalize.as_ref().unwrap().report().unwrap();
    assert_eq!(normalized.rows, SAMPLE_RECORDS);

    let cleaned = TableLoader::open(temp.path().join("cleaned/clean.parquet")).unwrap();
    assert_sample_cleaned(&cleaned.all());
}

#[test]
fn test_manifest_written_to_raw_dir() {
    let temp = tempfile::tempdir().unwrap();
    let report = run_pipeline(temp.path(), DataFormat::Json, FixtureSource::new(DataFormat::Json));

    let manifest_path = temp
        .path()
        .join("raw")
        .join("nyc_data_20240601_120000_metadata.json");
    assert_eq!(report.fetch.as_ref().unwrap().manifest_path, manifest_path);

    let on_disk: Manifest =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert_eq!(on_disk.source_url, "memory://collisions");
    assert_eq!(on_disk.download_date, "20240601_120000");
    assert_eq!(on_disk.batch_size, 3);
    assert_eq!(on_disk.successful_batches, 3);

    let names: Vec<String> = on_disk
        .batch_files
        .iter()
        .map(|f| {
            Path::new(f)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "nyc_data_20240601_120000_batch_00000.json",
            "nyc_data_20240601_120000_batch_00001.json",
            "nyc_data_20240601_120000_batch_00002.json",
        ]
    );
}

#[test]
fn test_failed_window_is_reported_and_run_continues() {
    let temp = tempfile::tempdir().unwrap();
    let source = FixtureSource::new(DataFormat::Json).failing_at(3);
    let report = run_pipeline(temp.path(), DataFormat::Json, source);

    let fetch = report.fetch.as_ref().unwrap();
    assert!(!fetch.is_complete());
    assert_eq!(fetch.manifest.successful_batches, 2);
    assert_eq!(fetch.failures.len(), 1);
    assert_eq!(fetch.failures[0].index, 1);
    assert_eq!(fetch.failures[0].offset, 3);
    assert_eq!(fetch.failures[0].reason, "connection reset");

    // Window 1 held records 4 to 6 of the sample
    let normalized = report.normalize.as_ref().unwrap().report().unwrap();
    assert_eq!(normalized.rows, SAMPLE_RECORDS - 3);
    assert!(report.clean.is_some());
}

#[test]
fn test_progress_stages_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), DataFormat::Json);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    Pipeline::builder()
        .config(config)
        .source(Arc::new(FixtureSource::new(DataFormat::Json)))
        .on_progress(move |u| sink.lock().push((u.stage, u.progress)))
        .build()
        .unwrap()
        .run(StageSelection::all())
        .unwrap();

    let updates = updates.lock();
    let stages: Vec<PipelineStage> = updates.iter().map(|(s, _)| *s).collect();
    assert!(stages.contains(&PipelineStage::Fetching));
    assert!(stages.contains(&PipelineStage::Normalizing));
    assert!(stages.contains(&PipelineStage::Cleaning));
    assert_eq!(stages.last(), Some(&PipelineStage::Complete));

    for pair in updates.windows(2) {
        assert!(
            pair[1].1 + 1e-6 >= pair[0].1,
            "progress went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

// ============================================================================
// Offline Stages
// ============================================================================

#[test]
fn test_offline_rerun_reproduces_clean_table() {
    let temp = tempfile::tempdir().unwrap();
    run_pipeline(temp.path(), DataFormat::Json, FixtureSource::new(DataFormat::Json));
    let first = TableLoader::open(temp.path().join("cleaned/clean.parquet"))
        .unwrap()
        .all();

    let report = Pipeline::builder()
        .config(config(temp.path(), DataFormat::Json))
        .build()
        .unwrap()
        .run(StageSelection::offline())
        .unwrap();
    assert!(report.fetch.is_none());

    let second = TableLoader::open(temp.path().join("cleaned/clean.parquet"))
        .unwrap()
        .all();
    assert!(first.equals_missing(&second));
}

#[test]
fn test_empty_raw_dir_yields_no_data() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), DataFormat::Json);
    let ctx = fixed_context(&config);

    let outcome = Normalizer::new(DataFormat::Json).run(&ctx).unwrap();

    assert!(matches!(
        outcome,
        NormalizeOutcome::NoData { files_seen: 0, .. }
    ));
    assert!(!ctx.normalized_path().exists());
}

#[test]
fn test_undecodable_batch_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), DataFormat::Json);
    let ctx = fixed_context(&config);

    fs::create_dir_all(ctx.raw_dir()).unwrap();
    fs::copy(
        fixtures_path().join("collisions_sample.json"),
        ctx.batch_path(0, "json"),
    )
    .unwrap();
    fs::write(ctx.batch_path(1, "json"), "{\"error\": true}").unwrap();

    let outcome = Normalizer::new(DataFormat::Json).run(&ctx).unwrap();
    let report = outcome.report().unwrap();

    assert_eq!(report.rows, SAMPLE_RECORDS);
    assert_eq!(report.files_decoded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, ctx.batch_path(1, "json"));
}

#[test]
fn test_two_records_outside_window_clean_to_empty() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), DataFormat::Json);
    let ctx = fixed_context(&config);

    fs::create_dir_all(ctx.raw_dir()).unwrap();
    fs::write(
        ctx.batch_path(0, "json"),
        r#"[
            {"crash_date": "2020-01-01T00:00:00.000", "crash_time": "8:15", "latitude": "40.7", "longitude": "-73.9"},
            {"crash_date": "2025-06-01T00:00:00.000", "crash_time": "9:45", "latitude": "0.0", "longitude": "0.0"}
        ]"#,
    )
    .unwrap();

    Normalizer::new(DataFormat::Json).run(&ctx).unwrap();
    let report = Cleaner::from_config(&config).run(&ctx).unwrap();

    assert_eq!(report.rows_before, 2);
    assert_eq!(report.rows_after, 0);
    assert_eq!(report.rows_outside_date_window, 2);

    let cleaned = TableLoader::open(ctx.cleaned_path()).unwrap();
    assert_eq!(cleaned.height(), 0);
}

#[test]
fn test_cleaner_without_normalized_table() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), DataFormat::Json);
    let ctx = fixed_context(&config);

    let err = Cleaner::from_config(&config).run(&ctx).unwrap_err();

    assert!(matches!(err, PipelineError::MissingInput(_)));
    assert_eq!(err.error_code(), "MISSING_INPUT");
}

// ============================================================================
// Reading Results
// ============================================================================

#[test]
fn test_loader_over_pipeline_output() {
    let temp = tempfile::tempdir().unwrap();
    run_pipeline(temp.path(), DataFormat::Json, FixtureSource::new(DataFormat::Json));

    let normalized = TableLoader::preprocessed(temp.path().join("parsed")).unwrap();
    assert_eq!(normalized.height(), SAMPLE_RECORDS);
    assert_eq!(normalized.batch(3, 6).height(), 2);

    let sample = normalized.sample(4, Some(42)).unwrap();
    let again = normalized.sample(4, Some(42)).unwrap();
    assert_eq!(sample.height(), 4);
    assert!(sample.equals_missing(&again));
}

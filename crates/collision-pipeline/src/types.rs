use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One decoded source record: field name to dynamically-typed JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Audit record of a fetch run, written next to the raw batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source_url: String,
    pub download_date: String,
    pub format: String,
    pub total_records: u64,
    pub batch_size: u64,
    /// Raw batch files that were written, ordered by window index.
    pub batch_files: Vec<String>,
    pub successful_batches: usize,
}

/// A window that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowFailure {
    pub index: usize,
    pub offset: u64,
    pub reason: String,
}

impl From<&WindowFailure> for PipelineError {
    fn from(failure: &WindowFailure) -> Self {
        PipelineError::WindowFetch {
            index: failure.index,
            offset: failure.offset,
            reason: failure.reason.clone(),
        }
    }
}

/// A raw batch file that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl From<&DecodeFailure> for PipelineError {
    fn from(failure: &DecodeFailure) -> Self {
        PipelineError::Decode {
            path: failure.path.clone(),
            reason: failure.reason.clone(),
        }
    }
}

/// Result of a fetch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub windows_total: usize,
    pub failures: Vec<WindowFailure>,
}

impl FetchReport {
    /// True when every window was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.manifest.successful_batches == self.windows_total
    }
}

/// Statistics of a written normalized table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub output_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub files_decoded: usize,
    pub failures: Vec<DecodeFailure>,
    /// Cells that did not fit their column's inferred type and became null.
    pub mismatched_cells: usize,
}

/// Outcome of a normalizer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormalizeOutcome {
    /// The normalized table was written.
    Written(NormalizeReport),
    /// No record with at least one field could be decoded; nothing was
    /// written.
    NoData {
        files_seen: usize,
        failures: Vec<DecodeFailure>,
    },
}

impl NormalizeOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }

    pub fn report(&self) -> Option<&NormalizeReport> {
        match self {
            Self::Written(report) => Some(report),
            Self::NoData { .. } => None,
        }
    }
}

/// Statistics of a cleaner run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanReport {
    pub output_path: Option<PathBuf>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub dropped_columns: Vec<String>,
    /// Cells nulled by missing-value normalization.
    pub missing_normalized: usize,
    /// Per column, cells that could not be coerced and became null.
    pub coerced_to_null: BTreeMap<String, usize>,
    /// Rows dropped for an unparsable or out-of-window crash date.
    pub rows_outside_date_window: usize,
    /// Rows dropped for a (0, 0) location.
    pub rows_at_null_island: usize,
    /// Crash times that could not be parsed.
    pub unparsed_times: usize,
}

impl CleanReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Result of a full pipeline run, one entry per executed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunReport {
    pub started_at: String,
    pub download_secs: Option<f64>,
    pub parse_secs: Option<f64>,
    pub clean_secs: Option<f64>,
    pub total_secs: f64,
    pub fetch: Option<FetchReport>,
    pub normalize: Option<NormalizeOutcome>,
    pub clean: Option<CleanReport>,
}

//! Run-scoped context shared by the pipeline stages.
//!
//! A [`RunContext`] pins the run timestamp and the resolved stage directories
//! once, so that every stage of a run names its artifacts consistently and
//! tests can inject a fixed clock and temporary paths.

use crate::config::PipelineConfig;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// File name of the normalized table inside the parsed directory.
pub const NORMALIZED_FILE_NAME: &str = "combined.parquet";

/// File name of the cleaned table inside the cleaned directory.
pub const CLEANED_FILE_NAME: &str = "clean.parquet";

/// Prefix shared by raw batch files and the manifest.
pub const ARTIFACT_PREFIX: &str = "nyc_data";

#[derive(Debug, Clone)]
pub struct RunContext {
    started_at: DateTime<Local>,
    raw_dir: PathBuf,
    parsed_dir: PathBuf,
    cleaned_dir: PathBuf,
}

impl RunContext {
    /// Context for a run starting now.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_clock(config, Local::now())
    }

    /// Context with an explicit start time.
    pub fn with_clock(config: &PipelineConfig, started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            raw_dir: config.raw_dir.clone(),
            parsed_dir: config.parsed_dir.clone(),
            cleaned_dir: config.cleaned_dir.clone(),
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Timestamp embedded in artifact names, e.g. `20240131_235959`.
    pub fn stamp(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn parsed_dir(&self) -> &Path {
        &self.parsed_dir
    }

    pub fn cleaned_dir(&self) -> &Path {
        &self.cleaned_dir
    }

    /// Path of the raw file for window `index`.
    ///
    /// The index is zero-padded to five digits; readers order batch files
    /// by the numeric index, so wider indices still sort correctly.
    pub fn batch_path(&self, index: usize, extension: &str) -> PathBuf {
        self.raw_dir.join(format!(
            "{ARTIFACT_PREFIX}_{}_batch_{index:05}.{extension}",
            self.stamp()
        ))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.raw_dir
            .join(format!("{ARTIFACT_PREFIX}_{}_metadata.json", self.stamp()))
    }

    pub fn normalized_path(&self) -> PathBuf {
        self.parsed_dir.join(NORMALIZED_FILE_NAME)
    }

    pub fn cleaned_path(&self) -> PathBuf {
        self.cleaned_dir.join(CLEANED_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_context() -> RunContext {
        let config = PipelineConfig::builder().data_dir("/data").build().unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        RunContext::with_clock(&config, at)
    }

    #[test]
    fn test_stamp_format() {
        assert_eq!(fixed_context().stamp(), "20240309_070501");
    }

    #[test]
    fn test_batch_path_is_sortable() {
        let ctx = fixed_context();
        let second = ctx.batch_path(2, "json");
        let tenth = ctx.batch_path(10, "json");

        assert_eq!(
            second,
            PathBuf::from("/data/raw/nyc_data_20240309_070501_batch_00002.json")
        );
        assert!(second < tenth);
    }

    #[test]
    fn test_stage_artifact_paths() {
        let ctx = fixed_context();
        assert_eq!(
            ctx.manifest_path(),
            PathBuf::from("/data/raw/nyc_data_20240309_070501_metadata.json")
        );
        assert_eq!(
            ctx.normalized_path(),
            PathBuf::from("/data/parsed/combined.parquet")
        );
        assert_eq!(ctx.cleaned_path(), PathBuf::from("/data/cleaned/clean.parquet"));
    }
}
